// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serial_test::serial;
use vigil_core::JobDefinition;

fn spawner() -> ProcessSpawner {
    ProcessSpawner { session_socket: None }
}

#[test]
fn spawning_a_command_action_yields_a_pid() {
    let def = JobDefinition::builder()
        .name("noop")
        .command(ProcessKind::Main, "exit 0")
        .console(ConsoleType::None)
        .build();

    let pid = spawner().spawn(&def, ProcessKind::Main, &[]).unwrap();
    assert!(pid > 0);
}

#[test]
fn spawning_an_argv_action_yields_a_pid() {
    let mut def = JobDefinition::builder().name("noop").console(ConsoleType::None).build();
    def.actions.insert(
        ProcessKind::Main,
        ActionSpec::Args(vec!["/bin/sh".to_string(), "-c".to_string(), "exit 0".to_string()]),
    );

    let pid = spawner().spawn(&def, ProcessKind::Main, &[]).unwrap();
    assert!(pid > 0);
}

#[test]
fn missing_action_is_an_error() {
    let def = JobDefinition::builder().name("empty").build();
    assert!(matches!(
        spawner().spawn(&def, ProcessKind::Main, &[]),
        Err(SpawnError::NoAction { .. })
    ));
}

#[test]
fn unrunnable_program_is_a_spawn_error() {
    let mut def = JobDefinition::builder().name("ghost").console(ConsoleType::None).build();
    def.actions
        .insert(ProcessKind::Main, ActionSpec::Args(vec!["/nonexistent/binary".to_string()]));

    assert!(matches!(
        spawner().spawn(&def, ProcessKind::Main, &[]),
        Err(SpawnError::Spawn { .. })
    ));
}

// Serialized against the reaper tests: their waitpid(-1) drains would
// steal these children's exit statuses.
#[test]
#[serial(reaper)]
fn signalling_a_reaped_pid_is_no_such_process() {
    // Spawn and fully reap a child, then aim at its stale pid.
    let mut child = std::process::Command::new("/bin/sh")
        .arg("-c")
        .arg("exit 0")
        .stdout(std::process::Stdio::null())
        .spawn()
        .unwrap();
    let pid = child.id() as i32;
    child.wait().unwrap();

    let err = spawner().signal(pid, SignalKind::Term).unwrap_err();
    assert!(err.is_no_such_process());
}

#[test]
#[serial(reaper)]
fn cont_to_a_live_child_succeeds() {
    let mut child = std::process::Command::new("/bin/sh")
        .arg("-c")
        .arg("sleep 5")
        .stdout(std::process::Stdio::null())
        .spawn()
        .unwrap();
    let pid = child.id() as i32;

    assert!(spawner().signal(pid, SignalKind::Cont).is_ok());

    spawner().signal(pid, SignalKind::Kill).unwrap();
    child.wait().unwrap();
}
