// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process spawner: turns action specs into children, delivers signals.
//!
//! Children are spawned with `std::process::Command` and the handle is
//! dropped immediately: the reaper owns `waitpid`, so holding a handle
//! (or using tokio's process support, which installs its own reaping)
//! would fight over exit statuses.

use crate::paths::SESSION_ENV;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use thiserror::Error;
use vigil_core::{ActionSpec, ConsoleType, JobDefinition, ProcessKind, SignalKind};

#[derive(Debug, Error)]
pub(crate) enum SpawnError {
    #[error("failed to spawn {kind} for {job}: {source}")]
    Spawn {
        job: String,
        kind: ProcessKind,
        #[source]
        source: std::io::Error,
    },

    #[error("no runnable {kind} action for {job}")]
    NoAction { job: String, kind: ProcessKind },

    #[error("failed to signal pid {pid}: {source}")]
    Signal {
        pid: i32,
        #[source]
        source: nix::Error,
    },
}

impl SpawnError {
    /// The target process is already gone; the dispatcher maps this onto
    /// the death transition the machine was waiting for.
    pub fn is_no_such_process(&self) -> bool {
        matches!(self, SpawnError::Signal { source, .. } if *source == nix::Error::ESRCH)
    }
}

/// Seam between the dispatcher and the operating system.
pub(crate) trait Spawner {
    /// Spawn one action of a job, returning the child's pid.
    fn spawn(
        &self,
        def: &JobDefinition,
        kind: ProcessKind,
        extra_env: &[(String, String)],
    ) -> Result<i32, SpawnError>;

    /// Deliver a signal to a child.
    fn signal(&self, pid: i32, signal: SignalKind) -> Result<(), SpawnError>;
}

/// The real thing.
pub(crate) struct ProcessSpawner {
    /// Exported as `VIGIL_SESSION` so children can dial the daemon back.
    pub session_socket: Option<PathBuf>,
}

impl Spawner for ProcessSpawner {
    fn spawn(
        &self,
        def: &JobDefinition,
        kind: ProcessKind,
        extra_env: &[(String, String)],
    ) -> Result<i32, SpawnError> {
        let no_action =
            || SpawnError::NoAction { job: def.name.clone(), kind };
        let spec = def.action(kind).ok_or_else(no_action)?;

        let mut command = match spec {
            ActionSpec::Command(line) => {
                let mut c = Command::new("/bin/sh");
                c.arg("-c").arg(line);
                c
            }
            ActionSpec::Args(argv) => {
                let (program, rest) = argv.split_first().ok_or_else(no_action)?;
                let mut c = Command::new(program);
                c.args(rest);
                c
            }
        };

        match def.console {
            // Until a log transport exists, logged output goes the same
            // way as discarded output.
            ConsoleType::Logged | ConsoleType::None => {
                command.stdin(Stdio::null()).stdout(Stdio::null()).stderr(Stdio::null());
            }
            ConsoleType::Output | ConsoleType::Owner => {}
        }

        for (key, value) in &def.env {
            command.env(key, value);
        }
        for (key, value) in extra_env {
            command.env(key, value);
        }
        command.env("VIGIL_JOB", &def.name);
        if let Some(path) = &self.session_socket {
            command.env(SESSION_ENV, path);
        }

        let child = command
            .spawn()
            .map_err(|source| SpawnError::Spawn { job: def.name.clone(), kind, source })?;
        let pid = child.id() as i32;
        drop(child);
        Ok(pid)
    }

    fn signal(&self, pid: i32, signal: SignalKind) -> Result<(), SpawnError> {
        let signal = match signal {
            SignalKind::Term => Signal::SIGTERM,
            SignalKind::Kill => Signal::SIGKILL,
            SignalKind::Cont => Signal::SIGCONT,
        };
        kill(Pid::from_raw(pid), signal).map_err(|source| SpawnError::Signal { pid, source })
    }
}

#[cfg(test)]
pub(crate) use fake::FakeSpawner;


#[cfg(test)]
#[path = "spawn_tests.rs"]
mod tests;
