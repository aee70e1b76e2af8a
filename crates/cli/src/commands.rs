// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Command implementations and status rendering.

use crate::client::Client;
use crate::exit_error::ExitError;
use vigil_core::{Goal, JobState, ProcessState};
use vigil_wire::Message;

/// One status line: `name (goal) state` plus the process fragment for
/// anything past waiting.
pub fn status_line(
    name: &str,
    goal: Goal,
    state: JobState,
    process_state: ProcessState,
    pid: i32,
) -> String {
    let mut line = format!("{name} ({goal}) {state}");
    if state == JobState::Waiting {
        return line;
    }
    match process_state {
        ProcessState::None | ProcessState::Spawned => {
            line.push_str(&format!(", process {process_state}"));
        }
        ProcessState::Active | ProcessState::Killed => {
            line.push_str(&format!(", process {pid} {process_state}"));
        }
    }
    line
}

/// Print one reply; true when it was a real status, false for unknown.
fn print_reply(reply: &Message) -> Result<bool, ExitError> {
    match reply {
        Message::JobStatus { name, goal, state, process_state, pid, .. } => {
            println!("{}", status_line(name, *goal, *state, *process_state, *pid));
            Ok(true)
        }
        Message::JobUnknown { name } => {
            eprintln!("unknown job: {name}");
            Ok(false)
        }
        other => Err(ExitError::new(1, format!("unexpected reply: {}", other.name()))),
    }
}

/// `start`/`stop`/`status`/`reload`: one request and one reply per job
/// name. All names are attempted; any unknown job fails the command.
pub async fn per_job(
    client: &mut Client,
    jobs: &[String],
    make: impl Fn(String) -> Message,
) -> Result<(), ExitError> {
    let mut failed = false;
    for job in jobs {
        client.send(&make(job.clone())).await?;
        let reply = client.recv().await?;
        if !print_reply(&reply)? {
            failed = true;
        }
    }
    if failed {
        return Err(ExitError::silent(1));
    }
    Ok(())
}

/// `list`: statuses stream until the end marker.
pub async fn list(client: &mut Client) -> Result<(), ExitError> {
    client.send(&Message::JobList).await?;
    loop {
        match client.recv().await? {
            Message::JobListEnd => return Ok(()),
            reply => {
                print_reply(&reply)?;
            }
        }
    }
}

/// `watch`: subscribe and print broadcasts until the daemon goes away or
/// the user interrupts us.
pub async fn watch(client: &mut Client) -> Result<(), ExitError> {
    client.send(&Message::WatchJobs).await?;
    loop {
        let reply = client.recv().await?;
        print_reply(&reply)?;
    }
}

/// `emit`: fire an event, optionally with KEY=VALUE environment.
pub async fn emit(client: &mut Client, event: String, env: Vec<String>) -> Result<(), ExitError> {
    for entry in &env {
        if !entry.contains('=') {
            return Err(ExitError::new(1, format!("malformed environment entry: {entry}")));
        }
    }
    client.send(&Message::EventEmit { name: event, env }).await
}

#[cfg(test)]
#[path = "commands_tests.rs"]
mod tests;
