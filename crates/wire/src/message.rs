// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed control messages and their tag + pack-string encodings.

use crate::pack::{
    pop_int, pop_string, pop_unsigned, push_int, push_string, push_unsigned, WireError,
};
use vigil_core::{Goal, JobState, ProcessState};

// Client → server tags.
const JOB_START: u32 = 0x01;
const JOB_STOP: u32 = 0x02;
const JOB_QUERY: u32 = 0x03;
const JOB_LIST: u32 = 0x04;
const WATCH_JOBS: u32 = 0x05;
const JOB_RELOAD: u32 = 0x06;
const EVENT_EMIT: u32 = 0x10;

// Server → client tags.
const JOB_STATUS: u32 = 0x80;
const JOB_UNKNOWN: u32 = 0x81;
const JOB_LIST_END: u32 = 0x82;

/// One message on the control socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Set the goal of the named job to start. Pack: `s`.
    JobStart { name: String },
    /// Set the goal of the named job to stop. Pack: `s`.
    JobStop { name: String },
    /// Request the named job's current status. Pack: `s`.
    JobQuery { name: String },
    /// Enumerate all jobs.
    JobList,
    /// Subscribe to status broadcasts.
    WatchJobs,
    /// Re-read one job definition from disk. Pack: `s`.
    JobReload { name: String },
    /// Inject an event, with optional `KEY=VALUE` environment.
    /// Pack: `s`, then a `u` count followed by that many `s` fields.
    EventEmit { name: String, env: Vec<String> },
    /// A job's status. Pack: `s u u u i s`; a pid of 0 means no tracked
    /// child; the description may be NULL.
    JobStatus {
        name: String,
        goal: Goal,
        state: JobState,
        process_state: ProcessState,
        pid: i32,
        description: Option<String>,
    },
    /// The named job is not in the catalog. Pack: `s`.
    JobUnknown { name: String },
    /// End of a `JobList` reply stream.
    JobListEnd,
}

impl Message {
    /// Message-type name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Message::JobStart { .. } => "job-start",
            Message::JobStop { .. } => "job-stop",
            Message::JobQuery { .. } => "job-query",
            Message::JobList => "job-list",
            Message::WatchJobs => "watch-jobs",
            Message::JobReload { .. } => "job-reload",
            Message::EventEmit { .. } => "event-emit",
            Message::JobStatus { .. } => "job-status",
            Message::JobUnknown { .. } => "job-unknown",
            Message::JobListEnd => "job-list-end",
        }
    }

    /// Encode into a frame payload: type tag, then packed fields.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        match self {
            Message::JobStart { name } => {
                push_unsigned(&mut buf, JOB_START);
                push_string(&mut buf, Some(name));
            }
            Message::JobStop { name } => {
                push_unsigned(&mut buf, JOB_STOP);
                push_string(&mut buf, Some(name));
            }
            Message::JobQuery { name } => {
                push_unsigned(&mut buf, JOB_QUERY);
                push_string(&mut buf, Some(name));
            }
            Message::JobList => push_unsigned(&mut buf, JOB_LIST),
            Message::WatchJobs => push_unsigned(&mut buf, WATCH_JOBS),
            Message::JobReload { name } => {
                push_unsigned(&mut buf, JOB_RELOAD);
                push_string(&mut buf, Some(name));
            }
            Message::EventEmit { name, env } => {
                push_unsigned(&mut buf, EVENT_EMIT);
                push_string(&mut buf, Some(name));
                push_unsigned(&mut buf, env.len() as u32);
                for entry in env {
                    push_string(&mut buf, Some(entry));
                }
            }
            Message::JobStatus { name, goal, state, process_state, pid, description } => {
                push_unsigned(&mut buf, JOB_STATUS);
                push_string(&mut buf, Some(name));
                push_unsigned(&mut buf, *goal as u32);
                push_unsigned(&mut buf, *state as u32);
                push_unsigned(&mut buf, *process_state as u32);
                push_int(&mut buf, *pid);
                push_string(&mut buf, description.as_deref());
            }
            Message::JobUnknown { name } => {
                push_unsigned(&mut buf, JOB_UNKNOWN);
                push_string(&mut buf, Some(name));
            }
            Message::JobListEnd => push_unsigned(&mut buf, JOB_LIST_END),
        }
        buf
    }

    /// Decode a frame payload. Trailing bytes are malformed.
    pub fn decode(payload: &[u8]) -> Result<Message, WireError> {
        let mut buf = payload;
        let tag = pop_unsigned(&mut buf)?;
        let message = match tag {
            JOB_START => Message::JobStart { name: required_string(&mut buf)? },
            JOB_STOP => Message::JobStop { name: required_string(&mut buf)? },
            JOB_QUERY => Message::JobQuery { name: required_string(&mut buf)? },
            JOB_LIST => Message::JobList,
            WATCH_JOBS => Message::WatchJobs,
            JOB_RELOAD => Message::JobReload { name: required_string(&mut buf)? },
            EVENT_EMIT => {
                let name = required_string(&mut buf)?;
                let count = pop_unsigned(&mut buf)? as usize;
                // Each entry needs at least its length prefix.
                if count > buf.len() / 4 {
                    return Err(WireError::Invalid("environment count past end of message"));
                }
                let mut env = Vec::with_capacity(count);
                for _ in 0..count {
                    env.push(required_string(&mut buf)?);
                }
                Message::EventEmit { name, env }
            }
            JOB_STATUS => {
                let name = required_string(&mut buf)?;
                let goal = pop_unsigned(&mut buf)?;
                let state = pop_unsigned(&mut buf)?;
                let process_state = pop_unsigned(&mut buf)?;
                let pid = pop_int(&mut buf)?;
                let description = pop_string(&mut buf)?;
                Message::JobStatus {
                    name,
                    goal: Goal::from_u32(goal).ok_or(WireError::Invalid("unknown goal"))?,
                    state: JobState::from_u32(state)
                        .ok_or(WireError::Invalid("unknown job state"))?,
                    process_state: ProcessState::from_u32(process_state)
                        .ok_or(WireError::Invalid("unknown process state"))?,
                    pid,
                    description,
                }
            }
            JOB_UNKNOWN => Message::JobUnknown { name: required_string(&mut buf)? },
            JOB_LIST_END => Message::JobListEnd,
            other => return Err(WireError::UnknownType(other)),
        };
        if !buf.is_empty() {
            return Err(WireError::Invalid("trailing bytes after message"));
        }
        Ok(message)
    }
}

fn required_string(buf: &mut &[u8]) -> Result<String, WireError> {
    pop_string(buf)?.ok_or(WireError::Invalid("unexpected NULL string"))
}

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;
