// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job definition and live instance.

use crate::enums::{ConsoleType, Goal, JobState, ProcessKind, ProcessState};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Default TERM→KILL escalation grace.
pub const DEFAULT_KILL_TIMEOUT: Duration = Duration::from_secs(5);

/// Default respawn rate limit: more than this many respawns inside the
/// window disables the job.
pub const DEFAULT_RESPAWN_LIMIT: u32 = 10;

/// Default respawn rate-limit window.
pub const DEFAULT_RESPAWN_WINDOW: Duration = Duration::from_secs(5);

/// How an action is executed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionSpec {
    /// A command line handed to `/bin/sh -c`.
    Command(String),
    /// A pre-split argv vector, executed directly.
    Args(Vec<String>),
}

/// Bounded-retries-per-rolling-window respawn policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RespawnPolicy {
    pub limit: u32,
    pub window: Duration,
}

impl Default for RespawnPolicy {
    fn default() -> Self {
        Self { limit: DEFAULT_RESPAWN_LIMIT, window: DEFAULT_RESPAWN_WINDOW }
    }
}

/// Declaratively configured unit the supervisor manages.
///
/// Immutable once registered; the catalog swaps whole definitions on reload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobDefinition {
    pub name: String,
    pub description: String,
    /// Up to five actions, keyed by [`ProcessKind`].
    pub actions: HashMap<ProcessKind, ActionSpec>,
    pub console: ConsoleType,
    /// Ordered `KEY=VALUE` environment overlay for spawned children.
    pub env: Vec<(String, String)>,
    pub respawn: Option<RespawnPolicy>,
    /// Main raises SIGSTOP on itself when ready to serve.
    pub wait_for_stop: bool,
    /// Event names that set the goal to START.
    pub start_on: Vec<String>,
    /// Event names that set the goal to STOP.
    pub stop_on: Vec<String>,
    pub kill_timeout: Duration,
}

impl JobDefinition {
    /// Create a definition with just a name and description; actions and
    /// policies are filled in by the loader.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            actions: HashMap::new(),
            console: ConsoleType::default(),
            env: Vec::new(),
            respawn: None,
            wait_for_stop: false,
            start_on: Vec::new(),
            stop_on: Vec::new(),
            kill_timeout: DEFAULT_KILL_TIMEOUT,
        }
    }

    pub fn action(&self, kind: ProcessKind) -> Option<&ActionSpec> {
        self.actions.get(&kind)
    }

    pub fn has_action(&self, kind: ProcessKind) -> bool {
        self.actions.contains_key(&kind)
    }
}

crate::builder! {
    pub struct JobDefinitionBuilder => JobDefinition {
        into {
            name: String = "test-job",
            description: String = "a test job",
        }
        set {
            actions: HashMap<ProcessKind, ActionSpec> = HashMap::new(),
            console: ConsoleType = ConsoleType::default(),
            env: Vec<(String, String)> = Vec::new(),
            respawn: Option<RespawnPolicy> = None,
            wait_for_stop: bool = false,
            start_on: Vec<String> = Vec::new(),
            stop_on: Vec<String> = Vec::new(),
            kill_timeout: Duration = DEFAULT_KILL_TIMEOUT,
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
impl JobDefinitionBuilder {
    /// Shorthand for adding a command-line action.
    pub fn command(mut self, kind: ProcessKind, line: impl Into<String>) -> Self {
        self.actions.insert(kind, ActionSpec::Command(line.into()));
        self
    }
}

/// Verdict of the respawn rate limiter for one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RespawnVerdict {
    Admitted,
    LimitExceeded,
}

/// Point-in-time snapshot of a job's externally observable state.
///
/// Captured whenever the machine emits a status effect; what goes over the
/// wire and to the logs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStatus {
    pub name: String,
    pub goal: Goal,
    pub state: JobState,
    pub process_state: ProcessState,
    pub pid: Option<i32>,
    /// The respawn limiter tripped; the description gets flagged.
    pub respawn_limited: bool,
}

/// Live, mutable state of a job.
///
/// Created lazily on the first non-idle transition and persists across
/// start/stop cycles until the definition is removed.
#[derive(Debug, Clone)]
pub struct Job {
    pub name: String,
    pub goal: Goal,
    pub state: JobState,
    /// Shape of the currently tracked child, if any.
    pub process_state: ProcessState,
    /// Pid of the tracked child; set exactly when `process_state != None`.
    pub pid: Option<i32>,
    /// Main's pid, remembered while a script runs alongside it
    /// (post-start / pre-stop) so the machine can signal main afterwards.
    pub main_pid: Option<i32>,
    pub respawn_count: u32,
    pub respawn_window_start: Option<Instant>,
    /// The respawn limiter tripped; reflected in the status description
    /// until the next explicit start.
    pub respawn_limited: bool,
    /// TERM→KILL upgrade already happened for the current kill cycle.
    pub kill_escalated: bool,
    /// Environment captured from the triggering event, merged into spawns
    /// for the current start cycle.
    pub event_env: Vec<(String, String)>,
}

impl Job {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            goal: Goal::Stop,
            state: JobState::Waiting,
            process_state: ProcessState::None,
            pid: None,
            main_pid: None,
            respawn_count: 0,
            respawn_window_start: None,
            respawn_limited: false,
            kill_escalated: false,
            event_env: Vec::new(),
        }
    }

    /// Point the tracker at a newly obtained pid.
    pub fn track(&mut self, pid: i32, process_state: ProcessState) {
        self.pid = Some(pid);
        self.process_state = process_state;
    }

    /// Drop the tracked child (post-reap). Returns the pid that was tracked.
    pub fn clear_tracked(&mut self) -> Option<i32> {
        self.process_state = ProcessState::None;
        self.pid.take()
    }

    /// Re-point the tracker at main after an auxiliary script finished.
    ///
    /// Returns false when main's pid is no longer known (it was never
    /// spawned, or already fully released).
    pub fn retrack_main(&mut self, process_state: ProcessState) -> bool {
        match self.main_pid {
            Some(pid) => {
                self.track(pid, process_state);
                true
            }
            None => false,
        }
    }

    /// Whether the instance is idle: nothing tracked, nothing to drain.
    pub fn is_idle(&self) -> bool {
        self.process_state == ProcessState::None && self.state == JobState::Waiting
    }

    /// Account one respawn attempt against the policy's rolling window.
    pub fn note_respawn(&mut self, policy: &RespawnPolicy, now: Instant) -> RespawnVerdict {
        match self.respawn_window_start {
            Some(start) if now.duration_since(start) <= policy.window => {}
            _ => {
                self.respawn_window_start = Some(now);
                self.respawn_count = 0;
            }
        }
        self.respawn_count += 1;
        if self.respawn_count > policy.limit {
            RespawnVerdict::LimitExceeded
        } else {
            RespawnVerdict::Admitted
        }
    }

    /// Reset respawn accounting (explicit operator start).
    pub fn reset_respawn(&mut self) {
        self.respawn_count = 0;
        self.respawn_window_start = None;
        self.respawn_limited = false;
    }

    /// Snapshot the externally observable state.
    pub fn status(&self) -> JobStatus {
        JobStatus {
            name: self.name.clone(),
            goal: self.goal,
            state: self.state,
            process_state: self.process_state,
            pid: self.pid,
            respawn_limited: self.respawn_limited,
        }
    }
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;
