// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Machine inputs: goal changes, spawn feedback, child events, timers.

use crate::enums::{Goal, ProcessKind};
use serde::{Deserialize, Serialize};

/// What the reaper observed about a child process.
///
/// Raw wait statuses are converted into these by the daemon; the core only
/// ever sees plain integers, never OS types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChildEvent {
    /// Normal termination with an exit code.
    Exited { status: i32 },
    /// Terminated by a signal.
    Killed { signal: i32 },
    /// Terminated by a signal, with a core dump.
    Dumped { signal: i32 },
    /// Stopped by a signal (the SIGSTOP handshake rides on this).
    Stopped { signal: i32 },
    /// Resumed after a stop.
    Continued,
    /// Ptrace event notification.
    Trapped { event: i32 },
}

impl ChildEvent {
    /// Event name for log fields.
    pub fn name(&self) -> &'static str {
        match self {
            ChildEvent::Exited { .. } => "exited",
            ChildEvent::Killed { .. } => "killed",
            ChildEvent::Dumped { .. } => "dumped",
            ChildEvent::Stopped { .. } => "stopped",
            ChildEvent::Continued => "continued",
            ChildEvent::Trapped { .. } => "trapped",
        }
    }

    /// Whether this event means the child is gone.
    pub fn is_death(&self) -> bool {
        matches!(
            self,
            ChildEvent::Exited { .. } | ChildEvent::Killed { .. } | ChildEvent::Dumped { .. }
        )
    }

    /// Whether a death event counts as a clean exit.
    pub fn is_success(&self) -> bool {
        matches!(self, ChildEvent::Exited { status: 0 })
    }
}

/// One input to the job state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    /// External request to change the goal.
    SetGoal(Goal),
    /// The dispatcher spawned an action and obtained a pid.
    ProcessSpawned { kind: ProcessKind, pid: i32 },
    /// The operating system refused to create the child.
    SpawnFailed { kind: ProcessKind },
    /// The reaper reported something about the tracked child.
    Child(ChildEvent),
    /// The kill timer for this job fired.
    TimerExpired,
}

impl Input {
    /// Input name for log spans.
    pub fn name(&self) -> &'static str {
        match self {
            Input::SetGoal(..) => "set-goal",
            Input::ProcessSpawned { .. } => "process-spawned",
            Input::SpawnFailed { .. } => "spawn-failed",
            Input::Child(..) => "child",
            Input::TimerExpired => "timer-expired",
        }
    }
}
