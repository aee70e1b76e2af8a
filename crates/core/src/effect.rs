// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Effects: the side effects the dispatcher performs on the machine's behalf.

use crate::enums::ProcessKind;
use crate::job::JobStatus;
use std::time::Duration;

/// Signal the machine wants delivered to a child.
///
/// Kept symbolic so the core never depends on OS signal numbering; the
/// daemon maps these onto real signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind {
    Term,
    Kill,
    Cont,
}

crate::simple_display! {
    SignalKind {
        Term => "TERM",
        Kill => "KILL",
        Cont => "CONT",
    }
}

/// Side effects returned by one machine step, executed by the dispatcher
/// in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Spawn the named action of this job.
    Spawn { kind: ProcessKind },
    /// Deliver a signal to a child process.
    Signal { pid: i32, signal: SignalKind },
    /// Arm this job's kill timer.
    SetTimer { duration: Duration },
    /// Disarm this job's kill timer.
    CancelTimer,
    /// Broadcast a status snapshot to watchers (and the requester, if any).
    ///
    /// The snapshot is captured at emission time: a single machine step can
    /// move through several states and each one is observed.
    EmitStatus { status: JobStatus },
    /// The instance finished draining after deletion; the catalog may
    /// destroy it now.
    DestroyInstance,
}

impl Effect {
    /// Effect name for log spans (e.g. "spawn", "signal").
    pub fn name(&self) -> &'static str {
        match self {
            Effect::Spawn { .. } => "spawn",
            Effect::Signal { .. } => "signal",
            Effect::SetTimer { .. } => "set-timer",
            Effect::CancelTimer => "cancel-timer",
            Effect::EmitStatus { .. } => "emit-status",
            Effect::DestroyInstance => "destroy-instance",
        }
    }

    /// Key-value pairs for structured logging.
    pub fn fields(&self) -> Vec<(&'static str, String)> {
        match self {
            Effect::Spawn { kind } => vec![("kind", kind.to_string())],
            Effect::Signal { pid, signal } => {
                vec![("pid", pid.to_string()), ("signal", signal.to_string())]
            }
            Effect::SetTimer { duration } => {
                vec![("duration_ms", duration.as_millis().to_string())]
            }
            Effect::EmitStatus { status } => vec![
                ("goal", status.goal.to_string()),
                ("state", status.state.to_string()),
            ],
            Effect::CancelTimer | Effect::DestroyInstance => Vec::new(),
        }
    }
}
