// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Child reaper: the only place that calls `waitpid`.
//!
//! The SIGCHLD handler (tokio's signal stream) merely wakes the dispatcher
//! loop; draining happens on the loop so nothing async-signal-unsafe runs
//! in handler context. Every reapable child is consumed in one drain, and
//! pids that no supervised job owns are silently discarded.

use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use vigil_core::ChildEvent;

/// Shared pid → job-name index.
///
/// The dispatcher registers a pid when it spawns and unregisters it when
/// the death event is consumed; the reaper only ever reads.
#[derive(Clone, Default)]
pub(crate) struct PidIndex {
    inner: Arc<Mutex<HashMap<i32, String>>>,
}

impl PidIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, pid: i32, job: &str) {
        self.inner.lock().insert(pid, job.to_string());
    }

    pub fn unregister(&self, pid: i32) {
        self.inner.lock().remove(&pid);
    }

    pub fn lookup(&self, pid: i32) -> Option<String> {
        self.inner.lock().get(&pid).cloned()
    }

    // NOTE: used in tests
    #[allow(dead_code)]
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }
}

/// One reaped observation, already attributed to its owning job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Reaped {
    pub job: String,
    pub pid: i32,
    pub event: ChildEvent,
}

/// Convert a raw wait status into `(pid, event)`.
///
/// Returns `None` for statuses that carry no per-child information
/// (`StillAlive`) or that the supervisor has no use for.
pub(crate) fn convert(status: WaitStatus) -> Option<(i32, ChildEvent)> {
    match status {
        WaitStatus::Exited(pid, code) => Some((pid.as_raw(), ChildEvent::Exited { status: code })),
        WaitStatus::Signaled(pid, signal, core_dumped) => {
            let event = if core_dumped {
                ChildEvent::Dumped { signal: signal as i32 }
            } else {
                ChildEvent::Killed { signal: signal as i32 }
            };
            Some((pid.as_raw(), event))
        }
        WaitStatus::Stopped(pid, signal) => {
            Some((pid.as_raw(), ChildEvent::Stopped { signal: signal as i32 }))
        }
        WaitStatus::Continued(pid) => Some((pid.as_raw(), ChildEvent::Continued)),
        WaitStatus::PtraceEvent(pid, _, event) => {
            Some((pid.as_raw(), ChildEvent::Trapped { event }))
        }
        WaitStatus::PtraceSyscall(_) | WaitStatus::StillAlive => None,
    }
}

/// Drain every reapable child, attributing each to its owning job.
pub(crate) fn drain(index: &PidIndex) -> Vec<Reaped> {
    let flags = WaitPidFlag::WNOHANG | WaitPidFlag::WUNTRACED | WaitPidFlag::WCONTINUED;
    let mut reaped = Vec::new();
    loop {
        match waitpid(Pid::from_raw(-1), Some(flags)) {
            Ok(WaitStatus::StillAlive) => break,
            Ok(status) => {
                let Some((pid, event)) = convert(status) else { continue };
                match index.lookup(pid) {
                    Some(job) => reaped.push(Reaped { job, pid, event }),
                    None => tracing::debug!(pid, event = event.name(), "discarding unowned child"),
                }
            }
            // No children at all.
            Err(nix::Error::ECHILD) => break,
            Err(e) => {
                tracing::warn!(error = %e, "waitpid failed");
                break;
            }
        }
    }
    reaped
}

#[cfg(test)]
#[path = "reaper_tests.rs"]
mod tests;
