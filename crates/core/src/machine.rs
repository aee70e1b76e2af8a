// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The job state machine.
//!
//! [`step`] is a pure function `(job, input) → effects`; it mutates the
//! instance in place and returns the side effects the dispatcher must
//! execute, in order. It never fails: every input yields a transition.
//!
//! State changes cascade inside a single step (e.g. a start with no
//! pre-start moves Waiting → Starting → Spawned before returning), and a
//! status snapshot is pushed for each externally visible change, in
//! transition order.

use crate::effect::{Effect, SignalKind};
use crate::enums::{Goal, JobState, ProcessKind, ProcessState};
use crate::event::{ChildEvent, Input};
use crate::job::{Job, JobDefinition, RespawnVerdict, DEFAULT_KILL_TIMEOUT};
use std::time::Instant;

/// Apply one input to a job, returning the effects to execute.
pub fn step(job: &mut Job, def: &JobDefinition, input: Input, now: Instant) -> Vec<Effect> {
    let mut fx = Vec::new();
    match input {
        Input::SetGoal(goal) => set_goal(job, def, goal, &mut fx),
        Input::ProcessSpawned { kind, pid } => process_spawned(job, def, kind, pid, &mut fx),
        Input::SpawnFailed { kind } => spawn_failed(job, def, kind, now, &mut fx),
        Input::Child(event) => child_event(job, def, event, now, &mut fx),
        Input::TimerExpired => timer_expired(job, &mut fx),
    }
    fx
}

/// The catalog dropped this job's definition while the instance was live.
///
/// Forces the goal to stop, kills whatever is still tracked, and parks the
/// instance in `Deleted` until the last pid drains. An idle instance is
/// destroyable immediately.
pub fn delete(job: &mut Job) -> Vec<Effect> {
    let mut fx = Vec::new();
    job.goal = Goal::Stop;
    job.state = JobState::Deleted;
    match job.pid {
        None => {
            status(job, &mut fx);
            fx.push(Effect::DestroyInstance);
        }
        Some(pid) => {
            if job.process_state == ProcessState::Spawned {
                fx.push(Effect::Signal { pid, signal: SignalKind::Cont });
            }
            job.process_state = ProcessState::Killed;
            job.kill_escalated = false;
            status(job, &mut fx);
            fx.push(Effect::Signal { pid, signal: SignalKind::Term });
            fx.push(Effect::SetTimer { duration: DEFAULT_KILL_TIMEOUT });
        }
    }
    fx
}

fn status(job: &Job, fx: &mut Vec<Effect>) {
    fx.push(Effect::EmitStatus { status: job.status() });
}

// ---------------------------------------------------------------------------
// Goal changes
// ---------------------------------------------------------------------------

fn set_goal(job: &mut Job, def: &JobDefinition, goal: Goal, fx: &mut Vec<Effect>) {
    // Idempotent: already heading there.
    if job.goal == goal || job.state == JobState::Deleted {
        return;
    }
    job.goal = goal;

    match goal {
        Goal::Start => {
            job.reset_respawn();
            if job.state == JobState::Waiting {
                begin_start(job, def, fx);
            }
            // In any stop-path state the goal is recorded; the machinery
            // re-evaluates it at the next child exit.
        }
        Goal::Stop => match job.state {
            JobState::Running => begin_stop(job, def, fx),
            // Main is live with no script in flight: take it down now.
            JobState::Spawned => enter_stopping(job, def, fx),
            // Starting/PreStart/PostStart: the in-flight script completes
            // first, then the machine diverts into the stop tail.
            _ => {}
        },
    }
}

fn begin_start(job: &mut Job, def: &JobDefinition, fx: &mut Vec<Effect>) {
    job.kill_escalated = false;
    job.state = JobState::Starting;
    status(job, fx);
    if def.has_action(ProcessKind::PreStart) {
        fx.push(Effect::Spawn { kind: ProcessKind::PreStart });
    } else {
        enter_spawned(job, fx);
    }
}

fn begin_stop(job: &mut Job, def: &JobDefinition, fx: &mut Vec<Effect>) {
    if def.has_action(ProcessKind::PreStop) {
        job.state = JobState::PreStop;
        status(job, fx);
        fx.push(Effect::Spawn { kind: ProcessKind::PreStop });
    } else {
        enter_stopping(job, def, fx);
    }
}

// ---------------------------------------------------------------------------
// Spawn feedback
// ---------------------------------------------------------------------------

fn process_spawned(
    job: &mut Job,
    def: &JobDefinition,
    kind: ProcessKind,
    pid: i32,
    fx: &mut Vec<Effect>,
) {
    match (job.state, kind) {
        (JobState::Starting, ProcessKind::PreStart) => {
            job.track(pid, ProcessState::Active);
            job.state = JobState::PreStart;
            status(job, fx);
        }
        (JobState::Spawned, ProcessKind::Main) => {
            job.main_pid = Some(pid);
            job.track(pid, ProcessState::Spawned);
            if job.goal == Goal::Stop {
                enter_stopping(job, def, fx);
            } else if !def.wait_for_stop {
                job.process_state = ProcessState::Active;
                after_main_active(job, def, fx);
            }
            // wait_for_stop: stay in Spawned until the reaper reports the
            // self-raised SIGSTOP.
        }
        (JobState::PostStart, ProcessKind::PostStart)
        | (JobState::PreStop, ProcessKind::PreStop)
        | (JobState::PostStop, ProcessKind::PostStop) => {
            job.track(pid, ProcessState::Active);
        }
        // Stale confirmation for a state we already left.
        _ => {}
    }
}

fn spawn_failed(
    job: &mut Job,
    def: &JobDefinition,
    kind: ProcessKind,
    now: Instant,
    fx: &mut Vec<Effect>,
) {
    match kind {
        // Divert straight to the stop tail; main is never spawned.
        ProcessKind::PreStart => stop_tail(job, def, fx),
        // Instant respawn-eligible failure.
        ProcessKind::Main => main_exited(job, def, now, fx),
        // Advance as if the script had exited 0.
        ProcessKind::PostStart => {
            if def.wait_for_stop {
                if let Some(pid) = job.pid {
                    fx.push(Effect::Signal { pid, signal: SignalKind::Cont });
                }
            }
            if job.goal == Goal::Stop {
                enter_stopping(job, def, fx);
            } else {
                enter_running(job, fx);
            }
        }
        ProcessKind::PreStop => {
            if job.goal == Goal::Start {
                enter_running(job, fx);
            } else {
                enter_stopping(job, def, fx);
            }
        }
        ProcessKind::PostStop => enter_waiting(job, def, fx),
    }
}

// ---------------------------------------------------------------------------
// Child events
// ---------------------------------------------------------------------------

fn child_event(
    job: &mut Job,
    def: &JobDefinition,
    event: ChildEvent,
    now: Instant,
    fx: &mut Vec<Effect>,
) {
    match event {
        ChildEvent::Exited { .. } | ChildEvent::Killed { .. } | ChildEvent::Dumped { .. } => {
            child_gone(job, def, event, now, fx)
        }
        ChildEvent::Stopped { .. } => {
            // The post-start handshake: main raised SIGSTOP on itself to
            // announce readiness. Any other stop is not ours to manage.
            if job.state == JobState::Spawned
                && def.wait_for_stop
                && job.process_state == ProcessState::Spawned
            {
                job.process_state = ProcessState::Active;
                if job.goal == Goal::Stop {
                    enter_stopping(job, def, fx);
                } else {
                    after_main_active(job, def, fx);
                }
            }
        }
        ChildEvent::Continued | ChildEvent::Trapped { .. } => {}
    }
}

fn child_gone(
    job: &mut Job,
    def: &JobDefinition,
    event: ChildEvent,
    now: Instant,
    fx: &mut Vec<Effect>,
) {
    let dead = job.clear_tracked();
    if dead.is_some() && dead == job.main_pid {
        job.main_pid = None;
    }

    match job.state {
        JobState::PreStart => {
            if job.goal == Goal::Stop || !event.is_success() {
                stop_tail(job, def, fx);
            } else {
                enter_spawned(job, fx);
            }
        }
        // Main died before (or while) establishing itself.
        JobState::Spawned => main_exited(job, def, now, fx),
        JobState::Running => main_exited(job, def, now, fx),
        JobState::PostStart => {
            // The post-start script finished; main becomes the tracked
            // child again, and a handshake-stopped main is released.
            job.retrack_main(ProcessState::Active);
            if def.wait_for_stop {
                if let Some(pid) = job.pid {
                    fx.push(Effect::Signal { pid, signal: SignalKind::Cont });
                }
            }
            if job.goal == Goal::Stop {
                enter_stopping(job, def, fx);
            } else {
                enter_running(job, fx);
            }
        }
        JobState::PreStop => {
            job.retrack_main(ProcessState::Active);
            if job.goal == Goal::Start {
                // Stop was aborted while pre-stop ran.
                enter_running(job, fx);
            } else {
                enter_stopping(job, def, fx);
            }
        }
        JobState::Stopping | JobState::Killed => {
            fx.push(Effect::CancelTimer);
            stop_tail(job, def, fx);
        }
        JobState::PostStop => enter_waiting(job, def, fx),
        JobState::Deleted => {
            fx.push(Effect::CancelTimer);
            status(job, fx);
            fx.push(Effect::DestroyInstance);
        }
        JobState::Waiting | JobState::Starting => {}
    }
}

fn main_exited(job: &mut Job, def: &JobDefinition, now: Instant, fx: &mut Vec<Effect>) {
    if job.goal == Goal::Start {
        match def.respawn {
            Some(policy) => match job.note_respawn(&policy, now) {
                RespawnVerdict::Admitted => {
                    enter_spawned(job, fx);
                    return;
                }
                RespawnVerdict::LimitExceeded => {
                    job.goal = Goal::Stop;
                    job.respawn_limited = true;
                }
            },
            None => job.goal = Goal::Stop,
        }
    }
    stop_tail(job, def, fx);
}

// ---------------------------------------------------------------------------
// Timers
// ---------------------------------------------------------------------------

fn timer_expired(job: &mut Job, fx: &mut Vec<Effect>) {
    // TERM→KILL upgrade, exactly once. Death is the only terminal event
    // from here on.
    let killing = matches!(job.state, JobState::Killed | JobState::Deleted);
    if killing && job.process_state == ProcessState::Killed && !job.kill_escalated {
        job.kill_escalated = true;
        if let Some(pid) = job.pid {
            fx.push(Effect::Signal { pid, signal: SignalKind::Kill });
        }
    }
}

// ---------------------------------------------------------------------------
// State entry helpers
// ---------------------------------------------------------------------------

fn enter_spawned(job: &mut Job, fx: &mut Vec<Effect>) {
    job.state = JobState::Spawned;
    status(job, fx);
    fx.push(Effect::Spawn { kind: ProcessKind::Main });
}

fn after_main_active(job: &mut Job, def: &JobDefinition, fx: &mut Vec<Effect>) {
    if def.has_action(ProcessKind::PostStart) {
        job.state = JobState::PostStart;
        status(job, fx);
        fx.push(Effect::Spawn { kind: ProcessKind::PostStart });
    } else {
        if def.wait_for_stop {
            if let Some(pid) = job.pid {
                fx.push(Effect::Signal { pid, signal: SignalKind::Cont });
            }
        }
        enter_running(job, fx);
    }
}

fn enter_running(job: &mut Job, fx: &mut Vec<Effect>) {
    job.state = JobState::Running;
    status(job, fx);
}

fn enter_stopping(job: &mut Job, def: &JobDefinition, fx: &mut Vec<Effect>) {
    job.state = JobState::Stopping;
    status(job, fx);

    // Tracked child must be main here; callers retrack before diverting.
    match job.pid {
        Some(pid) => {
            // A main still parked in the SIGSTOP handshake needs releasing
            // before TERM can do anything.
            if job.process_state == ProcessState::Spawned {
                fx.push(Effect::Signal { pid, signal: SignalKind::Cont });
            }
            job.process_state = ProcessState::Killed;
            job.kill_escalated = false;
            job.state = JobState::Killed;
            status(job, fx);
            fx.push(Effect::Signal { pid, signal: SignalKind::Term });
            fx.push(Effect::SetTimer { duration: def.kill_timeout });
        }
        None => stop_tail(job, def, fx),
    }
}

fn stop_tail(job: &mut Job, def: &JobDefinition, fx: &mut Vec<Effect>) {
    if def.has_action(ProcessKind::PostStop) {
        job.state = JobState::PostStop;
        status(job, fx);
        fx.push(Effect::Spawn { kind: ProcessKind::PostStop });
    } else {
        enter_waiting(job, def, fx);
    }
}

fn enter_waiting(job: &mut Job, def: &JobDefinition, fx: &mut Vec<Effect>) {
    job.state = JobState::Waiting;
    job.process_state = ProcessState::None;
    job.pid = None;
    job.main_pid = None;
    job.kill_escalated = false;
    status(job, fx);

    if job.goal == Goal::Start {
        // Operator re-start during the stop tail, or the stop leg of a
        // respawn: go again. Event environment carries over.
        begin_start(job, def, fx);
    } else {
        job.event_env.clear();
    }
}

#[cfg(test)]
#[path = "machine_tests.rs"]
mod tests;
