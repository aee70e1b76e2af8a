// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::clock::{Clock, FakeClock};
use crate::job::{JobStatus, RespawnPolicy};
use std::collections::HashSet;
use std::time::Duration;

/// Drives the machine the way the dispatcher does: spawn effects succeed
/// with sequential pids (unless told to fail) and feed back into the
/// machine; everything else is recorded for assertions.
struct Harness {
    job: Job,
    def: JobDefinition,
    clock: FakeClock,
    statuses: Vec<JobStatus>,
    signals: Vec<(i32, SignalKind)>,
    timers_set: u32,
    timers_cancelled: u32,
    next_pid: i32,
    fail_spawns: HashSet<ProcessKind>,
    destroyed: bool,
}

impl Harness {
    fn new(def: JobDefinition) -> Self {
        let job = Job::new(def.name.clone());
        Self {
            job,
            def,
            clock: FakeClock::new(),
            statuses: Vec::new(),
            signals: Vec::new(),
            timers_set: 0,
            timers_cancelled: 0,
            next_pid: 1000,
            fail_spawns: HashSet::new(),
            destroyed: false,
        }
    }

    fn fail_spawn(mut self, kind: ProcessKind) -> Self {
        self.fail_spawns.insert(kind);
        self
    }

    fn feed(&mut self, input: Input) {
        let fx = step(&mut self.job, &self.def, input, self.clock.now());
        self.execute(fx);
    }

    fn execute(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Spawn { kind } => {
                    if self.fail_spawns.contains(&kind) {
                        self.feed(Input::SpawnFailed { kind });
                    } else {
                        self.next_pid += 1;
                        let pid = self.next_pid;
                        self.feed(Input::ProcessSpawned { kind, pid });
                    }
                }
                Effect::Signal { pid, signal } => self.signals.push((pid, signal)),
                Effect::SetTimer { .. } => self.timers_set += 1,
                Effect::CancelTimer => self.timers_cancelled += 1,
                Effect::EmitStatus { status } => self.statuses.push(status),
                Effect::DestroyInstance => self.destroyed = true,
            }
        }
    }

    fn start(&mut self) {
        self.feed(Input::SetGoal(Goal::Start));
    }

    fn stop(&mut self) {
        self.feed(Input::SetGoal(Goal::Stop));
    }

    fn tracked_exits(&mut self, status: i32) {
        self.feed(Input::Child(ChildEvent::Exited { status }));
    }

    /// States observed by watchers, in broadcast order.
    fn states(&self) -> Vec<JobState> {
        self.statuses.iter().map(|s| s.state).collect()
    }
}

fn main_only() -> JobDefinition {
    JobDefinition::builder().name("tty1").command(ProcessKind::Main, "getty tty1").build()
}

fn five_scripts() -> JobDefinition {
    JobDefinition::builder()
        .name("db")
        .command(ProcessKind::PreStart, "init-db")
        .command(ProcessKind::Main, "run-db")
        .command(ProcessKind::PostStart, "warm-cache")
        .command(ProcessKind::PreStop, "drain")
        .command(ProcessKind::PostStop, "cleanup")
        .build()
}

// ---------------------------------------------------------------------------
// Start
// ---------------------------------------------------------------------------

#[test]
fn happy_start_main_only() {
    let mut h = Harness::new(main_only());
    h.start();

    assert_eq!(h.states(), vec![JobState::Starting, JobState::Spawned, JobState::Running]);
    assert_eq!(h.job.goal, Goal::Start);
    assert_eq!(h.job.state, JobState::Running);
    assert_eq!(h.job.process_state, ProcessState::Active);
    assert!(h.job.pid.is_some());
}

#[test]
fn full_lifecycle_with_scripts() {
    let mut h = Harness::new(five_scripts());

    h.start();
    assert_eq!(h.job.state, JobState::PreStart);
    h.tracked_exits(0); // pre-start
    assert_eq!(h.job.state, JobState::PostStart);
    h.tracked_exits(0); // post-start
    assert_eq!(
        h.states(),
        vec![
            JobState::Starting,
            JobState::PreStart,
            JobState::Spawned,
            JobState::PostStart,
            JobState::Running,
        ]
    );

    h.statuses.clear();
    h.stop();
    assert_eq!(h.job.state, JobState::PreStop);
    h.tracked_exits(0); // pre-stop; TERM goes to main
    assert_eq!(h.job.state, JobState::Killed);
    h.feed(Input::Child(ChildEvent::Killed { signal: 15 }));
    assert_eq!(h.job.state, JobState::PostStop);
    h.tracked_exits(0); // post-stop
    assert_eq!(
        h.states(),
        vec![
            JobState::PreStop,
            JobState::Stopping,
            JobState::Killed,
            JobState::PostStop,
            JobState::Waiting,
        ]
    );
    assert_eq!(h.job.process_state, ProcessState::None);
    assert_eq!(h.job.pid, None);
}

#[test]
fn start_when_already_starting_is_noop() {
    let mut h = Harness::new(main_only());
    h.start();
    let count = h.statuses.len();
    h.start();
    assert_eq!(h.statuses.len(), count);
    assert_eq!(h.job.state, JobState::Running);
}

#[test]
fn tracked_pid_follows_the_current_script() {
    let mut h = Harness::new(five_scripts());
    h.start(); // tracked = pre-start
    let pre_start_pid = h.job.pid;
    h.tracked_exits(0); // main spawned, then post-start spawned
    assert_ne!(h.job.pid, pre_start_pid);
    assert_eq!(h.job.pid, Some(h.next_pid)); // post-start is the newest child
    assert_ne!(h.job.main_pid, h.job.pid);
    h.tracked_exits(0);
    assert_eq!(h.job.pid, h.job.main_pid); // back to main in Running
}

// ---------------------------------------------------------------------------
// Stop
// ---------------------------------------------------------------------------

#[test]
fn stop_sends_term_and_arms_the_kill_timer() {
    let mut h = Harness::new(main_only());
    h.start();
    let main_pid = h.job.pid.unwrap();

    h.stop();
    assert_eq!(h.job.state, JobState::Killed);
    assert_eq!(h.job.process_state, ProcessState::Killed);
    assert_eq!(h.signals, vec![(main_pid, SignalKind::Term)]);
    assert_eq!(h.timers_set, 1);

    h.feed(Input::Child(ChildEvent::Killed { signal: 15 }));
    assert_eq!(h.job.state, JobState::Waiting);
    assert_eq!(h.timers_cancelled, 1);
}

#[test]
fn kill_timer_escalates_to_sigkill_exactly_once() {
    let mut h = Harness::new(main_only());
    h.start();
    let main_pid = h.job.pid.unwrap();
    h.stop();

    h.feed(Input::TimerExpired);
    h.feed(Input::TimerExpired);
    let kills: Vec<_> = h.signals.iter().filter(|(_, s)| *s == SignalKind::Kill).collect();
    assert_eq!(kills, vec![&(main_pid, SignalKind::Kill)]);

    h.feed(Input::Child(ChildEvent::Killed { signal: 9 }));
    assert_eq!(h.job.state, JobState::Waiting);
}

#[test]
fn stop_during_pre_start_skips_main() {
    let mut h = Harness::new(five_scripts());
    h.start();
    assert_eq!(h.job.state, JobState::PreStart);

    h.stop(); // honoured, but the script finishes first
    assert_eq!(h.job.state, JobState::PreStart);

    h.tracked_exits(0);
    // Diverted into the stop tail without ever spawning main.
    assert!(!h.states().contains(&JobState::Spawned));
    assert_eq!(h.job.state, JobState::PostStop);
    h.tracked_exits(0);
    assert_eq!(h.job.state, JobState::Waiting);
}

#[test]
fn failed_pre_start_diverts_to_post_stop() {
    let mut h = Harness::new(five_scripts());
    h.start();
    h.tracked_exits(1); // pre-start failed
    assert!(!h.states().contains(&JobState::Spawned));
    assert_eq!(h.job.state, JobState::PostStop);
}

#[test]
fn start_during_pre_stop_aborts_the_stop() {
    let mut h = Harness::new(five_scripts());
    h.start();
    h.tracked_exits(0);
    h.tracked_exits(0); // running
    let main_pid = h.job.main_pid;

    h.stop();
    assert_eq!(h.job.state, JobState::PreStop);
    h.start(); // change of heart
    h.tracked_exits(0); // pre-stop finishes

    assert_eq!(h.job.state, JobState::Running);
    assert_eq!(h.job.pid, main_pid); // same main, never killed
    assert!(h.signals.is_empty());
}

#[test]
fn restart_requested_during_stop_tail_goes_again() {
    let mut h = Harness::new(main_only());
    h.start();
    h.stop();
    h.start(); // recorded; kill continues

    h.feed(Input::Child(ChildEvent::Killed { signal: 15 }));
    // Settles in Waiting, then immediately starts again.
    let states = h.states();
    let tail = &states[states.len() - 4..];
    assert_eq!(
        tail,
        &[JobState::Waiting, JobState::Starting, JobState::Spawned, JobState::Running][..]
    );
    assert_eq!(h.job.state, JobState::Running);
}

#[test]
fn stop_when_waiting_is_noop() {
    let mut h = Harness::new(main_only());
    h.stop();
    assert!(h.statuses.is_empty());
    assert_eq!(h.job.state, JobState::Waiting);
}

// ---------------------------------------------------------------------------
// Respawn
// ---------------------------------------------------------------------------

fn respawning(limit: u32) -> JobDefinition {
    JobDefinition::builder()
        .name("flaky")
        .command(ProcessKind::Main, "crashy")
        .respawn(Some(RespawnPolicy { limit, window: Duration::from_secs(5) }))
        .build()
}

#[test]
fn main_exit_respawns_while_goal_is_start() {
    let mut h = Harness::new(respawning(10));
    h.start();
    let first_pid = h.job.pid;

    h.tracked_exits(0);
    assert_eq!(h.job.state, JobState::Running);
    assert_ne!(h.job.pid, first_pid);
    assert_eq!(h.job.respawn_count, 1);
}

#[test]
fn respawn_limit_forces_goal_to_stop() {
    let mut h = Harness::new(respawning(10));
    h.start();

    for _ in 0..10 {
        h.tracked_exits(1);
        assert_eq!(h.job.state, JobState::Running);
    }
    h.tracked_exits(1); // the 11th within the window trips the limiter

    assert_eq!(h.job.goal, Goal::Stop);
    assert_eq!(h.job.state, JobState::Waiting);
    assert!(h.job.respawn_limited);

    let last = h.statuses.last().unwrap();
    assert_eq!(last.state, JobState::Waiting);
    assert_eq!(last.goal, Goal::Stop);
    assert_eq!(last.process_state, ProcessState::None);
    assert_eq!(last.pid, None);
    assert!(last.respawn_limited);
}

#[test]
fn respawns_outside_the_window_never_trip() {
    let mut h = Harness::new(respawning(2));
    h.start();

    for _ in 0..5 {
        h.tracked_exits(1);
        assert_eq!(h.job.state, JobState::Running);
        h.clock.advance(Duration::from_secs(6));
    }
    assert_eq!(h.job.goal, Goal::Start);
}

#[test]
fn explicit_start_clears_a_tripped_limiter() {
    let mut h = Harness::new(respawning(1));
    h.start();
    h.tracked_exits(1);
    h.tracked_exits(1);
    assert!(h.job.respawn_limited);
    assert_eq!(h.job.state, JobState::Waiting);

    h.start();
    assert!(!h.job.respawn_limited);
    assert_eq!(h.job.state, JobState::Running);
    assert_eq!(h.job.respawn_count, 0);
}

#[test]
fn main_exit_without_respawn_settles_to_stop() {
    let mut h = Harness::new(main_only());
    h.start();
    h.tracked_exits(0);
    assert_eq!(h.job.goal, Goal::Stop);
    assert_eq!(h.job.state, JobState::Waiting);
}

// ---------------------------------------------------------------------------
// SIGSTOP handshake
// ---------------------------------------------------------------------------

fn handshaking() -> JobDefinition {
    JobDefinition::builder()
        .name("svc")
        .command(ProcessKind::Main, "serve")
        .command(ProcessKind::PostStart, "notify-up")
        .wait_for_stop(true)
        .build()
}

#[test]
fn sigstop_handshake_defers_cont_until_post_start_exits() {
    let mut h = Harness::new(handshaking());
    h.start();

    // Main is spawned but not yet active; we wait for its self-stop.
    assert_eq!(h.job.state, JobState::Spawned);
    assert_eq!(h.job.process_state, ProcessState::Spawned);
    let main_pid = h.job.pid.unwrap();

    h.feed(Input::Child(ChildEvent::Stopped { signal: 19 }));
    assert_eq!(h.job.state, JobState::PostStart);
    assert_eq!(h.job.process_state, ProcessState::Active);
    assert!(h.signals.is_empty()); // no CONT yet

    h.tracked_exits(0); // post-start done
    assert_eq!(h.signals, vec![(main_pid, SignalKind::Cont)]);
    assert_eq!(h.job.state, JobState::Running);
    assert_eq!(h.job.pid, Some(main_pid));
}

#[test]
fn handshake_without_post_start_conts_immediately() {
    let def = JobDefinition::builder()
        .name("svc")
        .command(ProcessKind::Main, "serve")
        .wait_for_stop(true)
        .build();
    let mut h = Harness::new(def);
    h.start();
    let main_pid = h.job.pid.unwrap();

    h.feed(Input::Child(ChildEvent::Stopped { signal: 19 }));
    assert_eq!(h.signals, vec![(main_pid, SignalKind::Cont)]);
    assert_eq!(h.job.state, JobState::Running);
}

#[test]
fn stopping_a_handshake_parked_main_releases_it_first() {
    let def = JobDefinition::builder()
        .name("svc")
        .command(ProcessKind::Main, "serve")
        .wait_for_stop(true)
        .build();
    let mut h = Harness::new(def);
    h.start();
    let main_pid = h.job.pid.unwrap();

    h.stop(); // still parked in SIGSTOP
    assert_eq!(
        h.signals,
        vec![(main_pid, SignalKind::Cont), (main_pid, SignalKind::Term)]
    );
    assert_eq!(h.job.state, JobState::Killed);
}

#[test]
fn stray_stop_events_are_ignored() {
    let mut h = Harness::new(main_only());
    h.start();
    let count = h.statuses.len();
    h.feed(Input::Child(ChildEvent::Stopped { signal: 19 }));
    h.feed(Input::Child(ChildEvent::Continued));
    h.feed(Input::Child(ChildEvent::Trapped { event: 3 }));
    assert_eq!(h.statuses.len(), count);
    assert_eq!(h.job.state, JobState::Running);
}

// ---------------------------------------------------------------------------
// Spawn failures
// ---------------------------------------------------------------------------

#[test]
fn main_spawn_failure_without_respawn_settles() {
    let mut h = Harness::new(main_only()).fail_spawn(ProcessKind::Main);
    h.start();
    assert_eq!(h.job.goal, Goal::Stop);
    assert_eq!(h.job.state, JobState::Waiting);
}

#[test]
fn main_spawn_failure_is_respawn_eligible_and_bounded() {
    let mut h = Harness::new(respawning(10)).fail_spawn(ProcessKind::Main);
    h.start();
    // The limiter bounds the synchronous retry cascade.
    assert_eq!(h.job.goal, Goal::Stop);
    assert_eq!(h.job.state, JobState::Waiting);
    assert!(h.job.respawn_limited);
}

#[test]
fn post_start_spawn_failure_advances_as_success() {
    let mut h = Harness::new(five_scripts()).fail_spawn(ProcessKind::PostStart);
    h.start();
    h.tracked_exits(0); // pre-start
    assert_eq!(h.job.state, JobState::Running);
}

#[test]
fn pre_stop_spawn_failure_advances_as_success() {
    let mut h = Harness::new(five_scripts()).fail_spawn(ProcessKind::PreStop);
    h.start();
    h.tracked_exits(0);
    h.tracked_exits(0);

    h.stop();
    assert_eq!(h.job.state, JobState::Killed); // straight to the kill
}

#[test]
fn post_stop_spawn_failure_still_reaches_waiting() {
    let mut h = Harness::new(five_scripts()).fail_spawn(ProcessKind::PostStop);
    h.start();
    h.tracked_exits(0);
    h.tracked_exits(0);
    h.stop();
    h.tracked_exits(0); // pre-stop
    h.feed(Input::Child(ChildEvent::Killed { signal: 15 }));
    assert_eq!(h.job.state, JobState::Waiting);
}

// ---------------------------------------------------------------------------
// Deletion
// ---------------------------------------------------------------------------

#[test]
fn delete_idle_instance_destroys_immediately() {
    let mut h = Harness::new(main_only());
    let fx = delete(&mut h.job);
    h.execute(fx);
    assert!(h.destroyed);
    assert_eq!(h.job.state, JobState::Deleted);
}

#[test]
fn delete_live_instance_drains_the_pid_first() {
    let mut h = Harness::new(main_only());
    h.start();
    let main_pid = h.job.pid.unwrap();

    let fx = delete(&mut h.job);
    h.execute(fx);
    assert!(!h.destroyed);
    assert_eq!(h.job.state, JobState::Deleted);
    assert!(h.signals.contains(&(main_pid, SignalKind::Term)));

    h.feed(Input::TimerExpired);
    assert!(h.signals.contains(&(main_pid, SignalKind::Kill)));

    h.feed(Input::Child(ChildEvent::Killed { signal: 9 }));
    assert!(h.destroyed);
}

// ---------------------------------------------------------------------------
// Goal liveness across every action combination
// ---------------------------------------------------------------------------

#[test]
fn goal_liveness_for_all_action_combinations() {
    for mask in 0u32..32 {
        let mut builder = JobDefinition::builder()
            .name("combo")
            .command(ProcessKind::Main, "serve")
            .wait_for_stop(mask & 16 != 0);
        if mask & 1 != 0 {
            builder = builder.command(ProcessKind::PreStart, "a");
        }
        if mask & 2 != 0 {
            builder = builder.command(ProcessKind::PostStart, "b");
        }
        if mask & 4 != 0 {
            builder = builder.command(ProcessKind::PreStop, "c");
        }
        if mask & 8 != 0 {
            builder = builder.command(ProcessKind::PostStop, "d");
        }
        let mut h = Harness::new(builder.build());

        h.start();
        // Complete whatever scripts and handshakes are pending.
        for _ in 0..8 {
            if h.job.state == JobState::Running {
                break;
            }
            if h.job.state == JobState::Spawned && h.job.process_state == ProcessState::Spawned {
                h.feed(Input::Child(ChildEvent::Stopped { signal: 19 }));
            } else {
                h.tracked_exits(0);
            }
        }
        assert_eq!(h.job.state, JobState::Running, "start stalled for mask {mask}");

        h.stop();
        for _ in 0..8 {
            if h.job.state == JobState::Waiting {
                break;
            }
            if h.job.state == JobState::Killed {
                h.feed(Input::Child(ChildEvent::Killed { signal: 15 }));
            } else {
                h.tracked_exits(0);
            }
        }
        assert_eq!(h.job.state, JobState::Waiting, "stop stalled for mask {mask}");
        assert_eq!(h.job.process_state, ProcessState::None);
    }
}
