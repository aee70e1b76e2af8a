// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The dispatcher: sole owner of the catalog and sole driver of the
//! state machine.
//!
//! One task multiplexes, in priority order, SIGCHLD wake-ups (drained
//! through the reaper before anything else), kill-timer deadlines, and
//! control messages from client connections. Machine effects are executed
//! inline; spawn results feed back into the same step cascade, so a
//! command's reply always reflects the settled state.

use crate::config;
use crate::reaper::{self, PidIndex, Reaped};
use crate::scheduler::Scheduler;
use crate::spawn::Spawner;
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use vigil_core::{
    machine, ChildEvent, Clock, Effect, Goal, Input, Job, JobCatalog, JobDefinition, JobState,
    JobStatus, ProcessState,
};
use vigil_wire::Message;

/// Outbound messages buffered per connection before it is dropped.
pub(crate) const OUTBOUND_BUFFER: usize = 128;

/// Handle for queueing replies to one client connection.
#[derive(Clone)]
pub(crate) struct ConnHandle {
    pub id: u64,
    tx: mpsc::Sender<Message>,
}

impl ConnHandle {
    pub fn new(id: u64, tx: mpsc::Sender<Message>) -> Self {
        Self { id, tx }
    }

    /// Queue a message; false means the connection is backed up or gone
    /// and should be forgotten.
    pub fn send(&self, message: Message) -> bool {
        self.tx.try_send(message).is_ok()
    }
}

/// Inbound control-plane items from the listener.
pub(crate) enum Control {
    Message { message: Message, conn: ConnHandle },
    Disconnected { conn_id: u64 },
}

/// A deleted job whose last pid has not drained yet.
struct DrainEntry {
    def: Arc<JobDefinition>,
    job: Job,
}

pub(crate) struct Dispatcher<S, C: Clock> {
    catalog: JobCatalog,
    /// Deleted instances, keyed by `name#seq` so a recreated job with the
    /// same name never collides with its draining predecessor.
    draining: HashMap<String, DrainEntry>,
    drain_seq: u64,
    pid_index: PidIndex,
    scheduler: Scheduler,
    watchers: Vec<ConnHandle>,
    spawner: S,
    clock: C,
    jobs_dir: PathBuf,
}

impl<S: Spawner, C: Clock> Dispatcher<S, C> {
    pub fn new(
        catalog: JobCatalog,
        pid_index: PidIndex,
        spawner: S,
        clock: C,
        jobs_dir: PathBuf,
    ) -> Self {
        Self {
            catalog,
            draining: HashMap::new(),
            drain_seq: 0,
            pid_index,
            scheduler: Scheduler::new(),
            watchers: Vec::new(),
            spawner,
            clock,
            jobs_dir,
        }
    }

    /// Run until shutdown. Signals outrank timers, timers outrank sockets.
    pub async fn run(
        mut self,
        mut control_rx: mpsc::Receiver<Control>,
        shutdown: CancellationToken,
    ) {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigchld = match signal(SignalKind::child()) {
            Ok(stream) => stream,
            Err(e) => {
                tracing::error!(error = %e, "cannot install SIGCHLD handler");
                return;
            }
        };

        loop {
            let deadline = self.scheduler.next_deadline();
            let timer = async {
                match deadline {
                    Some(at) => tokio::time::sleep_until(tokio::time::Instant::from_std(at)).await,
                    None => std::future::pending().await,
                }
            };

            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = sigchld.recv() => {
                    for reaped in reaper::drain(&self.pid_index) {
                        self.handle_reaped(reaped);
                    }
                }
                _ = timer => {
                    let now = self.clock.now();
                    for job in self.scheduler.pop_due(now) {
                        self.run_machine(&job, Input::TimerExpired);
                    }
                }
                control = control_rx.recv() => match control {
                    Some(control) => self.handle_control(control),
                    None => break,
                },
            }
        }
        info!("dispatcher stopped");
    }

    pub fn handle_control(&mut self, control: Control) {
        match control {
            Control::Message { message, conn } => self.handle_message(message, conn),
            Control::Disconnected { conn_id } => {
                self.watchers.retain(|w| w.id != conn_id);
            }
        }
    }

    fn handle_message(&mut self, message: Message, conn: ConnHandle) {
        debug!(conn = conn.id, message = message.name(), "control message");
        match message {
            Message::JobStart { name } => self.command(&name, Goal::Start, &conn),
            Message::JobStop { name } => self.command(&name, Goal::Stop, &conn),
            Message::JobQuery { name } => {
                match self.status_of(&name) {
                    Some(status) => conn.send(status),
                    None => conn.send(Message::JobUnknown { name }),
                };
            }
            Message::JobList => {
                let names: Vec<String> = self.catalog.names().map(str::to_string).collect();
                for name in names {
                    if let Some(status) = self.status_of(&name) {
                        conn.send(status);
                    }
                }
                conn.send(Message::JobListEnd);
            }
            Message::WatchJobs => {
                info!(conn = conn.id, "watcher subscribed");
                self.watchers.push(conn);
            }
            Message::JobReload { name } => self.reload(&name, &conn),
            Message::EventEmit { name, env } => self.emit_event(&name, &env),
            // Reply-direction messages are rejected by the listener.
            Message::JobStatus { .. } | Message::JobUnknown { .. } | Message::JobListEnd => {}
        }
    }

    fn command(&mut self, name: &str, goal: Goal, conn: &ConnHandle) {
        if !self.catalog.contains(name) {
            conn.send(Message::JobUnknown { name: name.to_string() });
            return;
        }
        info!(job = name, goal = %goal, "goal command");
        self.run_machine(name, Input::SetGoal(goal));
        if let Some(status) = self.status_of(name) {
            conn.send(status);
        }
    }

    /// Inject an event: jobs whose stop matcher names it are stopped,
    /// then jobs whose start matcher names it are started with the
    /// event's environment.
    pub fn emit_event(&mut self, event: &str, env: &[String]) {
        info!(event, "event");
        let mut stops = Vec::new();
        let mut starts = Vec::new();
        for (name, entry) in self.catalog.iter() {
            if entry.def.stop_on.iter().any(|e| e == event) {
                stops.push(name.to_string());
            } else if entry.def.start_on.iter().any(|e| e == event) {
                starts.push(name.to_string());
            }
        }

        for name in stops {
            self.run_machine(&name, Input::SetGoal(Goal::Stop));
        }
        let parsed = parse_event_env(env);
        for name in starts {
            if let Some(job) = self.catalog.instance_mut(&name) {
                job.event_env = parsed.clone();
            }
            self.run_machine(&name, Input::SetGoal(Goal::Start));
        }
    }

    fn reload(&mut self, name: &str, conn: &ConnHandle) {
        match config::load_job(&self.jobs_dir, name) {
            Ok(Some(def)) => {
                info!(job = name, "definition reloaded");
                if let Err(e) = self.catalog.insert(def) {
                    warn!(job = name, error = %e, "reloaded definition rejected");
                }
                match self.status_of(name) {
                    Some(status) => conn.send(status),
                    None => conn.send(Message::JobUnknown { name: name.to_string() }),
                };
            }
            Ok(None) => {
                // The file is gone: the job is unconfigured.
                if self.catalog.contains(name) {
                    self.remove_job(name);
                }
                conn.send(Message::JobUnknown { name: name.to_string() });
            }
            Err(e) => {
                // Unusable file on disk; the registered definition stands.
                warn!(job = name, error = %e, "reload failed, keeping current definition");
                match self.status_of(name) {
                    Some(status) => conn.send(status),
                    None => conn.send(Message::JobUnknown { name: name.to_string() }),
                };
            }
        }
    }

    /// Drop a job from the catalog, draining any live pid first.
    pub fn remove_job(&mut self, name: &str) {
        let Some(entry) = self.catalog.remove(name) else { return };
        let Some(mut job) = entry.instance else {
            info!(job = name, "job removed");
            return;
        };

        self.drain_seq += 1;
        let key = format!("{name}#{}", self.drain_seq);
        // Reaped events for the surviving pid route to the drain entry,
        // not to any future job registered under the old name.
        if let Some(pid) = job.pid {
            self.pid_index.register(pid, &key);
        }

        let effects = machine::delete(&mut job);
        self.draining.insert(key.clone(), DrainEntry { def: Arc::clone(&entry.def), job });
        let mut queue = VecDeque::new();
        for effect in effects {
            self.apply_effect(&key, entry.def.as_ref(), effect, &mut queue);
        }
        while let Some(input) = queue.pop_front() {
            self.run_machine(&key, input);
        }
    }

    fn handle_reaped(&mut self, reaped: Reaped) {
        if reaped.event.is_death() {
            self.pid_index.unregister(reaped.pid);
        }
        // Only the tracked child drives the machine; anything else (a main
        // that died behind a running script) is discarded.
        if self.tracked_pid(&reaped.job) == Some(reaped.pid) {
            self.run_machine(&reaped.job, Input::Child(reaped.event));
        } else {
            debug!(job = %reaped.job, pid = reaped.pid, "event for untracked pid discarded");
        }
    }

    /// Feed one input through the machine, executing effects and any
    /// feedback inputs until the job settles.
    pub fn run_machine(&mut self, name: &str, input: Input) {
        let mut queue = VecDeque::new();
        queue.push_back(input);
        while let Some(input) = queue.pop_front() {
            let Some(def) = self.definition_for(name) else {
                debug!(job = name, "input for unknown job dropped");
                return;
            };
            let now = self.clock.now();
            let effects = match self.job_mut(name) {
                Some(job) => machine::step(job, &def, input, now),
                None => return,
            };
            for effect in effects {
                self.apply_effect(name, def.as_ref(), effect, &mut queue);
            }
        }
    }

    fn apply_effect(
        &mut self,
        name: &str,
        def: &JobDefinition,
        effect: Effect,
        queue: &mut VecDeque<Input>,
    ) {
        let fields: String =
            effect.fields().iter().map(|(k, v)| format!("{k}={v}")).collect::<Vec<_>>().join(" ");
        debug!(job = name, "effect {} {}", effect.name(), fields);

        match effect {
            Effect::Spawn { kind } => {
                let extra_env =
                    self.job_mut(name).map(|job| job.event_env.clone()).unwrap_or_default();
                match self.spawner.spawn(def, kind, &extra_env) {
                    Ok(pid) => {
                        info!(job = name, kind = %kind, pid, "spawned");
                        self.pid_index.register(pid, name);
                        queue.push_back(Input::ProcessSpawned { kind, pid });
                    }
                    Err(e) => {
                        // Surfaced to the machine as an exit-127 class failure.
                        warn!(job = name, kind = %kind, error = %e, "spawn failed");
                        queue.push_back(Input::SpawnFailed { kind });
                    }
                }
            }
            Effect::Signal { pid, signal } => match self.spawner.signal(pid, signal) {
                Ok(()) => debug!(job = name, pid, signal = %signal, "signalled"),
                Err(e) if e.is_no_such_process() => {
                    // Already gone and reaped behind our back; deliver the
                    // death the machine is waiting for.
                    warn!(job = name, pid, "signal target already gone");
                    self.pid_index.unregister(pid);
                    if self.tracked_pid(name) == Some(pid) {
                        queue.push_back(Input::Child(ChildEvent::Exited { status: 0 }));
                    }
                }
                Err(e) => warn!(job = name, pid, error = %e, "signal failed"),
            },
            Effect::SetTimer { duration } => {
                self.scheduler.set(name, self.clock.now() + duration);
            }
            Effect::CancelTimer => self.scheduler.cancel(name),
            Effect::EmitStatus { status } => {
                info!(
                    job = name,
                    goal = %status.goal,
                    state = %status.state,
                    process = %status.process_state,
                    pid = status.pid.unwrap_or(0),
                    "transition"
                );
                let message = self.status_message(&status, def);
                self.broadcast(message);
            }
            Effect::DestroyInstance => {
                self.draining.remove(name);
                debug!(job = name, "instance destroyed");
            }
        }
    }

    fn broadcast(&mut self, message: Message) {
        self.watchers.retain(|watcher| {
            let delivered = watcher.send(message.clone());
            if !delivered {
                warn!(conn = watcher.id, "watcher dropped");
            }
            delivered
        });
    }

    /// Status reply for a catalog job; `None` means unknown.
    fn status_of(&self, name: &str) -> Option<Message> {
        let entry = self.catalog.get(name)?;
        let status = match &entry.instance {
            Some(job) => job.status(),
            None => JobStatus {
                name: name.to_string(),
                goal: Goal::Stop,
                state: JobState::Waiting,
                process_state: ProcessState::None,
                pid: None,
                respawn_limited: false,
            },
        };
        Some(self.status_message(&status, entry.def.as_ref()))
    }

    fn status_message(&self, status: &JobStatus, def: &JobDefinition) -> Message {
        let description = if status.respawn_limited {
            if def.description.is_empty() {
                Some("respawn limit exceeded".to_string())
            } else {
                Some(format!("{} (respawn limit exceeded)", def.description))
            }
        } else if def.description.is_empty() {
            None
        } else {
            Some(def.description.clone())
        };
        Message::JobStatus {
            name: status.name.clone(),
            goal: status.goal,
            state: status.state,
            process_state: status.process_state,
            pid: status.pid.unwrap_or(0),
            description,
        }
    }

    fn definition_for(&self, name: &str) -> Option<Arc<JobDefinition>> {
        self.catalog
            .definition(name)
            .or_else(|| self.draining.get(name).map(|entry| Arc::clone(&entry.def)))
    }

    fn job_mut(&mut self, name: &str) -> Option<&mut Job> {
        if self.catalog.contains(name) {
            self.catalog.instance_mut(name)
        } else {
            self.draining.get_mut(name).map(|entry| &mut entry.job)
        }
    }

    fn tracked_pid(&self, name: &str) -> Option<i32> {
        match self.catalog.get(name) {
            Some(entry) => entry.instance.as_ref().and_then(|job| job.pid),
            None => self.draining.get(name).and_then(|entry| entry.job.pid),
        }
    }
}

fn parse_event_env(env: &[String]) -> Vec<(String, String)> {
    env.iter()
        .filter_map(|entry| match entry.split_once('=') {
            Some((key, value)) => Some((key.to_string(), value.to_string())),
            None => {
                debug!(entry = %entry, "ignoring malformed event environment entry");
                None
            }
        })
        .collect()
}

#[cfg(test)]
#[path = "dispatcher_tests.rs"]
mod tests;
