// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon startup and shutdown.

use crate::config;
use crate::dispatcher::Dispatcher;
use crate::listener::Listener;
use crate::paths;
use crate::reaper::PidIndex;
use crate::spawn::ProcessSpawner;
use fs2::FileExt;
use std::io::Write;
use std::path::PathBuf;
use thiserror::Error;
use tokio::net::UnixListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use vigil_core::{JobCatalog, SystemClock};

/// Inbound control-queue depth between the listener and the dispatcher.
const CONTROL_QUEUE: usize = 1024;

#[derive(Debug, Default)]
pub struct DaemonOpts {
    /// System instance: fixed paths under /var/run and /etc.
    pub system: bool,
    /// Control socket override.
    pub socket: Option<PathBuf>,
    /// Jobs directory override.
    pub jobs_dir: Option<PathBuf>,
}

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("cannot determine runtime directory (set VIGIL_SESSION, XDG_RUNTIME_DIR or HOME)")]
    NoRuntimeDir,

    #[error("another instance holds {path}")]
    AlreadyRunning { path: PathBuf },

    #[error(transparent)]
    Config(#[from] config::ConfigError),

    #[error("bad job name in configuration: {0}")]
    Name(#[from] vigil_core::NameError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Run the daemon until SIGTERM/SIGINT.
pub async fn run(opts: DaemonOpts) -> Result<(), LifecycleError> {
    let socket_path = opts
        .socket
        .clone()
        .or_else(|| paths::socket_path(opts.system))
        .ok_or(LifecycleError::NoRuntimeDir)?;
    let jobs_dir = opts
        .jobs_dir
        .clone()
        .or_else(|| paths::jobs_dir(opts.system))
        .ok_or(LifecycleError::NoRuntimeDir)?;

    if let Some(dir) = socket_path.parent() {
        std::fs::create_dir_all(dir)?;
    }

    // The pidfile lock guards against a second instance; holding it also
    // proves any existing socket file is stale.
    let pidfile_path = socket_path.with_file_name("vigild.pid");
    let mut pidfile =
        std::fs::OpenOptions::new().create(true).write(true).open(&pidfile_path)?;
    pidfile
        .try_lock_exclusive()
        .map_err(|_| LifecycleError::AlreadyRunning { path: pidfile_path.clone() })?;
    pidfile.set_len(0)?;
    pidfile.write_all(std::process::id().to_string().as_bytes())?;

    let _ = std::fs::remove_file(&socket_path);
    let unix = UnixListener::bind(&socket_path)?;
    info!(socket = %socket_path.display(), system = opts.system, "listening");

    let mut catalog = JobCatalog::new();
    for def in config::load_dir(&jobs_dir)? {
        catalog.insert(def)?;
    }
    info!(jobs = catalog.len(), dir = %jobs_dir.display(), "catalog loaded");

    let spawner = ProcessSpawner { session_socket: Some(socket_path.clone()) };
    let dispatcher =
        Dispatcher::new(catalog, PidIndex::new(), spawner, SystemClock, jobs_dir);

    let (control_tx, control_rx) = mpsc::channel(CONTROL_QUEUE);
    let listener = Listener::new(unix, control_tx);
    let shutdown = CancellationToken::new();

    let dispatcher_task = tokio::spawn(dispatcher.run(control_rx, shutdown.clone()));
    let listener_task = tokio::spawn(listener.run());

    wait_for_shutdown().await;
    info!("shutting down");
    shutdown.cancel();
    let _ = dispatcher_task.await;
    listener_task.abort();

    let _ = std::fs::remove_file(&socket_path);
    let _ = std::fs::remove_file(&pidfile_path);
    Ok(())
}

/// Block until SIGTERM or SIGINT. SIGHUP is acknowledged and ignored;
/// definitions reload per job through the control protocol.
async fn wait_for_shutdown() {
    use tokio::signal::unix::{signal, SignalKind};
    let (Ok(mut term), Ok(mut int), Ok(mut hup)) = (
        signal(SignalKind::terminate()),
        signal(SignalKind::interrupt()),
        signal(SignalKind::hangup()),
    ) else {
        tracing::error!("cannot install termination signal handlers");
        return;
    };

    loop {
        tokio::select! {
            _ = term.recv() => break,
            _ = int.recv() => break,
            _ = hup.recv() => info!("SIGHUP ignored; use the reload command"),
        }
    }
}
