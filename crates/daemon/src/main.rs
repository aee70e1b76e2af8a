// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! vigild: the vigil supervisor daemon.

use clap::Parser;
use std::path::{Path, PathBuf};
use vigil_daemon::{paths, DaemonOpts};

#[derive(Parser)]
#[command(name = "vigild", version, about = "Event-driven process supervisor daemon")]
struct Args {
    /// Run as the system instance (socket under /var/run, jobs under /etc)
    #[arg(long)]
    system: bool,

    /// Control socket path override
    #[arg(long, value_name = "PATH")]
    socket: Option<PathBuf>,

    /// Jobs directory override
    #[arg(long, value_name = "DIR")]
    jobs_dir: Option<PathBuf>,

    /// Append logs to this file instead of stderr
    #[arg(long, value_name = "FILE")]
    log_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let _guard = init_logging(args.log_file.as_deref());

    let opts =
        DaemonOpts { system: args.system, socket: args.socket, jobs_dir: args.jobs_dir };
    if let Err(e) = vigil_daemon::lifecycle::run(opts).await {
        tracing::error!(error = %e, "daemon failed");
        std::process::exit(1);
    }
}

fn init_logging(log_file: Option<&Path>) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = tracing_subscriber::EnvFilter::try_from_env(paths::LOG_ENV)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    match log_file {
        Some(path) => {
            let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
            let file = path.file_name().map(PathBuf::from).unwrap_or_else(|| "vigild.log".into());
            let appender = tracing_appender::rolling::never(dir, file);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .with_ansi(false)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
            None
        }
    }
}
