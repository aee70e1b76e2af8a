// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! vigil: control CLI for the vigil supervisor.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod client;
mod commands;
mod exit_error;

use clap::{Parser, Subcommand};
use client::Client;
use exit_error::ExitError;
use std::path::PathBuf;
use vigil_wire::Message;

#[derive(Parser)]
#[command(name = "vigil", version, about = "Control the vigil supervisor")]
struct Cli {
    /// Control socket path (defaults to the session socket)
    #[arg(long, global = true, value_name = "PATH")]
    socket: Option<PathBuf>,

    /// Talk to the system instance
    #[arg(long, global = true)]
    system: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Set jobs' goal to start
    Start {
        #[arg(required = true, value_name = "JOB")]
        jobs: Vec<String>,
    },
    /// Set jobs' goal to stop
    Stop {
        #[arg(required = true, value_name = "JOB")]
        jobs: Vec<String>,
    },
    /// Query jobs' current status
    Status {
        #[arg(required = true, value_name = "JOB")]
        jobs: Vec<String>,
    },
    /// List all jobs
    List,
    /// Stream status broadcasts as they happen
    Watch,
    /// Emit an event, optionally with KEY=VALUE environment
    Emit {
        event: String,
        #[arg(value_name = "KEY=VALUE")]
        env: Vec<String>,
    },
    /// Re-read a job's definition from disk
    Reload {
        #[arg(value_name = "JOB")]
        job: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        if !e.message.is_empty() {
            eprintln!("{e}");
        }
        std::process::exit(e.code);
    }
}

async fn run(cli: Cli) -> Result<(), ExitError> {
    let mut client = Client::connect(cli.socket, cli.system).await?;
    match cli.command {
        Command::Start { jobs } => {
            commands::per_job(&mut client, &jobs, |name| Message::JobStart { name }).await
        }
        Command::Stop { jobs } => {
            commands::per_job(&mut client, &jobs, |name| Message::JobStop { name }).await
        }
        Command::Status { jobs } => {
            commands::per_job(&mut client, &jobs, |name| Message::JobQuery { name }).await
        }
        Command::List => commands::list(&mut client).await,
        Command::Watch => commands::watch(&mut client).await,
        Command::Emit { event, env } => commands::emit(&mut client, event, env).await,
        Command::Reload { job } => {
            commands::per_job(&mut client, std::slice::from_ref(&job), |name| {
                Message::JobReload { name }
            })
            .await
        }
    }
}
