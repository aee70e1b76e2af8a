// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Control-socket client.

use crate::exit_error::ExitError;
use std::path::PathBuf;
use tokio::net::UnixStream;
use vigil_daemon::paths;
use vigil_wire::{read_message, write_message, Message};

pub struct Client {
    stream: UnixStream,
}

impl Client {
    /// Dial the daemon's control socket.
    pub async fn connect(socket: Option<PathBuf>, system: bool) -> Result<Self, ExitError> {
        let path = socket
            .or_else(|| paths::socket_path(system))
            .ok_or_else(|| ExitError::new(1, "cannot determine control socket path"))?;
        let stream = UnixStream::connect(&path).await.map_err(|e| {
            ExitError::new(1, format!("cannot connect to {}: {e}", path.display()))
        })?;
        Ok(Self { stream })
    }

    pub async fn send(&mut self, message: &Message) -> Result<(), ExitError> {
        write_message(&mut self.stream, message)
            .await
            .map_err(|e| ExitError::new(1, format!("communication error: {e}")))
    }

    pub async fn recv(&mut self) -> Result<Message, ExitError> {
        read_message(&mut self.stream)
            .await
            .map_err(|e| ExitError::new(1, format!("communication error: {e}")))
    }
}
