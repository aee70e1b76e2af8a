// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Listener task for control-socket I/O.
//!
//! Accepts connections, checks peer credentials, frames messages, and
//! forwards them to the dispatcher. Outbound replies go through a bounded
//! per-connection queue drained by a writer task, so the dispatcher never
//! blocks on a slow client; the dispatcher drops connections whose queue
//! overflows.

use crate::dispatcher::{ConnHandle, Control, OUTBOUND_BUFFER};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::mpsc;
use tracing::{debug, error, warn};
use vigil_wire::{read_message, write_message, Message, ProtocolError};

pub(crate) struct Listener {
    unix: UnixListener,
    control_tx: mpsc::Sender<Control>,
}

impl Listener {
    pub fn new(unix: UnixListener, control_tx: mpsc::Sender<Control>) -> Self {
        Self { unix, control_tx }
    }

    /// Accept loop; one task per connection.
    pub async fn run(self) {
        let mut next_id: u64 = 0;
        loop {
            match self.unix.accept().await {
                Ok((stream, _)) => {
                    next_id += 1;
                    let id = next_id;
                    if !authorized(&stream) {
                        // MESSAGE_ILLEGAL: unauthorized peer, connection discarded.
                        warn!(conn = id, "rejecting connection from illegal source");
                        continue;
                    }
                    let control_tx = self.control_tx.clone();
                    tokio::spawn(handle_connection(stream, id, control_tx));
                }
                Err(e) => error!(error = %e, "accept failed"),
            }
        }
    }
}

/// Peer euid must be root or our own euid.
fn authorized(stream: &UnixStream) -> bool {
    match stream.peer_cred() {
        Ok(cred) => cred.uid() == 0 || cred.uid() == nix::unistd::Uid::effective().as_raw(),
        Err(e) => {
            warn!(error = %e, "cannot read peer credentials");
            false
        }
    }
}

async fn handle_connection(stream: UnixStream, id: u64, control_tx: mpsc::Sender<Control>) {
    let (mut reader, mut writer) = stream.into_split();
    let (out_tx, mut out_rx) = mpsc::channel::<Message>(OUTBOUND_BUFFER);

    // Writer drains until every ConnHandle clone is gone.
    tokio::spawn(async move {
        while let Some(message) = out_rx.recv().await {
            if let Err(e) = write_message(&mut writer, &message).await {
                debug!(conn = id, error = %e, "write failed");
                break;
            }
        }
    });

    let conn = ConnHandle::new(id, out_tx);
    loop {
        match read_message(&mut reader).await {
            // Clients may not speak the server's direction.
            Ok(message) if is_reply(&message) => {
                warn!(conn = id, message = message.name(), "illegal message direction");
                break;
            }
            Ok(message) => {
                if control_tx.send(Control::Message { message, conn: conn.clone() }).await.is_err()
                {
                    break;
                }
            }
            Err(ProtocolError::ConnectionClosed) => {
                debug!(conn = id, "client disconnected");
                break;
            }
            // MESSAGE_INVALID / MESSAGE_UNKNOWN: the connection is
            // discarded and nothing surfaces to the rest of the daemon.
            Err(e) => {
                debug!(conn = id, error = %e, "dropping misbehaving connection");
                break;
            }
        }
    }
    let _ = control_tx.send(Control::Disconnected { conn_id: id }).await;
}

fn is_reply(message: &Message) -> bool {
    matches!(
        message,
        Message::JobStatus { .. } | Message::JobUnknown { .. } | Message::JobListEnd
    )
}

#[cfg(test)]
#[path = "listener_tests.rs"]
mod tests;
