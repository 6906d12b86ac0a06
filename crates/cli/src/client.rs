// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon client for CLI commands.
//!
//! Connects to the daemon's socket, handshakes as a `controller` panel,
//! and exchanges frames. Broadcast events arriving between a request and
//! its response are skipped.

use std::path::Path;

use px_core::{PaneRole, PanelId};
use px_daemon::protocol::{self, ProtocolError};
use px_daemon::{ErrorCode, Frame, Message, PROTOCOL_VERSION};
use thiserror::Error;
use tokio::net::UnixStream;

use crate::env;

/// Client errors
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("daemon not running")]
    DaemonNotRunning,

    #[error("failed to start daemon: {0}")]
    DaemonStartFailed(String),

    #[error("timed out waiting for daemon to start")]
    DaemonStartTimeout,

    #[error("not authorized: {0}")]
    AuthFailed(String),

    #[error("daemon error ({code:?}): {message}")]
    Daemon { code: ErrorCode, message: String },

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("unexpected response from daemon")]
    UnexpectedResponse,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A connected, handshaken client.
#[derive(Debug)]
pub struct DaemonClient {
    stream: UnixStream,
}

impl DaemonClient {
    /// Connect and handshake as a controller panel.
    pub async fn connect(socket_path: &Path) -> Result<Self, ClientError> {
        let stream = match UnixStream::connect(socket_path).await {
            Ok(stream) => stream,
            Err(e)
                if matches!(
                    e.kind(),
                    std::io::ErrorKind::NotFound | std::io::ErrorKind::ConnectionRefused
                ) =>
            {
                return Err(ClientError::DaemonNotRunning);
            }
            Err(e) => return Err(e.into()),
        };

        let mut client = Self { stream };

        let panel_id = PanelId::new(format!("controller-{}", std::process::id()));
        let reply = client
            .request(Message::Handshake {
                panel_id,
                panel_type: PaneRole::Controller,
                version: PROTOCOL_VERSION.to_string(),
            })
            .await?;
        match reply {
            Message::HandshakeResponse { .. } => Ok(client),
            other => Err(unexpected(other)),
        }
    }

    /// Send one request and wait for its (non-event) response.
    pub async fn request(&mut self, message: Message) -> Result<Message, ClientError> {
        let timeout = env::timeout_ipc();
        protocol::write_frame_timeout(&mut self.stream, &Frame::new(message), timeout).await?;

        loop {
            let frame = protocol::read_frame_timeout(&mut self.stream, timeout).await?;
            match frame.message {
                // Broadcasts interleave with responses on this connection
                Message::StateEvent { .. } => continue,
                other => return Ok(other),
            }
        }
    }
}

/// Map an unexpected reply; error frames carry their own meaning.
pub fn unexpected(message: Message) -> ClientError {
    match message {
        Message::Error { code, message, .. } => match code {
            ErrorCode::AuthFailed => ClientError::AuthFailed(message),
            code => ClientError::Daemon { code, message },
        },
        _ => ClientError::UnexpectedResponse,
    }
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
