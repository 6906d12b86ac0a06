// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! IPC protocol between panels, the CLI, and the daemon.
//!
//! Wire format: 4-byte length prefix (big-endian) + JSON payload. Every
//! frame carries `type`, `timestamp`, an optional `request_id` echoed back
//! on responses, and a `data` object whose schema depends on `type`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use px_core::{AppState, PaneHealth, PaneRole, PanelId, StateEvent, StateUpdate};

#[path = "protocol_wire.rs"]
mod wire;
pub use wire::{
    decode, encode, read_frame, read_frame_timeout, write_frame, write_frame_timeout,
    ProtocolError, DEFAULT_TIMEOUT, MAX_FRAME_SIZE,
};

/// Protocol version (from Cargo.toml)
pub const PROTOCOL_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Major-version compatibility check for the handshake.
///
/// Clients and daemon interoperate when their major versions match.
pub fn version_compatible(client: &str) -> bool {
    fn major(v: &str) -> Option<&str> {
        v.split('.').next()
    }
    major(client).is_some() && major(client) == major(PROTOCOL_VERSION)
}

/// Structured error codes carried in `error` frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InvalidMessage,
    AuthFailed,
    VersionConflict,
    StateNotFound,
    InternalError,
    ConnectionClosed,
    Timeout,
    TooManyRetries,
}

/// One message, tagged by `type` with its payload under `data`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Message {
    /// Panel declares its identity and protocol version
    Handshake {
        panel_id: PanelId,
        panel_type: PaneRole,
        version: String,
    },

    /// Daemon assigns a connection id and reports the current state version
    HandshakeResponse {
        connection_id: String,
        version: String,
        state_version: u64,
    },

    /// Opt into specific event kinds (empty = all)
    Subscribe { kinds: Vec<String> },

    /// Opt back out of event kinds
    Unsubscribe { kinds: Vec<String> },

    /// Mutate shared state at an expected version
    StateUpdate {
        expected_version: u64,
        update: StateUpdate,
    },

    /// Outcome of a state update
    StateUpdateResponse { accepted: bool, version: u64 },

    /// Fetch the current snapshot
    StateRequest,

    /// Snapshot response
    StateResponse { state: Box<AppState> },

    /// Broadcast from the event bus
    StateEvent { event: StateEvent },

    Ping,
    Pong,

    /// Sequence-numbered keepalive
    Heartbeat { sequence: u64 },

    /// Structured error response
    Error {
        code: ErrorCode,
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        details: Option<serde_json::Value>,
    },

    /// Privileged: stop the daemon
    Shutdown {
        /// Kill the tmux session on the way out
        #[serde(default)]
        cleanup: bool,
        /// Override the attached-clients refusal
        #[serde(default)]
        force: bool,
    },

    /// Acknowledgement that shutdown is underway
    ShutdownResponse { stopping: bool },

    /// Privileged: re-run the pane health pass
    ReloadLayout,

    /// Panes respawned by the reload pass
    ReloadLayoutResponse { respawned: u32 },

    /// Daemon status snapshot
    Status,

    StatusResponse { status: Box<DaemonStatus> },

    /// Clients attached to the tmux session
    ListClients,

    ListClientsResponse { clients: Vec<ClientEntry> },
}

impl Message {
    /// Shorthand for an error message without details.
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Message::Error {
            code,
            message: message.into(),
            details: None,
        }
    }
}

/// One frame on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    #[serde(flatten)]
    pub message: Message,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl Frame {
    pub fn new(message: Message) -> Self {
        Self {
            message,
            timestamp: Utc::now(),
            request_id: None,
        }
    }

    /// Frame answering `request_id` (if any).
    pub fn reply(message: Message, request_id: Option<String>) -> Self {
        Self {
            message,
            timestamp: Utc::now(),
            request_id,
        }
    }
}

/// One pane in the status report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaneStatusEntry {
    pub role: PaneRole,
    pub target: String,
    pub health: PaneHealth,
    pub restarts: u32,
}

/// One subscribed panel in the status report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PanelEntry {
    pub panel_id: PanelId,
    pub panel_type: PaneRole,
    pub connected_at: DateTime<Utc>,
    pub events_delivered: u64,
}

/// One attached tmux client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientEntry {
    pub tty: String,
}

/// Daemon status snapshot for the `status` operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DaemonStatus {
    pub session: String,
    pub pid: u32,
    pub uptime_secs: u64,
    pub version: String,
    pub state_version: u64,
    pub update_count: u64,
    pub attached_clients: usize,
    pub panels: Vec<PanelEntry>,
    pub panes: Vec<PaneStatusEntry>,
    pub socket_path: String,
    pub state_path: String,
    pub updates_accepted: u64,
    pub updates_rejected: u64,
    pub conflicts_resolved: u64,
    pub saves: u64,
    pub saves_dropped: u64,
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;
