// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Terminal-multiplexer adapter.
//!
//! Everything the daemon asks of tmux goes through [`MuxAdapter`]; the
//! production implementation shells out to the tmux binary, the fake keeps
//! it all in memory for tests.

mod health;
mod tmux;

pub use health::classify_pane;
pub use tmux::TmuxAdapter;

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeMuxAdapter, MuxCall};

use async_trait::async_trait;
use std::collections::HashMap;

use px_core::PaneSpec;
use thiserror::Error;

/// Errors from multiplexer operations
#[derive(Debug, Error)]
pub enum MuxError {
    #[error("session not found: {0}")]
    SessionNotFound(String),
    #[error("pane not found: {0}")]
    PaneNotFound(String),
    #[error("tmux timed out: {0}")]
    Timeout(String),
    #[error("command failed: {0}")]
    CommandFailed(String),
}

/// One pane as reported by the multiplexer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaneInfo {
    /// Opaque pane target (e.g. `%3`)
    pub id: String,
    /// Pane title; the daemon stamps the role tag here
    pub title: String,
    pub pid: Option<u32>,
    pub dead: bool,
}

/// One attached client as reported by the multiplexer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientInfo {
    pub tty: String,
}

/// Adapter over the terminal multiplexer (tmux).
#[async_trait]
pub trait MuxAdapter: Clone + Send + Sync + 'static {
    /// Check if a session exists
    async fn has_session(&self, session: &str) -> Result<bool, MuxError>;

    /// Create a detached session whose first pane runs `spec`.
    /// Returns the new pane's target.
    async fn new_session(&self, session: &str, spec: &PaneSpec) -> Result<String, MuxError>;

    /// Split a new pane into the session running `spec`.
    /// Returns the new pane's target.
    async fn split_pane(&self, session: &str, spec: &PaneSpec) -> Result<String, MuxError>;

    /// Kill a session (and all its panes)
    async fn kill_session(&self, session: &str) -> Result<(), MuxError>;

    /// List all panes of a session across windows
    async fn list_panes(&self, session: &str) -> Result<Vec<PaneInfo>, MuxError>;

    /// Whether a pane target currently resolves
    async fn pane_exists(&self, target: &str) -> Result<bool, MuxError>;

    /// tmux's pane_dead flag for the target
    async fn pane_dead(&self, target: &str) -> Result<bool, MuxError>;

    /// Pid of the pane's process, if tmux reports one
    async fn pane_pid(&self, target: &str) -> Result<Option<u32>, MuxError>;

    /// Restart the pane's process in place (`respawn-pane -k`)
    async fn respawn_pane(&self, target: &str, spec: &PaneSpec) -> Result<(), MuxError>;

    /// Stamp a pane title (used as the role tag for reclaim)
    async fn set_pane_title(&self, target: &str, title: &str) -> Result<(), MuxError>;

    /// Clients currently attached to the session
    async fn list_clients(&self, session: &str) -> Result<Vec<ClientInfo>, MuxError>;

    /// Put a warning message into the session's status bar
    async fn set_status_message(&self, session: &str, text: &str) -> Result<(), MuxError>;

    /// Whether a pid refers to a live process
    async fn process_alive(&self, pid: u32) -> bool;

    /// Environment of a live process, if readable
    async fn process_env(&self, pid: u32) -> Result<HashMap<String, String>, MuxError>;
}
