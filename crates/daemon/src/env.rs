// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the daemon crate.

use std::path::PathBuf;
use std::time::Duration;

use crate::orchestrator::OrchestratorError;

/// Resolve state directory: PX_STATE_DIR > XDG_STATE_HOME/px > ~/.local/state/px
pub fn state_dir() -> Result<PathBuf, OrchestratorError> {
    if let Ok(dir) = std::env::var("PX_STATE_DIR") {
        return Ok(PathBuf::from(dir));
    }
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return Ok(PathBuf::from(xdg).join("px"));
    }
    let home = std::env::var("HOME").map_err(|_| OrchestratorError::NoStateDir)?;
    Ok(PathBuf::from(home).join(".local/state/px"))
}

fn duration_ms(var: &str) -> Option<Duration> {
    std::env::var(var)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
}

/// Pane liveness poll interval override
pub fn poll_interval() -> Duration {
    duration_ms("PX_POLL_INTERVAL_MS").unwrap_or(Duration::from_secs(2))
}

/// Session watcher interval override
pub fn watch_interval() -> Duration {
    duration_ms("PX_WATCH_INTERVAL_MS").unwrap_or(Duration::from_secs(1))
}

/// Client tracker interval override
pub fn client_poll_interval() -> Duration {
    duration_ms("PX_CLIENT_POLL_MS").unwrap_or(Duration::from_secs(5))
}

/// Auto-save interval override
pub fn autosave_interval() -> Duration {
    duration_ms("PX_AUTOSAVE_MS").unwrap_or(Duration::from_secs(5))
}

/// Grace period before an empty session shuts the daemon down
pub fn empty_grace() -> Duration {
    duration_ms("PX_EMPTY_GRACE_MS").unwrap_or(Duration::from_secs(30))
}
