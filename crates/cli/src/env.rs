// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the CLI.

use std::time::Duration;

fn duration_ms(var: &str) -> Option<Duration> {
    std::env::var(var)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
}

/// Timeout for IPC requests (handshake, status, shutdown, ...)
pub fn timeout_ipc() -> Duration {
    duration_ms("PX_TIMEOUT_IPC_MS").unwrap_or(Duration::from_secs(5))
}

/// Timeout for waiting for the daemon to start
pub fn timeout_connect() -> Duration {
    duration_ms("PX_TIMEOUT_CONNECT_MS").unwrap_or(Duration::from_secs(5))
}

/// Polling interval for connection retries
pub fn poll_interval() -> Duration {
    duration_ms("PX_CONNECT_POLL_MS").unwrap_or(Duration::from_millis(50))
}

/// Explicit daemon binary override
pub fn daemon_binary() -> Option<String> {
    std::env::var("PX_DAEMON_BIN").ok()
}
