// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Socket pre-flight classification.
//!
//! Decides what is living at a socket path before the daemon binds (or a
//! CLI connects). The checker never deletes; callers compose it with a
//! removal step when the status is [`SocketStatus::Stale`].

use std::io;
use std::os::unix::fs::FileTypeExt;
use std::path::Path;
use std::time::Duration;

use thiserror::Error;
use tokio::net::UnixStream;

/// Connect probe bound; a stale socket must classify within 2 s.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(1);

/// What lives at a socket path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketStatus {
    /// No filesystem entry
    Nonexistent,
    /// A socket nobody is listening on
    Stale,
    /// A socket with a live listener
    Active,
    /// stat or connect was refused by permissions
    PermissionDenied,
}

/// Errors that prevent classification.
#[derive(Debug, Error)]
pub enum SocketCheckError {
    #[error("path exists but is not a socket: {0}")]
    NotASocket(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Classify the filesystem entry at `path`.
pub async fn check_socket(path: &Path) -> Result<SocketStatus, SocketCheckError> {
    let meta = match std::fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(SocketStatus::Nonexistent),
        Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
            return Ok(SocketStatus::PermissionDenied)
        }
        Err(e) => return Err(e.into()),
    };

    if !meta.file_type().is_socket() {
        return Err(SocketCheckError::NotASocket(path.display().to_string()));
    }

    match tokio::time::timeout(CONNECT_TIMEOUT, UnixStream::connect(path)).await {
        // Stream dropped immediately; the probe must not disturb the listener
        Ok(Ok(_stream)) => Ok(SocketStatus::Active),
        Ok(Err(e)) => match e.kind() {
            io::ErrorKind::ConnectionRefused => Ok(SocketStatus::Stale),
            io::ErrorKind::PermissionDenied => Ok(SocketStatus::PermissionDenied),
            // The listener raced away between stat and connect
            io::ErrorKind::NotFound => Ok(SocketStatus::Nonexistent),
            _ => Err(e.into()),
        },
        Err(_) => Ok(SocketStatus::Stale),
    }
}

#[cfg(test)]
#[path = "socket_check_tests.rs"]
mod tests;
