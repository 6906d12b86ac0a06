// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session ownership record.
//!
//! Captured once at daemon startup and never mutated afterwards; the
//! permission gate authorizes privileged IPC operations against it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identity of the daemon process that owns a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionOwner {
    /// Effective uid of the daemon process
    pub uid: u32,
    /// Effective gid of the daemon process
    pub gid: u32,
    /// Username for the effective uid, if resolvable
    pub username: String,
    /// Hostname at startup
    pub hostname: String,
    /// When the daemon started
    pub started_at: DateTime<Utc>,
}

impl SessionOwner {
    /// Capture the current process identity.
    pub fn capture() -> Self {
        let uid = nix::unistd::Uid::effective();
        let gid = nix::unistd::Gid::effective();

        let username = nix::unistd::User::from_uid(uid)
            .ok()
            .flatten()
            .map(|u| u.name)
            .unwrap_or_default();

        let hostname = hostname::get()
            .map(|h| h.to_string_lossy().into_owned())
            .unwrap_or_default();

        Self {
            uid: uid.as_raw(),
            gid: gid.as_raw(),
            username,
            hostname,
            started_at: Utc::now(),
        }
    }

    pub fn is_owner(&self, uid: u32) -> bool {
        self.uid == uid
    }

    pub fn same_group(&self, gid: u32) -> bool {
        self.gid == gid
    }
}

#[cfg(test)]
#[path = "owner_tests.rs"]
mod tests;
