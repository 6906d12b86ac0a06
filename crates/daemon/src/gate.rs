// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Permission gate for privileged IPC operations.
//!
//! Requesters are identified by the peer credentials the kernel reports
//! on the Unix socket (SO_PEERCRED); rules compare them against the
//! ownership record captured at startup. Denials never log payloads.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use thiserror::Error;
use tracing::warn;

use px_core::SessionOwner;

/// Privileged operations the gate knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Shutdown,
    ReloadLayout,
    Status,
    ListClients,
    Ping,
    /// Any state-mutating IPC operation
    StateMutation,
    /// State snapshot reads
    StateRead,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Shutdown => "shutdown",
            Operation::ReloadLayout => "reload_layout",
            Operation::Status => "status",
            Operation::ListClients => "list_clients",
            Operation::Ping => "ping",
            Operation::StateMutation => "state_update",
            Operation::StateRead => "state_request",
        }
    }
}

/// Who may perform an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PermissionRule {
    /// Session owner uid only
    Owner,
    /// Owner uid or owner gid
    Group,
    /// Anyone the socket permissions let in
    Any,
    /// Explicit uid allowlist (owner is always allowed)
    Uids(Vec<u32>),
}

/// Peer identity from SO_PEERCRED.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerCreds {
    pub uid: u32,
    pub gid: u32,
    pub pid: Option<i32>,
}

impl From<tokio::net::unix::UCred> for PeerCreds {
    fn from(cred: tokio::net::unix::UCred) -> Self {
        Self {
            uid: cred.uid(),
            gid: cred.gid(),
            pid: cred.pid(),
        }
    }
}

/// Errors from gate checks.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GateError {
    #[error("permission denied for {operation}")]
    Denied { operation: &'static str },

    #[error("{count} clients attached; cleanup shutdown refused without force")]
    ClientsAttached { count: usize },
}

/// The permission gate.
pub struct PermissionGate {
    owner: SessionOwner,
    rules: HashMap<Operation, PermissionRule>,
    denials: AtomicU64,
}

impl PermissionGate {
    /// Gate with the default rule table.
    pub fn new(owner: SessionOwner) -> Self {
        let mut rules = HashMap::new();
        rules.insert(Operation::Shutdown, PermissionRule::Owner);
        rules.insert(Operation::ReloadLayout, PermissionRule::Owner);
        rules.insert(Operation::Status, PermissionRule::Any);
        rules.insert(Operation::ListClients, PermissionRule::Any);
        rules.insert(Operation::Ping, PermissionRule::Any);
        rules.insert(Operation::StateMutation, PermissionRule::Owner);
        rules.insert(Operation::StateRead, PermissionRule::Any);
        Self {
            owner,
            rules,
            denials: AtomicU64::new(0),
        }
    }

    /// Override the rule for one operation.
    pub fn set_rule(&mut self, operation: Operation, rule: PermissionRule) {
        self.rules.insert(operation, rule);
    }

    pub fn owner(&self) -> &SessionOwner {
        &self.owner
    }

    pub fn denials(&self) -> u64 {
        self.denials.load(Ordering::Relaxed)
    }

    /// Check one operation against the peer.
    pub fn check(&self, operation: Operation, peer: &PeerCreds) -> Result<(), GateError> {
        let rule = self.rules.get(&operation).unwrap_or(&PermissionRule::Owner);
        let allowed = match rule {
            PermissionRule::Owner => self.owner.is_owner(peer.uid),
            PermissionRule::Group => {
                self.owner.is_owner(peer.uid) || self.owner.same_group(peer.gid)
            }
            PermissionRule::Any => true,
            PermissionRule::Uids(uids) => {
                self.owner.is_owner(peer.uid) || uids.contains(&peer.uid)
            }
        };

        if allowed {
            Ok(())
        } else {
            self.denials.fetch_add(1, Ordering::Relaxed);
            warn!(
                operation = operation.as_str(),
                uid = peer.uid,
                "operation denied"
            );
            Err(GateError::Denied {
                operation: operation.as_str(),
            })
        }
    }

    /// Shutdown carries an extra refusal: a cleanup shutdown with other
    /// clients attached needs the explicit force flag.
    pub fn check_shutdown(
        &self,
        peer: &PeerCreds,
        cleanup: bool,
        force: bool,
        attached_clients: usize,
    ) -> Result<(), GateError> {
        self.check(Operation::Shutdown, peer)?;
        if cleanup && !force && attached_clients > 1 {
            self.denials.fetch_add(1, Ordering::Relaxed);
            return Err(GateError::ClientsAttached {
                count: attached_clients,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "gate_tests.rs"]
mod tests;
