// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pane model: roles, specs, and health.
//!
//! A pane is a tmux-managed terminal region running one supervised panel
//! process. Panes are keyed by role; the same role reattaches to the same
//! tmux target after a respawn. Role tags double as the panel type a
//! connection declares at IPC handshake time.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::SOCKET_ENV_VAR;

/// Application role of a pane (and of the panel process inside it).
///
/// Closed set: the IPC handshake rejects anything else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaneRole {
    /// Session list panel
    Sessions,
    /// Message transcript panel
    Messages,
    /// Input/composer panel
    Input,
    /// Control/status panel
    Controller,
}

impl PaneRole {
    /// All roles, in layout order.
    pub fn all() -> [PaneRole; 4] {
        [
            PaneRole::Sessions,
            PaneRole::Messages,
            PaneRole::Input,
            PaneRole::Controller,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaneRole::Sessions => "sessions",
            PaneRole::Messages => "messages",
            PaneRole::Input => "input",
            PaneRole::Controller => "controller",
        }
    }
}

impl fmt::Display for PaneRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaneRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sessions" => Ok(PaneRole::Sessions),
            "messages" => Ok(PaneRole::Messages),
            "input" => Ok(PaneRole::Input),
            "controller" => Ok(PaneRole::Controller),
            other => Err(format!("unknown pane role: {}", other)),
        }
    }
}

/// What to run in a pane and how.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaneSpec {
    pub role: PaneRole,
    /// Command line started in the pane (and re-issued on respawn)
    pub command: String,
    /// Extra environment injected into the pane
    #[serde(default)]
    pub env: HashMap<String, String>,
}

impl PaneSpec {
    /// Spec for a single role with the standard panel command.
    ///
    /// Panel binaries are external collaborators; the contract is only that
    /// they read [`SOCKET_ENV_VAR`] and speak the IPC protocol.
    pub fn for_role(role: PaneRole, socket_path: &Path) -> Self {
        let mut env = HashMap::new();
        env.insert(
            SOCKET_ENV_VAR.to_string(),
            socket_path.display().to_string(),
        );
        Self {
            role,
            command: format!("px-panel --role {}", role),
            env,
        }
    }

    /// The default four-pane layout, in layout order.
    pub fn default_layout(socket_path: &Path) -> Vec<PaneSpec> {
        PaneRole::all()
            .into_iter()
            .map(|role| PaneSpec::for_role(role, socket_path))
            .collect()
    }

    /// Environment as a sorted key/value list (stable ordering for tmux -e
    /// flags and for tests).
    pub fn env_sorted(&self) -> Vec<(String, String)> {
        let mut pairs: Vec<_> = self
            .env
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        pairs.sort();
        pairs
    }
}

/// Health of a pane as observed through tmux.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaneHealth {
    /// Target exists, pane_dead=0, pid alive
    Healthy,
    /// tmux marks pane_dead=1
    Dead,
    /// Target exists but the pid is unreadable or gone
    Zombie,
    /// Target not present
    Missing,
}

impl PaneHealth {
    /// Whether the supervisor should issue a respawn for this observation.
    ///
    /// `Missing` is not respawnable: `respawn-pane` needs a live target.
    pub fn needs_respawn(&self) -> bool {
        matches!(self, PaneHealth::Dead | PaneHealth::Zombie)
    }
}

impl fmt::Display for PaneHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PaneHealth::Healthy => "healthy",
            PaneHealth::Dead => "dead",
            PaneHealth::Zombie => "zombie",
            PaneHealth::Missing => "missing",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
#[path = "pane_tests.rs"]
mod tests;
