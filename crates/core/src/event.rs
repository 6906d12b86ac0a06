// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Events broadcast on the panel bus.
//!
//! Every accepted state update becomes a `state_updated` event; the bus
//! also synthesizes connect/disconnect events and the daemon emits
//! `state_sync` and `pane_failed` out of band. Subscribers filter on the
//! kind strings returned by [`StateEvent::kind`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::PanelId;
use crate::pane::PaneRole;
use crate::state::AppState;
use crate::update::StateUpdate;

/// Source id used for events the daemon itself emits.
pub const SYSTEM_SOURCE: &str = "system";

/// Event payload, tagged by kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum EventPayload {
    /// A state update was accepted at `version`
    StateUpdated { version: u64, update: StateUpdate },

    /// Full snapshot push (after sync/reset/reload)
    StateSync { state: Box<AppState> },

    /// A panel subscribed to the bus
    PanelConnected {
        panel_id: PanelId,
        panel_type: PaneRole,
    },

    /// A panel unsubscribed (or its connection closed)
    PanelDisconnected { panel_id: PanelId },

    /// A pane supervisor gave up after repeated respawn failures
    PaneFailed {
        role: PaneRole,
        target: String,
        failures: u32,
    },
}

impl EventPayload {
    /// Stable kind string for subscription filtering.
    pub fn kind(&self) -> &'static str {
        match self {
            EventPayload::StateUpdated { .. } => "state_updated",
            EventPayload::StateSync { .. } => "state_sync",
            EventPayload::PanelConnected { .. } => "panel_connected",
            EventPayload::PanelDisconnected { .. } => "panel_disconnected",
            EventPayload::PaneFailed { .. } => "pane_failed",
        }
    }
}

/// An event as delivered to subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateEvent {
    /// Panel that caused the event, or [`SYSTEM_SOURCE`]
    pub source: PanelId,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub payload: EventPayload,
}

impl StateEvent {
    pub fn new(source: PanelId, payload: EventPayload) -> Self {
        Self {
            source,
            timestamp: Utc::now(),
            payload,
        }
    }

    /// Event for an accepted update.
    pub fn updated(source: PanelId, version: u64, update: StateUpdate) -> Self {
        Self::new(source, EventPayload::StateUpdated { version, update })
    }

    /// Full-snapshot sync event.
    pub fn sync(source: PanelId, state: AppState) -> Self {
        Self::new(
            source,
            EventPayload::StateSync {
                state: Box::new(state),
            },
        )
    }

    /// System-sourced event.
    pub fn system(payload: EventPayload) -> Self {
        Self::new(PanelId::new(SYSTEM_SOURCE), payload)
    }

    pub fn kind(&self) -> &'static str {
        self.payload.kind()
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
