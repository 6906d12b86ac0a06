// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed state updates.
//!
//! Every mutation of the shared state arrives as one of these variants,
//! tagged on the wire as `{"type": "...", "data": {...}}`. The coordinator
//! applies them under its version discipline; [`crate::AppState::apply`]
//! holds the per-variant semantics.

use serde::{Deserialize, Serialize};

use crate::state::{InputState, MessageEntry, SessionEntry};

/// A single typed mutation of the shared application state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum StateUpdate {
    /// Append a new session entry. Rejected if the id already exists.
    SessionAdded { session: SessionEntry },

    /// Select a session. Selecting an unknown id silently clears the
    /// current selection instead of failing.
    SessionChanged { session_id: String },

    /// Replace an existing session entry wholesale.
    SessionUpdated { session: SessionEntry },

    /// Remove a session (and its messages). Idempotent.
    SessionDeleted { session_id: String },

    /// Append a message; its session must exist at acceptance time.
    MessageAdded { message: MessageEntry },

    /// Replace an existing message wholesale.
    MessageUpdated { message: MessageEntry },

    /// Remove a message. Idempotent.
    MessageDeleted { message_id: String },

    /// Remove all messages for one session. Idempotent.
    MessagesCleared { session_id: String },

    /// Replace the input buffer record.
    InputChanged { input: InputState },

    /// Move the cursor / selection without touching the text.
    CursorMoved {
        cursor: usize,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        selection: Option<(usize, usize)>,
    },

    /// Replace the theme selection.
    ThemeChanged { theme: String },

    /// Replace the provider/model selection.
    ModelChanged { provider: String, model: String },

    /// Replace the current agent selection.
    AgentChanged { agent: String },

    /// Broadcast-only trigger: bumps the version, mutates no other field.
    UiActionTriggered {
        action: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<serde_json::Value>,
    },
}

impl StateUpdate {
    /// Stable kind string, used for event naming and subscription filters.
    pub fn kind(&self) -> &'static str {
        match self {
            StateUpdate::SessionAdded { .. } => "session_added",
            StateUpdate::SessionChanged { .. } => "session_changed",
            StateUpdate::SessionUpdated { .. } => "session_updated",
            StateUpdate::SessionDeleted { .. } => "session_deleted",
            StateUpdate::MessageAdded { .. } => "message_added",
            StateUpdate::MessageUpdated { .. } => "message_updated",
            StateUpdate::MessageDeleted { .. } => "message_deleted",
            StateUpdate::MessagesCleared { .. } => "messages_cleared",
            StateUpdate::InputChanged { .. } => "input_changed",
            StateUpdate::CursorMoved { .. } => "cursor_moved",
            StateUpdate::ThemeChanged { .. } => "theme_changed",
            StateUpdate::ModelChanged { .. } => "model_changed",
            StateUpdate::AgentChanged { .. } => "agent_changed",
            StateUpdate::UiActionTriggered { .. } => "ui_action_triggered",
        }
    }
}

#[cfg(test)]
#[path = "update_tests.rs"]
mod tests;
