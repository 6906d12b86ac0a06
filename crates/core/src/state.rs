// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared application state.
//!
//! One coherent record owned by the coordinator. Panels only ever see
//! clones (snapshots and broadcast events); every mutation goes through
//! [`AppState::apply`], which also does the version bookkeeping:
//!
//! - the version counter increases by exactly 1 per accepted update;
//! - the version records the submitting panel and the update time;
//! - per-session message counts track the message list.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::StateError;
use crate::id::PanelId;
use crate::update::StateUpdate;
use crate::SYSTEM_SOURCE;

/// Version record of the shared state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateVersion {
    /// Strictly increasing with every accepted update
    pub counter: u64,
    /// When the last accepted update was applied
    pub updated_at: DateTime<Utc>,
    /// Panel that submitted the last accepted update
    pub source: PanelId,
}

/// One chat session entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionEntry {
    pub id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Maintained by apply; always equals the number of messages whose
    /// session_id matches this entry
    pub message_count: u64,
    pub active: bool,
}

impl SessionEntry {
    /// Entry with the given id/title and fresh timestamps.
    pub fn new(id: impl Into<String>, title: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            created_at: now,
            updated_at: now,
            message_count: 0,
            active: false,
        }
    }
}

/// Author of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    User,
    Assistant,
    System,
}

/// Delivery status of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Pending,
    Completed,
    Error,
}

/// One message entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageEntry {
    pub id: String,
    pub session_id: String,
    pub kind: MessageKind,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub status: MessageStatus,
    /// Structured content parts (tool calls, attachments); opaque here
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parts: Option<Vec<serde_json::Value>>,
}

/// The input buffer record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputState {
    pub text: String,
    pub cursor: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selection: Option<(usize, usize)>,
    pub mode: String,
    pub history: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history_index: Option<usize>,
}

impl Default for InputState {
    fn default() -> Self {
        Self {
            text: String::new(),
            cursor: 0,
            selection: None,
            mode: "normal".to_string(),
            history: Vec::new(),
            history_index: None,
        }
    }
}

/// The shared application state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppState {
    pub version: StateVersion,
    pub sessions: Vec<SessionEntry>,
    pub messages: Vec<MessageEntry>,
    pub input: InputState,
    /// Selected session id; empty means no selection
    pub current_session_id: String,
    pub theme: String,
    pub provider: String,
    pub model: String,
    pub current_agent: String,
    /// Per-agent model mapping, updated when a model is chosen while an
    /// agent is selected
    pub agent_models: HashMap<String, String>,
    /// Copy of the most recently added message, global across sessions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_message: Option<MessageEntry>,
    pub update_count: u64,
    pub last_update: DateTime<Utc>,
}

impl AppState {
    /// The empty state at version 1.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            version: StateVersion {
                counter: 1,
                updated_at: now,
                source: PanelId::new(SYSTEM_SOURCE),
            },
            sessions: Vec::new(),
            messages: Vec::new(),
            input: InputState::default(),
            current_session_id: String::new(),
            theme: String::new(),
            provider: String::new(),
            model: String::new(),
            current_agent: String::new(),
            agent_models: HashMap::new(),
            current_message: None,
            update_count: 0,
            last_update: now,
        }
    }

    pub fn session(&self, id: &str) -> Option<&SessionEntry> {
        self.sessions.iter().find(|s| s.id == id)
    }

    fn session_mut(&mut self, id: &str) -> Option<&mut SessionEntry> {
        self.sessions.iter_mut().find(|s| s.id == id)
    }

    pub fn message(&self, id: &str) -> Option<&MessageEntry> {
        self.messages.iter().find(|m| m.id == id)
    }

    fn count_messages(&self, session_id: &str) -> u64 {
        self.messages
            .iter()
            .filter(|m| m.session_id == session_id)
            .count() as u64
    }

    /// Apply one update on behalf of `source`.
    ///
    /// On success the version counter has increased by exactly 1 and the
    /// version records `source` and `now`. On error the state is untouched.
    pub fn apply(
        &mut self,
        update: &StateUpdate,
        source: &PanelId,
        now: DateTime<Utc>,
    ) -> Result<(), StateError> {
        match update {
            StateUpdate::SessionAdded { session } => {
                if self.session(&session.id).is_some() {
                    return Err(StateError::DuplicateSession(session.id.clone()));
                }
                let mut entry = session.clone();
                entry.message_count = 0;
                self.sessions.push(entry);
            }

            StateUpdate::SessionChanged { session_id } => {
                // Permissive: unknown ids clear the selection instead of failing
                if self.session(session_id).is_some() {
                    self.current_session_id = session_id.clone();
                } else {
                    self.current_session_id.clear();
                }
                let current = self.current_session_id.clone();
                for s in &mut self.sessions {
                    s.active = s.id == current;
                }
            }

            StateUpdate::SessionUpdated { session } => {
                let actual_count = self.count_messages(&session.id);
                let Some(entry) = self.session_mut(&session.id) else {
                    return Err(StateError::UnknownSession(session.id.clone()));
                };
                *entry = session.clone();
                entry.message_count = actual_count;
            }

            StateUpdate::SessionDeleted { session_id } => {
                // Idempotent; removes the session's messages with it
                self.sessions.retain(|s| s.id != *session_id);
                self.messages.retain(|m| m.session_id != *session_id);
                if self.current_session_id == *session_id {
                    self.current_session_id.clear();
                }
            }

            StateUpdate::MessageAdded { message } => {
                if self.session(&message.session_id).is_none() {
                    return Err(StateError::UnknownSession(message.session_id.clone()));
                }
                self.messages.push(message.clone());
                let count = self.count_messages(&message.session_id);
                if let Some(entry) = self.session_mut(&message.session_id) {
                    entry.message_count = count;
                    entry.updated_at = now;
                }
                self.current_message = Some(message.clone());
            }

            StateUpdate::MessageUpdated { message } => {
                let Some(existing) = self.messages.iter_mut().find(|m| m.id == message.id) else {
                    return Err(StateError::UnknownMessage(message.id.clone()));
                };
                // A message cannot move between sessions; that would break counts
                if existing.session_id != message.session_id {
                    return Err(StateError::SessionMismatch {
                        message_id: message.id.clone(),
                        expected: existing.session_id.clone(),
                        actual: message.session_id.clone(),
                    });
                }
                *existing = message.clone();
            }

            StateUpdate::MessageDeleted { message_id } => {
                // Idempotent
                let session_id = self
                    .message(message_id)
                    .map(|m| m.session_id.clone());
                if let Some(session_id) = session_id {
                    self.messages.retain(|m| m.id != *message_id);
                    let count = self.count_messages(&session_id);
                    if let Some(entry) = self.session_mut(&session_id) {
                        entry.message_count = count;
                    }
                }
            }

            StateUpdate::MessagesCleared { session_id } => {
                // Idempotent
                self.messages.retain(|m| m.session_id != *session_id);
                if let Some(entry) = self.session_mut(session_id) {
                    entry.message_count = 0;
                }
            }

            StateUpdate::InputChanged { input } => {
                self.input = input.clone();
            }

            StateUpdate::CursorMoved { cursor, selection } => {
                self.input.cursor = *cursor;
                self.input.selection = *selection;
            }

            StateUpdate::ThemeChanged { theme } => {
                self.theme = theme.clone();
            }

            StateUpdate::ModelChanged { provider, model } => {
                self.provider = provider.clone();
                self.model = model.clone();
                if !self.current_agent.is_empty() {
                    self.agent_models
                        .insert(self.current_agent.clone(), model.clone());
                }
            }

            StateUpdate::AgentChanged { agent } => {
                self.current_agent = agent.clone();
            }

            StateUpdate::UiActionTriggered { .. } => {
                // Broadcast vehicle: the version bump below is the only effect
            }
        }

        self.version.counter += 1;
        self.version.updated_at = now;
        self.version.source = source.clone();
        self.update_count += 1;
        self.last_update = now;
        Ok(())
    }

    /// Check hard invariants and normalize the selection.
    ///
    /// Hard violations (duplicate session ids, dangling message session
    /// references, count drift) are errors; a loaded document failing
    /// here is treated as corrupt. An invalid current-session selection is
    /// not corruption; it is silently cleared.
    pub fn validate(&mut self) -> Result<(), StateError> {
        let mut seen = std::collections::HashSet::new();
        for s in &self.sessions {
            if !seen.insert(s.id.as_str()) {
                return Err(StateError::DuplicateSession(s.id.clone()));
            }
        }

        for m in &self.messages {
            if !seen.contains(m.session_id.as_str()) {
                return Err(StateError::UnknownSession(m.session_id.clone()));
            }
        }

        for s in &self.sessions {
            let actual = self.count_messages(&s.id);
            if s.message_count != actual {
                return Err(StateError::CountMismatch {
                    session_id: s.id.clone(),
                    recorded: s.message_count,
                    actual,
                });
            }
        }

        if !self.current_session_id.is_empty()
            && !seen.contains(self.current_session_id.as_str())
        {
            self.current_session_id.clear();
        }

        Ok(())
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
