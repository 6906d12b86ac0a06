// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! State-model errors.

use thiserror::Error;

/// Errors from applying or validating shared state.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StateError {
    #[error("duplicate session id: {0}")]
    DuplicateSession(String),

    #[error("unknown session id: {0}")]
    UnknownSession(String),

    #[error("unknown message id: {0}")]
    UnknownMessage(String),

    #[error("session id mismatch for message {message_id}: {expected} != {actual}")]
    SessionMismatch {
        message_id: String,
        expected: String,
        actual: String,
    },

    #[error("message count for session {session_id} is {recorded}, expected {actual}")]
    CountMismatch {
        session_id: String,
        recorded: u64,
        actual: u64,
    },
}
