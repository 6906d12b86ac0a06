// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pane health classification.

use px_core::PaneHealth;

use super::{MuxAdapter, MuxError};

/// Classify a pane target into the four-valued health tag.
///
/// A target tmux cannot resolve is `Missing`; transient tmux failures
/// (timeouts, command errors) propagate so the caller can skip the
/// observation instead of misclassifying.
pub async fn classify_pane<M: MuxAdapter>(mux: &M, target: &str) -> Result<PaneHealth, MuxError> {
    match mux.pane_exists(target).await {
        Ok(false) => return Ok(PaneHealth::Missing),
        Ok(true) => {}
        Err(MuxError::PaneNotFound(_)) => return Ok(PaneHealth::Missing),
        Err(e) => return Err(e),
    }

    match mux.pane_dead(target).await {
        Ok(true) => return Ok(PaneHealth::Dead),
        Ok(false) => {}
        Err(MuxError::PaneNotFound(_)) => return Ok(PaneHealth::Missing),
        Err(e) => return Err(e),
    }

    match mux.pane_pid(target).await {
        Ok(Some(pid)) if mux.process_alive(pid).await => Ok(PaneHealth::Healthy),
        Ok(_) => Ok(PaneHealth::Zombie),
        Err(MuxError::PaneNotFound(_)) => Ok(PaneHealth::Missing),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
#[path = "health_tests.rs"]
mod tests;
