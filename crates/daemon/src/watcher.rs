// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session watcher: detects disappearance of the owned tmux session.
//!
//! Two consecutive non-existence observations trigger daemon shutdown;
//! a single miss can be a transient tmux hiccup.

use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use px_adapters::MuxAdapter;

use crate::orchestrator::ShutdownReason;

/// Spawn the watcher task.
pub fn spawn<M: MuxAdapter>(
    mux: M,
    session: String,
    interval: Duration,
    shutdown_tx: mpsc::Sender<ShutdownReason>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut misses: u32 = 0;
        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        return;
                    }
                    continue;
                }
            }

            match mux.has_session(&session).await {
                Ok(true) => misses = 0,
                Ok(false) => {
                    misses += 1;
                    warn!(session = %session, misses, "tmux session not found");
                    if misses >= 2 {
                        info!(session = %session, "tmux session vanished, requesting shutdown");
                        let _ = shutdown_tx.send(ShutdownReason::SessionVanished).await;
                        return;
                    }
                }
                Err(e) => {
                    // Transient tmux failure; not evidence of a vanished session
                    warn!(session = %session, error = %e, "session check failed");
                }
            }
        }
    })
}

#[cfg(test)]
#[path = "watcher_tests.rs"]
mod tests;
