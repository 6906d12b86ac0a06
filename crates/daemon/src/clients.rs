// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Client tracker: polls tmux for clients attached to the owned session.
//!
//! Feeds the permission gate and the `status`/`list_clients` operations.
//! Only drives shutdown when the orchestrator runs with
//! `auto_shutdown_when_empty`, and then only after a sustained empty
//! observation for the grace period.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use px_adapters::{ClientInfo, MuxAdapter};

use crate::orchestrator::ShutdownReason;

/// Shared client-count snapshot.
#[derive(Clone, Default)]
pub struct ClientTracker {
    inner: Arc<Mutex<TrackerState>>,
}

#[derive(Default)]
struct TrackerState {
    clients: Vec<ClientInfo>,
    last_check: Option<DateTime<Utc>>,
}

impl ClientTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> usize {
        self.inner.lock().clients.len()
    }

    pub fn clients(&self) -> Vec<ClientInfo> {
        self.inner.lock().clients.clone()
    }

    pub fn last_check(&self) -> Option<DateTime<Utc>> {
        self.inner.lock().last_check
    }

    fn record(&self, clients: Vec<ClientInfo>) -> bool {
        let mut state = self.inner.lock();
        let changed = state.clients.len() != clients.len();
        state.clients = clients;
        state.last_check = Some(Utc::now());
        changed
    }
}

/// Options for the tracker poll task.
pub struct TrackerOptions {
    pub interval: Duration,
    /// Shut the daemon down after a sustained zero-client stretch
    pub auto_shutdown_when_empty: bool,
    pub empty_grace: Duration,
    /// Invoked with the new count whenever it changes
    pub on_change: Option<Box<dyn Fn(usize) + Send + Sync>>,
}

/// Spawn the poll task updating `tracker`.
pub fn spawn<M: MuxAdapter>(
    mux: M,
    session: String,
    tracker: ClientTracker,
    options: TrackerOptions,
    shutdown_tx: mpsc::Sender<ShutdownReason>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut empty_since: Option<Instant> = None;
        loop {
            tokio::select! {
                _ = tokio::time::sleep(options.interval) => {}
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        return;
                    }
                    continue;
                }
            }

            let clients = match mux.list_clients(&session).await {
                Ok(clients) => clients,
                Err(e) => {
                    debug!(session = %session, error = %e, "client poll failed");
                    continue;
                }
            };

            let count = clients.len();
            let changed = tracker.record(clients);
            if changed {
                info!(session = %session, clients = count, "attached clients changed");
                if let Some(on_change) = &options.on_change {
                    on_change(count);
                }
            }

            if !options.auto_shutdown_when_empty {
                continue;
            }
            if count > 0 {
                empty_since = None;
                continue;
            }
            let since = *empty_since.get_or_insert_with(Instant::now);
            if since.elapsed() >= options.empty_grace {
                warn!(
                    session = %session,
                    grace_secs = options.empty_grace.as_secs(),
                    "no clients attached for the grace period, requesting shutdown"
                );
                let _ = shutdown_tx.send(ShutdownReason::NoClients).await;
                return;
            }
        }
    })
}

#[cfg(test)]
#[path = "clients_tests.rs"]
mod tests;
