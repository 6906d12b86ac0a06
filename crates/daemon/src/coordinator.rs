// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared-state coordinator: the single writer of [`AppState`].
//!
//! Every update carries an `expected_version`. Under the coordinator lock
//! a mismatch is a conflict; the lock is released before the resolver
//! runs, and the resolver's retries re-enter through [`Coordinator::
//! try_apply`], the internal entry point that never invokes the resolver
//! again. Accepted updates broadcast on the bus and enqueue a snapshot on
//! a bounded save channel drained by a background writer; a full channel
//! drops the save (the next one subsumes it).

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

use px_core::{AppState, PanelId, StateError, StateEvent, StateUpdate};
use px_storage::Repository;

use crate::event_bus::EventBus;

/// Bounded save queue depth.
const SAVE_QUEUE_DEPTH: usize = 8;

/// How a version conflict is resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictStrategy {
    /// Re-stamp the update to the current version and apply it
    LastWriteWins,
    /// Retry with a fresh expected version, bounded attempts and backoff
    VersionBased { max_retries: u32, backoff: Duration },
    /// Surface the conflict to the submitter
    ManualResolve,
}

impl Default for ConflictStrategy {
    fn default() -> Self {
        ConflictStrategy::VersionBased {
            max_retries: 5,
            backoff: Duration::from_millis(50),
        }
    }
}

impl ConflictStrategy {
    /// Parse a strategy name from options/env.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "last-write-wins" => Some(ConflictStrategy::LastWriteWins),
            "version-based" => Some(ConflictStrategy::default()),
            "manual" | "manual-resolve" => Some(ConflictStrategy::ManualResolve),
            _ => None,
        }
    }
}

/// Errors from coordinator operations.
#[derive(Debug, thiserror::Error)]
pub enum CoordinatorError {
    #[error("version conflict: expected {expected}, current {current}")]
    Conflict { expected: u64, current: u64 },

    #[error("conflict unresolved after {attempts} attempts")]
    TooManyRetries { attempts: u32 },

    #[error("update rejected: {0}")]
    Rejected(#[from] StateError),

    #[error("save failed: {0}")]
    SaveFailed(String),
}

/// Counters exposed on the status surface.
#[derive(Debug, Clone, Default)]
pub struct CoordinatorMetrics {
    pub updates_accepted: u64,
    pub updates_rejected: u64,
    pub conflicts: u64,
    pub conflicts_resolved: u64,
    pub saves: u64,
    pub saves_dropped: u64,
    pub saves_failed: u64,
    pub last_save: Option<DateTime<Utc>>,
}

/// The coordinator. Shared via `Arc`; all mutation goes through it.
pub struct Coordinator {
    state: Mutex<AppState>,
    bus: EventBus,
    strategy: ConflictStrategy,
    repository: Arc<Repository>,
    save_tx: Mutex<Option<mpsc::Sender<AppState>>>,
    save_rx: Mutex<Option<mpsc::Receiver<AppState>>>,
    metrics: Mutex<CoordinatorMetrics>,
    /// Unpersisted-change marker for the auto-save ticker
    dirty: Mutex<Option<Instant>>,
    last_save: Mutex<Option<Instant>>,
}

impl Coordinator {
    pub fn new(
        initial: AppState,
        bus: EventBus,
        strategy: ConflictStrategy,
        repository: Arc<Repository>,
    ) -> Arc<Self> {
        let (save_tx, save_rx) = mpsc::channel(SAVE_QUEUE_DEPTH);
        Arc::new(Self {
            state: Mutex::new(initial),
            bus,
            strategy,
            repository,
            save_tx: Mutex::new(Some(save_tx)),
            save_rx: Mutex::new(Some(save_rx)),
            metrics: Mutex::new(CoordinatorMetrics::default()),
            dirty: Mutex::new(None),
            last_save: Mutex::new(None),
        })
    }

    /// Current version counter.
    pub fn version(&self) -> u64 {
        self.state.lock().version.counter
    }

    /// Clone of the current state.
    pub fn snapshot(&self) -> AppState {
        self.state.lock().clone()
    }

    pub fn metrics(&self) -> CoordinatorMetrics {
        self.metrics.lock().clone()
    }

    /// Apply one update on behalf of `source`.
    ///
    /// Returns the version after acceptance. A version mismatch routes
    /// through the configured conflict strategy.
    pub async fn apply_update(
        &self,
        source: &PanelId,
        expected_version: u64,
        update: StateUpdate,
    ) -> Result<u64, CoordinatorError> {
        match self.try_apply(source, expected_version, &update) {
            Err(CoordinatorError::Conflict { expected, current }) => {
                self.metrics.lock().conflicts += 1;
                // Lock is released here; the resolver re-enters through
                // try_apply only.
                self.resolve_conflict(source, update, expected, current).await
            }
            other => other,
        }
    }

    /// Internal entry point: version check + apply under the lock.
    ///
    /// Never invokes the conflict resolver.
    fn try_apply(
        &self,
        source: &PanelId,
        expected_version: u64,
        update: &StateUpdate,
    ) -> Result<u64, CoordinatorError> {
        let snapshot;
        let version;
        {
            let mut state = self.state.lock();
            let current = state.version.counter;
            if current != expected_version {
                return Err(CoordinatorError::Conflict {
                    expected: expected_version,
                    current,
                });
            }

            if let Err(e) = state.apply(update, source, Utc::now()) {
                self.metrics.lock().updates_rejected += 1;
                return Err(CoordinatorError::Rejected(e));
            }
            version = state.version.counter;
            snapshot = state.clone();
        }

        {
            let mut metrics = self.metrics.lock();
            metrics.updates_accepted += 1;
        }
        *self.dirty.lock() = Some(Instant::now());

        self.bus
            .broadcast(StateEvent::updated(source.clone(), version, update.clone()));
        self.enqueue_save(snapshot);
        Ok(version)
    }

    async fn resolve_conflict(
        &self,
        source: &PanelId,
        update: StateUpdate,
        expected: u64,
        current: u64,
    ) -> Result<u64, CoordinatorError> {
        match &self.strategy {
            ConflictStrategy::LastWriteWins => {
                // Re-stamp to whatever the version is now; under contention
                // just read again and try until the stamp sticks.
                loop {
                    let fresh = self.version();
                    match self.try_apply(source, fresh, &update) {
                        Err(CoordinatorError::Conflict { .. }) => continue,
                        Ok(v) => {
                            self.metrics.lock().conflicts_resolved += 1;
                            return Ok(v);
                        }
                        Err(e) => return Err(e),
                    }
                }
            }

            ConflictStrategy::VersionBased {
                max_retries,
                backoff,
            } => {
                let (max_retries, backoff) = (*max_retries, *backoff);
                for attempt in 1..=max_retries {
                    let fresh = self.version();
                    match self.try_apply(source, fresh, &update) {
                        Ok(v) => {
                            self.metrics.lock().conflicts_resolved += 1;
                            return Ok(v);
                        }
                        Err(CoordinatorError::Conflict { .. }) => {
                            // Bounded backoff, growing linearly with attempts
                            tokio::time::sleep(backoff * attempt).await;
                        }
                        Err(e) => return Err(e),
                    }
                }
                warn!(
                    source = %source,
                    kind = update.kind(),
                    attempts = max_retries,
                    "conflict unresolved, giving up"
                );
                Err(CoordinatorError::TooManyRetries {
                    attempts: max_retries,
                })
            }

            ConflictStrategy::ManualResolve => {
                Err(CoordinatorError::Conflict { expected, current })
            }
        }
    }

    /// Persist now and push a full snapshot to every panel.
    pub async fn sync(&self, source: &PanelId) -> Result<(), CoordinatorError> {
        let snapshot = self.snapshot();
        self.save_now(snapshot.clone()).await?;
        self.bus
            .broadcast(StateEvent::sync(source.clone(), snapshot));
        Ok(())
    }

    /// Replace with the empty state, persist, and push a snapshot.
    pub async fn reset(&self, source: &PanelId) -> Result<(), CoordinatorError> {
        let fresh = AppState::new(Utc::now());
        {
            let mut state = self.state.lock();
            *state = fresh.clone();
        }
        info!(source = %source, "state reset");
        self.save_now(fresh.clone()).await?;
        self.bus.broadcast(StateEvent::sync(source.clone(), fresh));
        Ok(())
    }

    /// Final synchronous save for shutdown.
    pub async fn final_save(&self) -> Result<(), CoordinatorError> {
        self.save_now(self.snapshot()).await
    }

    /// Stop accepting background saves; the worker drains and exits.
    pub fn close_saves(&self) {
        self.save_tx.lock().take();
    }

    fn enqueue_save(&self, snapshot: AppState) {
        let tx = self.save_tx.lock();
        let Some(tx) = tx.as_ref() else {
            return;
        };
        match tx.try_send(snapshot) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                let mut metrics = self.metrics.lock();
                metrics.saves_dropped += 1;
                info!("save queue full, dropping save (next save subsumes)");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {}
        }
    }

    async fn save_now(&self, snapshot: AppState) -> Result<(), CoordinatorError> {
        let repository = Arc::clone(&self.repository);
        let result = tokio::task::spawn_blocking(move || repository.save(&snapshot))
            .await
            .map_err(|e| CoordinatorError::SaveFailed(e.to_string()))?;

        match result {
            Ok(()) => {
                self.record_save();
                Ok(())
            }
            Err(e) => {
                self.metrics.lock().saves_failed += 1;
                Err(CoordinatorError::SaveFailed(e.to_string()))
            }
        }
    }

    fn record_save(&self) {
        let mut metrics = self.metrics.lock();
        metrics.saves += 1;
        metrics.last_save = Some(Utc::now());
        drop(metrics);
        *self.last_save.lock() = Some(Instant::now());
        *self.dirty.lock() = None;
    }

    /// Spawn the background writer draining the save channel.
    ///
    /// Coalesces queued snapshots: only the newest one in the queue is
    /// written.
    pub fn spawn_save_worker(self: &Arc<Self>) {
        let coordinator = Arc::clone(self);
        let Some(mut rx) = coordinator.save_rx.lock().take() else {
            return;
        };
        tokio::spawn(async move {
            while let Some(mut snapshot) = rx.recv().await {
                // Newer snapshots subsume older ones
                while let Ok(newer) = rx.try_recv() {
                    snapshot = newer;
                }
                if let Err(e) = coordinator.save_now(snapshot).await {
                    // In-memory state is retained; the next accepted update
                    // or the auto-save ticker retries.
                    error!(error = %e, "background save failed");
                }
            }
        });
    }

    /// Spawn the auto-save ticker: saves when there is unpersisted change
    /// older than `interval`.
    pub fn spawn_autosave(self: &Arc<Self>, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        let coordinator = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            break;
                        }
                        continue;
                    }
                }

                let due = {
                    let dirty = coordinator.dirty.lock();
                    let last = coordinator.last_save.lock();
                    match (*dirty, *last) {
                        (None, _) => false,
                        (Some(_), None) => true,
                        (Some(_), Some(last)) => last.elapsed() >= interval,
                    }
                };
                if !due {
                    continue;
                }

                let snapshot = coordinator.snapshot();
                if let Err(e) = coordinator.save_now(snapshot).await {
                    warn!(error = %e, "auto-save failed");
                }
            }
        });
    }
}

#[cfg(test)]
#[path = "coordinator_tests.rs"]
mod tests;
