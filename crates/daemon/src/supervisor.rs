// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pane lifecycle supervisor.
//!
//! One supervisor task per pane: polls tmux for liveness, respawns dead
//! panes with exponential backoff, and gives up (with an alert event)
//! after too many consecutive failures. Supervisors never delete panes;
//! pane removal happens only during cleanup shutdown at the orchestrator
//! level.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use px_adapters::{classify_pane, MuxAdapter};
use px_core::{EventPayload, PaneHealth, PaneSpec, StateEvent};

use crate::event_bus::EventBus;

/// Supervisor state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    NotStarted,
    Starting,
    Running,
    Restarting,
    Failed,
    Stopped,
}

/// Tunables; defaults match the production cadence.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Liveness poll interval (2 s)
    pub poll_interval: Duration,
    /// First respawn delay (500 ms)
    pub backoff_base: Duration,
    /// Backoff ceiling (30 s)
    pub backoff_cap: Duration,
    /// A run this long resets backoff and the failure count (10 s)
    pub healthy_reset: Duration,
    /// Consecutive failures before giving up (10)
    pub max_failures: u32,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            backoff_base: Duration::from_millis(500),
            backoff_cap: Duration::from_secs(30),
            healthy_reset: Duration::from_secs(10),
            max_failures: 10,
        }
    }
}

/// Shared view of a running supervisor, kept by the orchestrator.
pub struct SupervisorHandle {
    pub spec: PaneSpec,
    pub target: String,
    state: Arc<Mutex<SupervisorState>>,
    restarts: Arc<AtomicU32>,
    join: JoinHandle<()>,
}

impl SupervisorHandle {
    pub fn state(&self) -> SupervisorState {
        *self.state.lock()
    }

    pub fn restarts(&self) -> u32 {
        self.restarts.load(Ordering::Relaxed)
    }

    /// Await task termination, returning whether it finished in time.
    ///
    /// The shutdown signal must already have been sent; past the deadline
    /// the task is abandoned (it holds no resources worth waiting for).
    pub async fn join(self, deadline: Duration) -> bool {
        match tokio::time::timeout(deadline, self.join).await {
            Ok(_) => true,
            Err(_) => false,
        }
    }
}

/// Spawn a supervisor for one pane.
pub fn spawn<M: MuxAdapter>(
    mux: M,
    spec: PaneSpec,
    target: String,
    bus: EventBus,
    config: SupervisorConfig,
    shutdown: watch::Receiver<bool>,
) -> SupervisorHandle {
    let state = Arc::new(Mutex::new(SupervisorState::NotStarted));
    let restarts = Arc::new(AtomicU32::new(0));

    let task = SupervisorTask {
        mux,
        spec: spec.clone(),
        target: target.clone(),
        bus,
        config,
        state: Arc::clone(&state),
        restarts: Arc::clone(&restarts),
        shutdown,
    };
    let join = tokio::spawn(task.run());

    SupervisorHandle {
        spec,
        target,
        state,
        restarts,
        join,
    }
}

struct SupervisorTask<M: MuxAdapter> {
    mux: M,
    spec: PaneSpec,
    target: String,
    bus: EventBus,
    config: SupervisorConfig,
    state: Arc<Mutex<SupervisorState>>,
    restarts: Arc<AtomicU32>,
    shutdown: watch::Receiver<bool>,
}

impl<M: MuxAdapter> SupervisorTask<M> {
    fn set_state(&self, state: SupervisorState) {
        *self.state.lock() = state;
    }

    /// Sleep that returns `false` when shutdown arrives first.
    async fn sleep_or_shutdown(&mut self, duration: Duration) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(duration) => true,
            _ = self.shutdown.changed() => !*self.shutdown.borrow(),
        }
    }

    fn give_up(&self, failures: u32) {
        warn!(
            role = %self.spec.role,
            target = %self.target,
            failures,
            "pane supervisor giving up"
        );
        self.set_state(SupervisorState::Failed);
        self.bus.broadcast(StateEvent::system(EventPayload::PaneFailed {
            role: self.spec.role,
            target: self.target.clone(),
            failures,
        }));
    }

    async fn run(mut self) {
        self.set_state(SupervisorState::Running);
        let mut backoff = self.config.backoff_base;
        let mut failures: u32 = 0;
        let mut running_since = Instant::now();

        loop {
            if !self.sleep_or_shutdown(self.config.poll_interval).await {
                self.set_state(SupervisorState::Stopped);
                return;
            }

            let health = match classify_pane(&self.mux, &self.target).await {
                Ok(health) => health,
                Err(e) => {
                    // Transient tmux failure: skip this observation
                    warn!(target = %self.target, error = %e, "liveness check failed");
                    continue;
                }
            };

            match health {
                PaneHealth::Healthy => {
                    if failures > 0 && running_since.elapsed() >= self.config.healthy_reset {
                        backoff = self.config.backoff_base;
                        failures = 0;
                    }
                }

                PaneHealth::Missing => {
                    // respawn-pane needs a live target; nothing to revive
                    self.give_up(failures);
                    return;
                }

                PaneHealth::Dead | PaneHealth::Zombie => {
                    self.set_state(SupervisorState::Restarting);
                    failures += 1;
                    if failures > self.config.max_failures {
                        self.give_up(failures);
                        return;
                    }

                    info!(
                        role = %self.spec.role,
                        target = %self.target,
                        health = %health,
                        attempt = failures,
                        backoff_ms = backoff.as_millis() as u64,
                        "respawning pane"
                    );
                    if !self.sleep_or_shutdown(backoff).await {
                        self.set_state(SupervisorState::Stopped);
                        return;
                    }
                    backoff = (backoff * 2).min(self.config.backoff_cap);

                    self.set_state(SupervisorState::Starting);
                    match self.mux.respawn_pane(&self.target, &self.spec).await {
                        Ok(()) => {
                            self.restarts.fetch_add(1, Ordering::Relaxed);
                            running_since = Instant::now();
                            self.set_state(SupervisorState::Running);
                        }
                        Err(e) => {
                            warn!(
                                target = %self.target,
                                error = %e,
                                "respawn failed"
                            );
                            self.set_state(SupervisorState::Restarting);
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "supervisor_tests.rs"]
mod tests;
