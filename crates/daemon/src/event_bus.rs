// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-process event bus fanning state changes out to panels.
//!
//! Each subscriber hands the bus a bounded channel; delivery is always
//! `try_send`, so a slow panel drops its own events and never blocks a
//! publisher. A ring buffer keeps recent events for the status surface
//! and late joiners.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, info};

use px_core::{EventPayload, PaneRole, PanelId, StateEvent};

/// Default ring buffer depth.
const DEFAULT_HISTORY: usize = 100;

/// Subscription bookkeeping for one panel.
#[derive(Debug, Clone)]
pub struct SubscriberInfo {
    pub panel_id: PanelId,
    pub panel_type: PaneRole,
    pub connected_at: DateTime<Utc>,
    pub last_event_at: Option<DateTime<Utc>>,
    pub events_delivered: u64,
    pub events_dropped: u64,
}

struct Subscriber {
    info: SubscriberInfo,
    tx: mpsc::Sender<StateEvent>,
}

struct BusState {
    subscribers: IndexMap<PanelId, Subscriber>,
    history: VecDeque<StateEvent>,
    history_depth: usize,
}

/// The event bus. Cheap to clone; all clones share one subscriber map.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<Mutex<BusState>>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_history(DEFAULT_HISTORY)
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_history(history_depth: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(BusState {
                subscribers: IndexMap::new(),
                history: VecDeque::with_capacity(history_depth),
                history_depth,
            })),
        }
    }

    /// Register a panel's delivery channel.
    ///
    /// Replaces any previous subscription under the same panel id. The
    /// `panel_connected` event is announced to the panels already
    /// subscribed; the new panel does not hear its own arrival.
    pub fn subscribe(&self, panel_id: PanelId, panel_type: PaneRole, tx: mpsc::Sender<StateEvent>) {
        self.broadcast(StateEvent::system(EventPayload::PanelConnected {
            panel_id: panel_id.clone(),
            panel_type,
        }));

        let mut state = self.inner.lock();
        state.subscribers.insert(
            panel_id.clone(),
            Subscriber {
                info: SubscriberInfo {
                    panel_id: panel_id.clone(),
                    panel_type,
                    connected_at: Utc::now(),
                    last_event_at: None,
                    events_delivered: 0,
                    events_dropped: 0,
                },
                tx,
            },
        );
        drop(state);
        info!(panel_id = %panel_id, panel_type = %panel_type, "panel subscribed");
    }

    /// Drop a panel's subscription and synthesize `panel_disconnected`.
    pub fn unsubscribe(&self, panel_id: &PanelId) {
        let removed = {
            let mut state = self.inner.lock();
            state.subscribers.shift_remove(panel_id).is_some()
        };
        if removed {
            info!(panel_id = %panel_id, "panel unsubscribed");
            self.broadcast(StateEvent::system(EventPayload::PanelDisconnected {
                panel_id: panel_id.clone(),
            }));
        }
    }

    /// Deliver an event to every subscriber except its source.
    ///
    /// The actual sends happen outside the bus mutex; only the subscriber
    /// snapshot and the stats update hold it.
    pub fn broadcast(&self, event: StateEvent) {
        let targets: Vec<(PanelId, mpsc::Sender<StateEvent>)> = {
            let mut state = self.inner.lock();

            while state.history.len() >= state.history_depth.max(1) {
                state.history.pop_front();
            }
            state.history.push_back(event.clone());

            state
                .subscribers
                .values()
                .filter(|s| s.info.panel_id != event.source)
                .map(|s| (s.info.panel_id.clone(), s.tx.clone()))
                .collect()
        };

        self.deliver_all(targets, event);
    }

    /// Deliver an event to a single subscriber regardless of source.
    pub fn broadcast_to(&self, target: &PanelId, event: StateEvent) {
        let targets: Vec<(PanelId, mpsc::Sender<StateEvent>)> = {
            let state = self.inner.lock();
            state
                .subscribers
                .get(target)
                .map(|s| (s.info.panel_id.clone(), s.tx.clone()))
                .into_iter()
                .collect()
        };
        self.deliver_all(targets, event);
    }

    fn deliver_all(&self, targets: Vec<(PanelId, mpsc::Sender<StateEvent>)>, event: StateEvent) {
        let now = Utc::now();
        let mut delivered = Vec::new();
        let mut dropped = Vec::new();

        for (panel_id, tx) in targets {
            match tx.try_send(event.clone()) {
                Ok(()) => delivered.push(panel_id),
                Err(mpsc::error::TrySendError::Full(_)) => {
                    info!(
                        panel_id = %panel_id,
                        kind = event.kind(),
                        "subscriber queue full, dropping event"
                    );
                    dropped.push(panel_id);
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    // Reader went away; unsubscribe happens on connection teardown
                    debug!(panel_id = %panel_id, "subscriber channel closed");
                }
            }
        }

        let mut state = self.inner.lock();
        for panel_id in delivered {
            if let Some(sub) = state.subscribers.get_mut(&panel_id) {
                sub.info.events_delivered += 1;
                sub.info.last_event_at = Some(now);
            }
        }
        for panel_id in dropped {
            if let Some(sub) = state.subscribers.get_mut(&panel_id) {
                sub.info.events_dropped += 1;
            }
        }
    }

    /// Subscription metadata for the status surface.
    pub fn subscribers(&self) -> Vec<SubscriberInfo> {
        self.inner
            .lock()
            .subscribers
            .values()
            .map(|s| s.info.clone())
            .collect()
    }

    /// The most recent `n` events, oldest first.
    pub fn history(&self, n: usize) -> Vec<StateEvent> {
        let state = self.inner.lock();
        let skip = state.history.len().saturating_sub(n);
        state.history.iter().skip(skip).cloned().collect()
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().subscribers.len()
    }
}

#[cfg(test)]
#[path = "event_bus_tests.rs"]
mod tests;
