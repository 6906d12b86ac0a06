// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake multiplexer adapter for testing
#![cfg_attr(coverage_nightly, coverage(off))]

use super::{ClientInfo, MuxAdapter, MuxError, PaneInfo};
use async_trait::async_trait;
use indexmap::IndexMap;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

use px_core::PaneSpec;

/// Recorded multiplexer call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MuxCall {
    HasSession { session: String },
    NewSession { session: String, command: String },
    SplitPane { session: String, command: String },
    KillSession { session: String },
    RespawnPane { target: String, command: String },
    SetStatusMessage { session: String, text: String },
}

#[derive(Debug, Clone)]
struct FakePane {
    title: String,
    command: String,
    env: Vec<(String, String)>,
    pid: Option<u32>,
    dead: bool,
    respawns: u32,
}

#[derive(Debug, Clone, Default)]
struct FakeSession {
    panes: IndexMap<String, FakePane>,
    clients: Vec<String>,
    status_message: Option<String>,
}

#[derive(Debug, Default)]
struct FakeMuxState {
    sessions: HashMap<String, FakeSession>,
    processes: HashMap<u32, HashMap<String, String>>,
    calls: Vec<MuxCall>,
    next_pane: u64,
    next_pid: u32,
    /// Targets whose next N respawns fail
    respawn_failures: HashMap<String, u32>,
}

/// Fake multiplexer adapter for testing
#[derive(Debug, Clone)]
pub struct FakeMuxAdapter {
    inner: Arc<Mutex<FakeMuxState>>,
}

impl Default for FakeMuxAdapter {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(FakeMuxState {
                next_pid: 1000,
                ..FakeMuxState::default()
            })),
        }
    }
}

impl FakeMuxAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all recorded calls
    pub fn calls(&self) -> Vec<MuxCall> {
        self.inner.lock().calls.clone()
    }

    /// Add a session without going through `new_session`
    pub fn add_session(&self, session: &str) {
        self.inner
            .lock()
            .sessions
            .entry(session.to_string())
            .or_default();
    }

    /// Add a pane to an existing session; returns its target
    pub fn add_pane(&self, session: &str, title: &str) -> String {
        let mut inner = self.inner.lock();
        inner.next_pane += 1;
        inner.next_pid += 1;
        let target = format!("%{}", inner.next_pane);
        let pid = inner.next_pid;
        inner.processes.insert(pid, HashMap::new());
        if let Some(s) = inner.sessions.get_mut(session) {
            s.panes.insert(
                target.clone(),
                FakePane {
                    title: title.to_string(),
                    command: String::new(),
                    env: Vec::new(),
                    pid: Some(pid),
                    dead: false,
                    respawns: 0,
                },
            );
        }
        target
    }

    /// Mark a pane's process as exited (tmux remain-on-exit style)
    pub fn kill_pane_process(&self, target: &str) {
        let mut inner = self.inner.lock();
        let mut dead_pid = None;
        for session in inner.sessions.values_mut() {
            if let Some(pane) = session.panes.get_mut(target) {
                pane.dead = true;
                dead_pid = pane.pid;
            }
        }
        if let Some(pid) = dead_pid {
            inner.processes.remove(&pid);
        }
    }

    /// Remove a pane entirely
    pub fn remove_pane(&self, target: &str) {
        let mut inner = self.inner.lock();
        for session in inner.sessions.values_mut() {
            session.panes.shift_remove(target);
        }
    }

    /// Make a pane's pid unreadable (zombie)
    pub fn clear_pane_pid(&self, target: &str) {
        let mut inner = self.inner.lock();
        for session in inner.sessions.values_mut() {
            if let Some(pane) = session.panes.get_mut(target) {
                pane.pid = None;
            }
        }
    }

    /// Script the environment a pane process reports
    pub fn set_process_env(&self, target: &str, env: HashMap<String, String>) {
        let mut inner = self.inner.lock();
        let pid = inner
            .sessions
            .values()
            .find_map(|s| s.panes.get(target).and_then(|p| p.pid));
        if let Some(pid) = pid {
            inner.processes.insert(pid, env);
        }
    }

    /// Script the attached-client list
    pub fn set_clients(&self, session: &str, ttys: &[&str]) {
        let mut inner = self.inner.lock();
        if let Some(s) = inner.sessions.get_mut(session) {
            s.clients = ttys.iter().map(|t| t.to_string()).collect();
        }
    }

    /// Make the next `count` respawns of `target` fail
    pub fn fail_respawns(&self, target: &str, count: u32) {
        self.inner
            .lock()
            .respawn_failures
            .insert(target.to_string(), count);
    }

    /// Number of times a pane was respawned
    pub fn respawn_count(&self, target: &str) -> u32 {
        let inner = self.inner.lock();
        inner
            .sessions
            .values()
            .find_map(|s| s.panes.get(target).map(|p| p.respawns))
            .unwrap_or(0)
    }

    /// Command currently configured on a pane
    pub fn pane_command(&self, target: &str) -> Option<String> {
        let inner = self.inner.lock();
        inner
            .sessions
            .values()
            .find_map(|s| s.panes.get(target).map(|p| p.command.clone()))
    }

    /// Environment last injected into a pane, sorted
    pub fn pane_env(&self, target: &str) -> Option<Vec<(String, String)>> {
        let inner = self.inner.lock();
        inner
            .sessions
            .values()
            .find_map(|s| s.panes.get(target).map(|p| p.env.clone()))
    }

    /// Status-bar message last set on a session
    pub fn status_message(&self, session: &str) -> Option<String> {
        let inner = self.inner.lock();
        inner
            .sessions
            .get(session)
            .and_then(|s| s.status_message.clone())
    }

    pub fn session_exists(&self, session: &str) -> bool {
        self.inner.lock().sessions.contains_key(session)
    }

    fn insert_pane(&self, session: &str, spec: &PaneSpec) -> Result<String, MuxError> {
        let mut inner = self.inner.lock();
        inner.next_pane += 1;
        inner.next_pid += 1;
        let target = format!("%{}", inner.next_pane);
        let pid = inner.next_pid;
        inner.processes.insert(pid, spec.env.clone());
        let Some(s) = inner.sessions.get_mut(session) else {
            return Err(MuxError::SessionNotFound(session.to_string()));
        };
        s.panes.insert(
            target.clone(),
            FakePane {
                title: spec.role.as_str().to_string(),
                command: spec.command.clone(),
                env: spec.env_sorted(),
                pid: Some(pid),
                dead: false,
                respawns: 0,
            },
        );
        Ok(target)
    }

    fn with_pane<T>(
        &self,
        target: &str,
        f: impl FnOnce(&FakePane) -> T,
    ) -> Result<T, MuxError> {
        let inner = self.inner.lock();
        inner
            .sessions
            .values()
            .find_map(|s| s.panes.get(target))
            .map(f)
            .ok_or_else(|| MuxError::PaneNotFound(target.to_string()))
    }
}

#[async_trait]
impl MuxAdapter for FakeMuxAdapter {
    async fn has_session(&self, session: &str) -> Result<bool, MuxError> {
        let mut inner = self.inner.lock();
        inner.calls.push(MuxCall::HasSession {
            session: session.to_string(),
        });
        Ok(inner.sessions.contains_key(session))
    }

    async fn new_session(&self, session: &str, spec: &PaneSpec) -> Result<String, MuxError> {
        {
            let mut inner = self.inner.lock();
            inner.calls.push(MuxCall::NewSession {
                session: session.to_string(),
                command: spec.command.clone(),
            });
            if inner.sessions.contains_key(session) {
                return Err(MuxError::CommandFailed(format!(
                    "duplicate session: {}",
                    session
                )));
            }
            inner
                .sessions
                .insert(session.to_string(), FakeSession::default());
        }
        self.insert_pane(session, spec)
    }

    async fn split_pane(&self, session: &str, spec: &PaneSpec) -> Result<String, MuxError> {
        self.inner.lock().calls.push(MuxCall::SplitPane {
            session: session.to_string(),
            command: spec.command.clone(),
        });
        self.insert_pane(session, spec)
    }

    async fn kill_session(&self, session: &str) -> Result<(), MuxError> {
        let mut inner = self.inner.lock();
        inner.calls.push(MuxCall::KillSession {
            session: session.to_string(),
        });
        inner.sessions.remove(session);
        Ok(())
    }

    async fn list_panes(&self, session: &str) -> Result<Vec<PaneInfo>, MuxError> {
        let inner = self.inner.lock();
        let s = inner
            .sessions
            .get(session)
            .ok_or_else(|| MuxError::SessionNotFound(session.to_string()))?;
        Ok(s.panes
            .iter()
            .map(|(id, p)| PaneInfo {
                id: id.clone(),
                title: p.title.clone(),
                pid: p.pid,
                dead: p.dead,
            })
            .collect())
    }

    async fn pane_exists(&self, target: &str) -> Result<bool, MuxError> {
        let inner = self.inner.lock();
        Ok(inner
            .sessions
            .values()
            .any(|s| s.panes.contains_key(target)))
    }

    async fn pane_dead(&self, target: &str) -> Result<bool, MuxError> {
        self.with_pane(target, |p| p.dead)
    }

    async fn pane_pid(&self, target: &str) -> Result<Option<u32>, MuxError> {
        self.with_pane(target, |p| p.pid)
    }

    async fn respawn_pane(&self, target: &str, spec: &PaneSpec) -> Result<(), MuxError> {
        let mut inner = self.inner.lock();
        inner.calls.push(MuxCall::RespawnPane {
            target: target.to_string(),
            command: spec.command.clone(),
        });

        if let Some(remaining) = inner.respawn_failures.get_mut(target) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(MuxError::CommandFailed("scripted respawn failure".into()));
            }
        }

        inner.next_pid += 1;
        let pid = inner.next_pid;
        inner.processes.insert(pid, spec.env.clone());
        for session in inner.sessions.values_mut() {
            if let Some(pane) = session.panes.get_mut(target) {
                pane.dead = false;
                pane.pid = Some(pid);
                pane.command = spec.command.clone();
                pane.env = spec.env_sorted();
                pane.respawns += 1;
                return Ok(());
            }
        }
        Err(MuxError::PaneNotFound(target.to_string()))
    }

    async fn set_pane_title(&self, target: &str, title: &str) -> Result<(), MuxError> {
        let mut inner = self.inner.lock();
        for session in inner.sessions.values_mut() {
            if let Some(pane) = session.panes.get_mut(target) {
                pane.title = title.to_string();
                return Ok(());
            }
        }
        Err(MuxError::PaneNotFound(target.to_string()))
    }

    async fn list_clients(&self, session: &str) -> Result<Vec<ClientInfo>, MuxError> {
        let inner = self.inner.lock();
        let s = inner
            .sessions
            .get(session)
            .ok_or_else(|| MuxError::SessionNotFound(session.to_string()))?;
        Ok(s.clients
            .iter()
            .map(|tty| ClientInfo { tty: tty.clone() })
            .collect())
    }

    async fn set_status_message(&self, session: &str, text: &str) -> Result<(), MuxError> {
        let mut inner = self.inner.lock();
        inner.calls.push(MuxCall::SetStatusMessage {
            session: session.to_string(),
            text: text.to_string(),
        });
        if let Some(s) = inner.sessions.get_mut(session) {
            s.status_message = Some(text.to_string());
        }
        Ok(())
    }

    async fn process_alive(&self, pid: u32) -> bool {
        self.inner.lock().processes.contains_key(&pid)
    }

    async fn process_env(&self, pid: u32) -> Result<HashMap<String, String>, MuxError> {
        self.inner
            .lock()
            .processes
            .get(&pid)
            .cloned()
            .ok_or_else(|| MuxError::CommandFailed(format!("no such process: {}", pid)))
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
