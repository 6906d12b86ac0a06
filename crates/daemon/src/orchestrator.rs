// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Orchestrator: composes the coordinator, event bus, IPC server, pane
//! supervisors, session watcher, and client tracker around one tmux
//! session, and owns startup/shutdown sequencing and run-mode signal
//! handling.

use std::collections::HashMap;
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use fs2::FileExt;
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use px_adapters::{classify_pane, MuxAdapter, MuxError};
use px_core::{AppState, PaneHealth, PaneSpec, SessionOwner, SOCKET_ENV_VAR};
use px_storage::{Repository, RepositoryError};

use crate::clients::{self, ClientTracker, TrackerOptions};
use crate::coordinator::{ConflictStrategy, Coordinator};
use crate::event_bus::EventBus;
use crate::gate::PermissionGate;
use crate::ipc::{IpcContext, IpcServer, ReloadRequest};
use crate::protocol::{DaemonStatus, PaneStatusEntry, PanelEntry, PROTOCOL_VERSION};
use crate::socket_check::{check_socket, SocketCheckError, SocketStatus};
use crate::supervisor::{self, SupervisorConfig, SupervisorHandle, SupervisorState};
use crate::watcher;

/// Supervisor join deadline during shutdown.
const SUPERVISOR_JOIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Status-bar warning left on non-cleanup shutdown.
const UNSUPERVISED_WARNING: &str = " px: daemon stopped, panes unsupervised ";

/// How the daemon reacts to terminal signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunMode {
    /// SIGINT/SIGTERM perform a cleanup shutdown
    Foreground,
    /// Signals are logged and ignored; shutdown comes over IPC or from
    /// the session watcher
    #[default]
    Daemon,
}

/// Start options, forwarded from the CLI.
#[derive(Debug, Clone, Default)]
pub struct Options {
    pub run_mode: RunMode,
    /// Take over an active socket instead of refusing
    pub force_new: bool,
    /// Exit quietly when a daemon is already serving the session
    pub reuse: bool,
    pub auto_shutdown_when_empty: bool,
    pub strategy: ConflictStrategy,
}

/// Why the daemon is shutting down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// Authorized IPC shutdown
    IpcShutdown { cleanup: bool },
    /// The session watcher saw the tmux session vanish
    SessionVanished,
    /// auto-shutdown-when-empty grace period expired
    NoClients,
    /// Terminal signal in foreground mode
    Signal,
}

impl ShutdownReason {
    /// Whether this shutdown kills the tmux session.
    fn cleanup(&self) -> bool {
        match self {
            ShutdownReason::IpcShutdown { cleanup } => *cleanup,
            // Nothing left to kill
            ShutdownReason::SessionVanished => false,
            // An empty idle session has nothing worth preserving
            ShutdownReason::NoClients => true,
            ShutdownReason::Signal => true,
        }
    }

    fn describe(&self) -> &'static str {
        match self {
            ShutdownReason::IpcShutdown { .. } => "ipc shutdown",
            ShutdownReason::SessionVanished => "tmux session vanished",
            ShutdownReason::NoClients => "no clients attached",
            ShutdownReason::Signal => "terminal signal",
        }
    }
}

/// Orchestrator errors
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("Could not determine state directory")]
    NoStateDir,

    #[error("daemon already serving session (socket active at {0})")]
    AlreadyRunning(PathBuf),

    #[error("no permission to use socket at {0}")]
    SocketPermission(PathBuf),

    #[error("socket check failed: {0}")]
    SocketCheck(#[from] SocketCheckError),

    #[error("Failed to acquire lock: daemon already running?")]
    LockFailed(#[source] std::io::Error),

    #[error("Failed to bind socket at {0}: {1}")]
    BindFailed(PathBuf, std::io::Error),

    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("tmux error: {0}")]
    Mux(#[from] MuxError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Daemon configuration: every path derived from the base directory.
#[derive(Debug, Clone)]
pub struct Config {
    /// Session name (also the tmux session name)
    pub session: String,
    /// Per-user base directory
    pub base_dir: PathBuf,
    /// IPC socket
    pub socket_path: PathBuf,
    /// Process lock file
    pub lock_path: PathBuf,
    /// Persisted state document
    pub state_path: PathBuf,
    /// Daemon log file
    pub log_path: PathBuf,
}

impl Config {
    /// Configuration for `session` under the user's state directory.
    pub fn load(session: &str) -> Result<Self, OrchestratorError> {
        Ok(Self::for_base(crate::env::state_dir()?, session))
    }

    /// Configuration rooted at an explicit base directory.
    pub fn for_base(base_dir: PathBuf, session: &str) -> Self {
        Self {
            session: session.to_string(),
            socket_path: base_dir.join(format!("{}.sock", session)),
            lock_path: base_dir.join(format!("{}.lock", session)),
            state_path: base_dir.join("state").join(format!("{}.json", session)),
            log_path: base_dir.join("logs").join(format!("{}.log", session)),
            base_dir,
        }
    }
}

impl<M: MuxAdapter> std::fmt::Debug for Orchestrator<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator").finish_non_exhaustive()
    }
}

/// The running daemon.
pub struct Orchestrator<M: MuxAdapter> {
    config: Config,
    options: Options,
    mux: M,
    owner: SessionOwner,
    coordinator: Arc<Coordinator>,
    bus: EventBus,
    tracker: ClientTracker,
    supervisors: Arc<Mutex<Vec<SupervisorHandle>>>,
    start_time: Instant,
    // NOTE(lifetime): held to maintain the exclusive process lock
    #[allow(dead_code)]
    lock_file: File,
    // Taken by run(); Option so the selector can own the receivers while
    // the rest of the struct stays borrowable
    shutdown_rx: Option<mpsc::Receiver<ShutdownReason>>,
    reload_rx: Option<mpsc::Receiver<ReloadRequest>>,
    /// Flipping this cancels every background task
    stop_tx: watch::Sender<bool>,
    ipc_task: JoinHandle<()>,
    watcher_task: JoinHandle<()>,
    tracker_task: JoinHandle<()>,
}

impl<M: MuxAdapter> Orchestrator<M> {
    /// Run the full startup sequence and start every background task.
    pub async fn start(
        config: Config,
        options: Options,
        mux: M,
    ) -> Result<Self, OrchestratorError> {
        match Self::start_inner(config.clone(), options, mux).await {
            Ok(orchestrator) => Ok(orchestrator),
            Err(e) => {
                // Lock-failure means those files belong to a running daemon
                if !matches!(
                    e,
                    OrchestratorError::LockFailed(_) | OrchestratorError::AlreadyRunning(_)
                ) {
                    cleanup_on_failure(&config);
                }
                Err(e)
            }
        }
    }

    async fn start_inner(
        config: Config,
        options: Options,
        mux: M,
    ) -> Result<Self, OrchestratorError> {
        // 1. Directories
        std::fs::create_dir_all(&config.base_dir)?;

        // 2. Socket pre-flight
        match check_socket(&config.socket_path).await? {
            SocketStatus::Nonexistent => {}
            SocketStatus::Stale => {
                info!(path = %config.socket_path.display(), "removing stale socket");
                std::fs::remove_file(&config.socket_path)?;
            }
            SocketStatus::Active => {
                if options.force_new {
                    warn!(
                        path = %config.socket_path.display(),
                        "socket is active but --force-new given, taking over"
                    );
                    std::fs::remove_file(&config.socket_path)?;
                } else {
                    return Err(OrchestratorError::AlreadyRunning(config.socket_path));
                }
            }
            SocketStatus::PermissionDenied => {
                return Err(OrchestratorError::SocketPermission(config.socket_path));
            }
        }

        // 3. Process lock, before anything else can race.
        // OpenOptions avoids truncating a running daemon's pid file.
        let lock_file = std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&config.lock_path)?;
        lock_file
            .try_lock_exclusive()
            .map_err(OrchestratorError::LockFailed)?;
        let mut lock_file = lock_file;
        lock_file.set_len(0)?;
        writeln!(lock_file, "{}", std::process::id())?;
        let lock_file = lock_file;

        // 4. Ownership record
        let owner = SessionOwner::capture();
        info!(
            uid = owner.uid,
            username = %owner.username,
            hostname = %owner.hostname,
            "session ownership recorded"
        );

        // 5. Repository; load or start empty
        let repository = Arc::new(Repository::new(&config.state_path));
        repository.initialize()?;
        let state = match repository.load()? {
            Some((state, outcome)) => {
                info!(
                    version = state.version.counter,
                    sessions = state.sessions.len(),
                    messages = state.messages.len(),
                    outcome = ?outcome,
                    "state loaded"
                );
                state
            }
            None => {
                info!("no recoverable state, starting empty");
                AppState::new(Utc::now())
            }
        };

        // 6. Bus, coordinator, gate, tracker
        let bus = EventBus::new();
        let coordinator = Coordinator::new(
            state,
            bus.clone(),
            options.strategy.clone(),
            Arc::clone(&repository),
        );
        let gate = Arc::new(PermissionGate::new(owner.clone()));
        let tracker = ClientTracker::new();

        // 7. Create or reclaim the tmux session
        let panes = if mux.has_session(&config.session).await? {
            info!(session = %config.session, "reclaiming existing tmux session");
            reclaim_session(&mux, &config).await?
        } else {
            info!(session = %config.session, "creating tmux session");
            create_session(&mux, &config).await?
        };

        // 8. Background tasks
        let (stop_tx, _) = watch::channel(false);
        let (shutdown_tx, shutdown_rx) = mpsc::channel(4);
        let (reload_tx, reload_rx) = mpsc::channel(4);

        coordinator.spawn_save_worker();
        coordinator.spawn_autosave(crate::env::autosave_interval(), stop_tx.subscribe());

        let supervisors: Vec<SupervisorHandle> = panes
            .into_iter()
            .map(|(spec, target)| {
                supervisor::spawn(
                    mux.clone(),
                    spec,
                    target,
                    bus.clone(),
                    SupervisorConfig {
                        poll_interval: crate::env::poll_interval(),
                        ..SupervisorConfig::default()
                    },
                    stop_tx.subscribe(),
                )
            })
            .collect();
        let supervisors = Arc::new(Mutex::new(supervisors));

        let watcher_task = watcher::spawn(
            mux.clone(),
            config.session.clone(),
            crate::env::watch_interval(),
            shutdown_tx.clone(),
            stop_tx.subscribe(),
        );

        let tracker_task = clients::spawn(
            mux.clone(),
            config.session.clone(),
            tracker.clone(),
            TrackerOptions {
                interval: crate::env::client_poll_interval(),
                auto_shutdown_when_empty: options.auto_shutdown_when_empty,
                empty_grace: crate::env::empty_grace(),
                on_change: None,
            },
            shutdown_tx.clone(),
            stop_tx.subscribe(),
        );

        let start_time = Instant::now();
        let status = make_status_fn(
            &config,
            Arc::clone(&coordinator),
            bus.clone(),
            tracker.clone(),
            Arc::clone(&supervisors),
            start_time,
        );

        let ctx = IpcContext {
            coordinator: Arc::clone(&coordinator),
            bus: bus.clone(),
            gate,
            tracker: tracker.clone(),
            shutdown_tx,
            reload_tx,
            status,
        };
        let server = IpcServer::bind(&config.socket_path, ctx)
            .map_err(|e| OrchestratorError::BindFailed(config.socket_path.clone(), e))?;
        let ipc_task = tokio::spawn(server.run(stop_tx.subscribe()));

        info!(session = %config.session, "daemon started");

        Ok(Self {
            config,
            options,
            mux,
            owner,
            coordinator,
            bus,
            tracker,
            supervisors,
            start_time,
            lock_file,
            shutdown_rx: Some(shutdown_rx),
            reload_rx: Some(reload_rx),
            stop_tx,
            ipc_task,
            watcher_task,
            tracker_task,
        })
    }

    pub fn session(&self) -> &str {
        &self.config.session
    }

    pub fn owner(&self) -> &SessionOwner {
        &self.owner
    }

    pub fn coordinator(&self) -> &Arc<Coordinator> {
        &self.coordinator
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn tracker(&self) -> &ClientTracker {
        &self.tracker
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Park on the signal/shutdown selector until a shutdown reason
    /// arrives, then run the shutdown sequence.
    pub async fn run(mut self) -> Result<(), OrchestratorError> {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sighup = signal(SignalKind::hangup())?;

        let Some(mut shutdown_rx) = self.shutdown_rx.take() else {
            return Ok(());
        };
        let Some(mut reload_rx) = self.reload_rx.take() else {
            return Ok(());
        };

        let reason = loop {
            tokio::select! {
                reason = shutdown_rx.recv() => {
                    match reason {
                        Some(reason) => break reason,
                        None => break ShutdownReason::Signal,
                    }
                }

                request = reload_rx.recv() => {
                    if let Some(request) = request {
                        let respawned = self.reload().await;
                        let _ = request.reply.send(respawned);
                    }
                }

                _ = sigint.recv() => {
                    match self.options.run_mode {
                        RunMode::Foreground => {
                            info!("SIGINT received, shutting down");
                            break ShutdownReason::Signal;
                        }
                        RunMode::Daemon => info!("SIGINT ignored (daemon mode)"),
                    }
                }

                _ = sigterm.recv() => {
                    match self.options.run_mode {
                        RunMode::Foreground => {
                            info!("SIGTERM received, shutting down");
                            break ShutdownReason::Signal;
                        }
                        RunMode::Daemon => info!("SIGTERM ignored (daemon mode)"),
                    }
                }

                _ = sighup.recv() => {
                    // Ignored unconditionally; detaching clients send these
                    info!("SIGHUP ignored");
                }
            }
        };

        info!(reason = reason.describe(), "shutting down");
        self.shutdown(reason.cleanup()).await
    }

    /// Re-run the pane health pass: respawn dead panes, refresh stale
    /// environments. Returns the number of panes respawned.
    pub async fn reload(&self) -> u32 {
        let panes: Vec<(PaneSpec, String)> = {
            let supervisors = self.supervisors.lock();
            supervisors
                .iter()
                .map(|s| (s.spec.clone(), s.target.clone()))
                .collect()
        };

        let mut respawned = 0;
        for (spec, target) in panes {
            let health = match classify_pane(&self.mux, &target).await {
                Ok(health) => health,
                Err(e) => {
                    warn!(target = %target, error = %e, "reload: health check failed");
                    continue;
                }
            };

            let needs = health.needs_respawn()
                || (health == PaneHealth::Healthy
                    && !pane_env_current(&self.mux, &self.config, &target).await);
            if !needs {
                continue;
            }

            match self.mux.respawn_pane(&target, &spec).await {
                Ok(()) => respawned += 1,
                Err(e) => warn!(target = %target, error = %e, "reload: respawn failed"),
            }
        }

        info!(respawned, "layout reload complete");
        respawned
    }

    /// The ordered shutdown sequence.
    pub async fn shutdown(self, cleanup: bool) -> Result<(), OrchestratorError> {
        // 1+2. Stop accepting IPC and drain connections (bounded inside
        // the server), cancel watchers/supervisors/tickers.
        let _ = self.stop_tx.send(true);
        if tokio::time::timeout(Duration::from_secs(6), self.ipc_task)
            .await
            .is_err()
        {
            warn!("IPC server did not stop in time");
        }

        // 3. Wait for supervisors with a deadline
        let handles: Vec<SupervisorHandle> = {
            let mut supervisors = self.supervisors.lock();
            supervisors.drain(..).collect()
        };
        for handle in handles {
            if !handle.join(SUPERVISOR_JOIN_TIMEOUT).await {
                warn!("supervisor did not stop in time");
            }
        }
        self.watcher_task.abort();
        self.tracker_task.abort();

        // 4. Final synchronous save
        self.coordinator.close_saves();
        if let Err(e) = self.coordinator.final_save().await {
            error!(error = %e, "final save failed");
        }

        // 5. Session cleanup or the unsupervised warning
        if cleanup {
            info!(session = %self.config.session, "killing tmux session");
            if let Err(e) = self.mux.kill_session(&self.config.session).await {
                warn!(error = %e, "failed to kill tmux session");
            }
        } else if self.mux.has_session(&self.config.session).await.unwrap_or(false) {
            let _ = self
                .mux
                .set_status_message(&self.config.session, UNSUPERVISED_WARNING)
                .await;
            info!(
                session = %self.config.session,
                "panes left unsupervised; reclaim with `px start {}`, clean up with `px stop {} --cleanup`",
                self.config.session,
                self.config.session
            );
        }

        // 6. Remove the socket; the lock releases when lock_file drops
        if self.config.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.config.socket_path) {
                warn!(error = %e, "failed to remove socket file");
            }
        }

        info!("daemon stopped");
        Ok(())
    }
}

/// Build the four-pane layout in a fresh session.
async fn create_session<M: MuxAdapter>(
    mux: &M,
    config: &Config,
) -> Result<Vec<(PaneSpec, String)>, OrchestratorError> {
    let mut specs = PaneSpec::default_layout(&config.socket_path).into_iter();
    let mut panes = Vec::new();

    // First pane rides on session creation, the rest are splits
    if let Some(first) = specs.next() {
        let target = mux.new_session(&config.session, &first).await?;
        panes.push((first, target));
    }
    for spec in specs {
        let target = mux.split_pane(&config.session, &spec).await?;
        panes.push((spec, target));
    }
    Ok(panes)
}

/// Adopt an existing session: match panes to roles by title, respawn the
/// dead, refresh environments pointing at an old socket, and create any
/// panes that are missing entirely.
async fn reclaim_session<M: MuxAdapter>(
    mux: &M,
    config: &Config,
) -> Result<Vec<(PaneSpec, String)>, OrchestratorError> {
    let existing = mux.list_panes(&config.session).await?;
    let mut by_role: HashMap<String, px_adapters::PaneInfo> = existing
        .into_iter()
        .map(|p| (p.title.clone(), p))
        .collect();

    let mut panes = Vec::new();
    for spec in PaneSpec::default_layout(&config.socket_path) {
        let Some(info) = by_role.remove(spec.role.as_str()) else {
            info!(role = %spec.role, "no pane for role, creating");
            let target = mux.split_pane(&config.session, &spec).await?;
            panes.push((spec, target));
            continue;
        };

        let health = classify_pane(mux, &info.id).await?;
        match health {
            PaneHealth::Healthy => {
                // A healthy pane pointing at a previous daemon's socket
                // gets exactly one respawn; a current one is untouched
                if pane_env_current(mux, config, &info.id).await {
                    info!(role = %spec.role, target = %info.id, "pane healthy, adopting");
                } else {
                    info!(
                        role = %spec.role,
                        target = %info.id,
                        "pane env stale, respawning once"
                    );
                    mux.respawn_pane(&info.id, &spec).await?;
                }
            }
            PaneHealth::Dead | PaneHealth::Zombie => {
                info!(role = %spec.role, target = %info.id, health = %health, "respawning");
                mux.respawn_pane(&info.id, &spec).await?;
            }
            PaneHealth::Missing => {
                // list-panes raced against pane removal; recreate
                let target = mux.split_pane(&config.session, &spec).await?;
                panes.push((spec, target));
                continue;
            }
        }
        panes.push((spec, info.id));
    }

    for (title, info) in by_role {
        warn!(title = %title, target = %info.id, "unrecognized pane left unsupervised");
    }

    Ok(panes)
}

/// Whether a pane process's socket variable matches the current socket.
async fn pane_env_current<M: MuxAdapter>(mux: &M, config: &Config, target: &str) -> bool {
    let Ok(Some(pid)) = mux.pane_pid(target).await else {
        return false;
    };
    let Ok(env) = mux.process_env(pid).await else {
        // Unreadable environment is no reason to respawn a healthy pane
        return true;
    };
    match env.get(SOCKET_ENV_VAR) {
        Some(path) => path == &config.socket_path.display().to_string(),
        None => false,
    }
}

fn supervisor_health(state: SupervisorState) -> PaneHealth {
    match state {
        SupervisorState::Running => PaneHealth::Healthy,
        SupervisorState::Starting | SupervisorState::Restarting => PaneHealth::Dead,
        SupervisorState::NotStarted | SupervisorState::Failed | SupervisorState::Stopped => {
            PaneHealth::Missing
        }
    }
}

fn make_status_fn(
    config: &Config,
    coordinator: Arc<Coordinator>,
    bus: EventBus,
    tracker: ClientTracker,
    supervisors: Arc<Mutex<Vec<SupervisorHandle>>>,
    start_time: Instant,
) -> crate::ipc::StatusFn {
    let session = config.session.clone();
    let socket_path = config.socket_path.display().to_string();
    let state_path = config.state_path.display().to_string();

    Arc::new(move || {
        let state = coordinator.snapshot();
        let metrics = coordinator.metrics();
        let panes = {
            let supervisors = supervisors.lock();
            supervisors
                .iter()
                .map(|s| PaneStatusEntry {
                    role: s.spec.role,
                    target: s.target.clone(),
                    health: supervisor_health(s.state()),
                    restarts: s.restarts(),
                })
                .collect()
        };
        let panels = bus
            .subscribers()
            .into_iter()
            .map(|s| PanelEntry {
                panel_id: s.panel_id,
                panel_type: s.panel_type,
                connected_at: s.connected_at,
                events_delivered: s.events_delivered,
            })
            .collect();

        DaemonStatus {
            session: session.clone(),
            pid: std::process::id(),
            uptime_secs: start_time.elapsed().as_secs(),
            version: PROTOCOL_VERSION.to_string(),
            state_version: state.version.counter,
            update_count: state.update_count,
            attached_clients: tracker.count(),
            panels,
            panes,
            socket_path: socket_path.clone(),
            state_path: state_path.clone(),
            updates_accepted: metrics.updates_accepted,
            updates_rejected: metrics.updates_rejected,
            conflicts_resolved: metrics.conflicts_resolved,
            saves: metrics.saves,
            saves_dropped: metrics.saves_dropped,
        }
    })
}

/// Remove files created by a failed startup.
fn cleanup_on_failure(config: &Config) {
    if config.socket_path.exists() {
        let _ = std::fs::remove_file(&config.socket_path);
    }
    if config.lock_path.exists() {
        let _ = std::fs::remove_file(&config.lock_path);
    }
}

#[cfg(test)]
#[path = "orchestrator_tests.rs"]
mod tests;
