// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Unix-socket IPC server.
//!
//! Accepts panel and CLI connections, runs the handshake, then splits
//! each connection into a reader (dispatching requests) and a writer
//! (draining a bounded outbound queue). Events from the bus are pumped
//! into the same queue; a full queue terminates the connection rather
//! than letting it grow.

use std::collections::{HashMap, HashSet};
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error, info, warn};

use px_core::{PaneRole, PanelId, StateEvent};

use crate::clients::ClientTracker;
use crate::coordinator::{Coordinator, CoordinatorError};
use crate::event_bus::EventBus;
use crate::gate::{GateError, Operation, PeerCreds, PermissionGate};
use crate::orchestrator::ShutdownReason;
use crate::protocol::{
    self, DaemonStatus, ErrorCode, Frame, Message, DEFAULT_TIMEOUT, PROTOCOL_VERSION,
};

/// Handshake must complete within this deadline.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Outbound queue depth per connection.
const OUTBOUND_DEPTH: usize = 64;

/// Grace period for draining connections on stop.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Builds the status snapshot; provided by the orchestrator.
pub type StatusFn = Arc<dyn Fn() -> DaemonStatus + Send + Sync>;

/// Reload request routed to the orchestrator; replies with the number of
/// panes respawned.
pub struct ReloadRequest {
    pub reply: oneshot::Sender<u32>,
}

/// Everything a connection handler needs.
#[derive(Clone)]
pub struct IpcContext {
    pub coordinator: Arc<Coordinator>,
    pub bus: EventBus,
    pub gate: Arc<PermissionGate>,
    pub tracker: ClientTracker,
    pub shutdown_tx: mpsc::Sender<ShutdownReason>,
    pub reload_tx: mpsc::Sender<ReloadRequest>,
    pub status: StatusFn,
}

/// Per-connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnState {
    Handshaking,
    Active,
    Closing,
}

struct ConnectionEntry {
    panel_id: Option<PanelId>,
    peer: PeerCreds,
    state: ConnState,
}

/// Which event kinds a connection receives.
enum EventFilter {
    All,
    Only(HashSet<String>),
    AllExcept(HashSet<String>),
}

impl EventFilter {
    fn accepts(&self, kind: &str) -> bool {
        match self {
            EventFilter::All => true,
            EventFilter::Only(kinds) => kinds.contains(kind),
            EventFilter::AllExcept(kinds) => !kinds.contains(kind),
        }
    }

    fn subscribe(&mut self, kinds: Vec<String>) {
        match self {
            EventFilter::Only(set) => set.extend(kinds),
            EventFilter::AllExcept(set) => {
                for kind in kinds {
                    set.remove(&kind);
                }
            }
            EventFilter::All => {
                *self = EventFilter::Only(kinds.into_iter().collect());
            }
        }
    }

    fn unsubscribe(&mut self, kinds: Vec<String>) {
        match self {
            EventFilter::Only(set) => {
                for kind in kinds {
                    set.remove(&kind);
                }
            }
            EventFilter::AllExcept(set) => set.extend(kinds),
            EventFilter::All => {
                *self = EventFilter::AllExcept(kinds.into_iter().collect());
            }
        }
    }
}

/// The IPC server.
pub struct IpcServer {
    listener: UnixListener,
    ctx: IpcContext,
    connections: Arc<Mutex<HashMap<String, ConnectionEntry>>>,
    active: Arc<AtomicUsize>,
}

impl IpcServer {
    /// Bind the listening socket with owner-only permissions.
    pub fn bind(path: &Path, ctx: IpcContext) -> std::io::Result<Self> {
        let listener = UnixListener::bind(path)?;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
        info!(path = %path.display(), "IPC server listening");
        Ok(Self {
            listener,
            ctx,
            connections: Arc::new(Mutex::new(HashMap::new())),
            active: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn connection_count(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Accept loop; returns once `shutdown` flips and then waits up to the
    /// drain timeout for active connections to finish.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, _addr)) => {
                            let ctx = self.ctx.clone();
                            let connections = Arc::clone(&self.connections);
                            let active = Arc::clone(&self.active);
                            let conn_shutdown = shutdown.clone();
                            active.fetch_add(1, Ordering::SeqCst);
                            tokio::spawn(async move {
                                if let Err(e) =
                                    handle_connection(stream, ctx, &connections, conn_shutdown).await
                                {
                                    match e {
                                        ConnectionError::Protocol(
                                            protocol::ProtocolError::ConnectionClosed,
                                        ) => debug!("client disconnected"),
                                        ConnectionError::Protocol(
                                            protocol::ProtocolError::Timeout,
                                        ) => warn!("connection timeout"),
                                        _ => error!("connection error: {}", e),
                                    }
                                }
                                active.fetch_sub(1, Ordering::SeqCst);
                            });
                        }
                        Err(e) => {
                            error!("accept error: {}", e);
                            tokio::time::sleep(Duration::from_millis(100)).await;
                        }
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        // Stopped accepting; drain active connections up to the grace period
        let deadline = tokio::time::Instant::now() + DRAIN_TIMEOUT;
        while self.active.load(Ordering::SeqCst) > 0 {
            if tokio::time::Instant::now() >= deadline {
                warn!(
                    remaining = self.active.load(Ordering::SeqCst),
                    "drain timeout, closing remaining connections"
                );
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        // Dropping the listener closes the socket; remaining connection
        // tasks terminate on their next read/write against a closed peer
        // or via the shutdown watch they hold.
    }
}

/// Errors from connection handling.
#[derive(Debug, thiserror::Error)]
enum ConnectionError {
    #[error("protocol error: {0}")]
    Protocol(#[from] protocol::ProtocolError),

    #[error("handshake failed: {0}")]
    Handshake(String),
}

/// Try to queue a frame; a full outbound queue is fatal for the connection.
fn queue_frame(outbound: &mpsc::Sender<Frame>, frame: Frame) -> Result<(), ()> {
    match outbound.try_send(frame) {
        Ok(()) => Ok(()),
        Err(mpsc::error::TrySendError::Full(_)) => Err(()),
        Err(mpsc::error::TrySendError::Closed(_)) => Err(()),
    }
}

async fn handle_connection(
    stream: UnixStream,
    ctx: IpcContext,
    connections: &Arc<Mutex<HashMap<String, ConnectionEntry>>>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), ConnectionError> {
    let peer: PeerCreds = stream
        .peer_cred()
        .map_err(|e| ConnectionError::Handshake(format!("peer credentials: {}", e)))?
        .into();

    let connection_id = uuid::Uuid::new_v4().to_string();
    connections.lock().insert(
        connection_id.clone(),
        ConnectionEntry {
            panel_id: None,
            peer,
            state: ConnState::Handshaking,
        },
    );

    let result = connection_loop(stream, &ctx, connections, &connection_id, peer, &mut shutdown).await;

    // Teardown: unsubscribe from the bus and drop the registry entry
    let entry = connections.lock().remove(&connection_id);
    if let Some(entry) = entry {
        debug!(
            connection_id,
            uid = entry.peer.uid,
            state = ?entry.state,
            "connection closed"
        );
        if let Some(panel_id) = entry.panel_id {
            ctx.bus.unsubscribe(&panel_id);
        }
    }

    result
}

async fn connection_loop(
    stream: UnixStream,
    ctx: &IpcContext,
    connections: &Arc<Mutex<HashMap<String, ConnectionEntry>>>,
    connection_id: &str,
    peer: PeerCreds,
    shutdown: &mut watch::Receiver<bool>,
) -> Result<(), ConnectionError> {
    let (mut reader, mut writer) = stream.into_split();

    // Handshake, bounded by its own deadline. An unparseable first frame
    // (e.g. a panel type outside the closed set) is an auth failure.
    let first = match protocol::read_frame_timeout(&mut reader, HANDSHAKE_TIMEOUT).await {
        Ok(frame) => frame,
        Err(protocol::ProtocolError::Json(e)) => {
            let reply = Frame::new(Message::error(
                ErrorCode::AuthFailed,
                format!("invalid handshake: {}", e),
            ));
            let _ = protocol::write_frame_timeout(&mut writer, &reply, DEFAULT_TIMEOUT).await;
            return Err(ConnectionError::Handshake(format!("invalid handshake: {}", e)));
        }
        Err(e) => return Err(e.into()),
    };
    let (panel_id, panel_type): (PanelId, PaneRole) = match first.message {
        Message::Handshake {
            panel_id,
            panel_type,
            version,
        } => {
            if !protocol::version_compatible(&version) {
                let reply = Frame::reply(
                    Message::error(
                        ErrorCode::AuthFailed,
                        format!(
                            "protocol version {} incompatible with {}",
                            version, PROTOCOL_VERSION
                        ),
                    ),
                    first.request_id,
                );
                let _ = protocol::write_frame_timeout(&mut writer, &reply, DEFAULT_TIMEOUT).await;
                return Err(ConnectionError::Handshake(format!(
                    "incompatible version {}",
                    version
                )));
            }
            (panel_id, panel_type)
        }
        other => {
            let reply = Frame::reply(
                Message::error(ErrorCode::InvalidMessage, "expected handshake"),
                first.request_id,
            );
            let _ = protocol::write_frame_timeout(&mut writer, &reply, DEFAULT_TIMEOUT).await;
            return Err(ConnectionError::Handshake(format!(
                "first frame was {}",
                message_kind(&other)
            )));
        }
    };

    info!(
        connection_id,
        panel_id = %panel_id,
        panel_type = %panel_type,
        uid = peer.uid,
        "panel connected"
    );

    // Outbound queue and writer task
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<Frame>(OUTBOUND_DEPTH);
    let writer_task = tokio::spawn(async move {
        while let Some(frame) = outbound_rx.recv().await {
            if let Err(e) = protocol::write_frame(&mut writer, &frame).await {
                debug!("writer ending: {}", e);
                break;
            }
        }
    });

    // Event subscription: the bus delivers into a bounded channel, the
    // pump filters and forwards into the outbound queue.
    let filter = Arc::new(Mutex::new(EventFilter::All));
    let (event_tx, mut event_rx) = mpsc::channel::<StateEvent>(OUTBOUND_DEPTH);
    ctx.bus.subscribe(panel_id.clone(), panel_type, event_tx);

    let pump_filter = Arc::clone(&filter);
    let pump_outbound = outbound_tx.clone();
    let pump_panel = panel_id.clone();
    let event_pump = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            if !pump_filter.lock().accepts(event.kind()) {
                continue;
            }
            let frame = Frame::new(Message::StateEvent { event });
            if queue_frame(&pump_outbound, frame).is_err() {
                warn!(
                    panel_id = %pump_panel,
                    "outbound queue full, terminating connection"
                );
                break;
            }
        }
        // Dropping pump_outbound lets the writer drain and exit
    });

    // Handshake response and activation
    {
        let mut conns = connections.lock();
        if let Some(entry) = conns.get_mut(connection_id) {
            entry.panel_id = Some(panel_id.clone());
            entry.state = ConnState::Active;
        }
    }
    let response = Frame::reply(
        Message::HandshakeResponse {
            connection_id: connection_id.to_string(),
            version: PROTOCOL_VERSION.to_string(),
            state_version: ctx.coordinator.version(),
        },
        first.request_id,
    );
    if queue_frame(&outbound_tx, response).is_err() {
        event_pump.abort();
        writer_task.abort();
        return Err(ConnectionError::Handshake("outbound queue full".into()));
    }

    // Reader loop
    let result = loop {
        let frame = tokio::select! {
            frame = protocol::read_frame(&mut reader) => frame,
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    if let Some(entry) = connections.lock().get_mut(connection_id) {
                        entry.state = ConnState::Closing;
                    }
                    break Ok(());
                }
                continue;
            }
        };

        let frame = match frame {
            Ok(frame) => frame,
            Err(protocol::ProtocolError::ConnectionClosed) => break Ok(()),
            Err(e) => break Err(ConnectionError::Protocol(e)),
        };

        let request_id = frame.request_id.clone();
        match dispatch(frame.message, ctx, &panel_id, peer, &filter).await {
            Dispatch::Reply(message) => {
                if queue_frame(&outbound_tx, Frame::reply(message, request_id)).is_err() {
                    warn!(panel_id = %panel_id, "outbound queue full, closing");
                    break Ok(());
                }
            }
            Dispatch::None => {}
            Dispatch::Close(message) => {
                let _ = queue_frame(&outbound_tx, Frame::reply(message, request_id));
                break Ok(());
            }
        }
    };

    // Closing: stop the pump, let the writer drain what is queued
    event_pump.abort();
    drop(outbound_tx);
    let _ = tokio::time::timeout(DEFAULT_TIMEOUT, writer_task).await;

    info!(connection_id, panel_id = %panel_id, "panel disconnected");
    result
}

enum Dispatch {
    Reply(Message),
    None,
    Close(Message),
}

fn gate_error_message(e: GateError) -> Message {
    match e {
        GateError::Denied { .. } => Message::error(ErrorCode::AuthFailed, e.to_string()),
        GateError::ClientsAttached { .. } => Message::error(ErrorCode::AuthFailed, e.to_string()),
    }
}

async fn dispatch(
    message: Message,
    ctx: &IpcContext,
    panel_id: &PanelId,
    peer: PeerCreds,
    filter: &Arc<Mutex<EventFilter>>,
) -> Dispatch {
    match message {
        Message::Ping => Dispatch::Reply(Message::Pong),

        Message::Heartbeat { sequence } => {
            debug!(panel_id = %panel_id, sequence, "heartbeat");
            Dispatch::None
        }

        Message::Subscribe { kinds } => {
            filter.lock().subscribe(kinds);
            Dispatch::None
        }

        Message::Unsubscribe { kinds } => {
            filter.lock().unsubscribe(kinds);
            Dispatch::None
        }

        Message::StateUpdate {
            expected_version,
            update,
        } => {
            if let Err(e) = ctx.gate.check(Operation::StateMutation, &peer) {
                return Dispatch::Reply(gate_error_message(e));
            }
            match ctx
                .coordinator
                .apply_update(panel_id, expected_version, update)
                .await
            {
                Ok(version) => Dispatch::Reply(Message::StateUpdateResponse {
                    accepted: true,
                    version,
                }),
                Err(CoordinatorError::Conflict { expected, current }) => {
                    Dispatch::Reply(Message::Error {
                        code: ErrorCode::VersionConflict,
                        message: format!("expected version {}, current {}", expected, current),
                        details: Some(serde_json::json!({
                            "expected": expected,
                            "current": current,
                        })),
                    })
                }
                Err(CoordinatorError::TooManyRetries { attempts }) => Dispatch::Reply(
                    Message::error(
                        ErrorCode::TooManyRetries,
                        format!("conflict unresolved after {} attempts", attempts),
                    ),
                ),
                Err(CoordinatorError::Rejected(e)) => {
                    Dispatch::Reply(Message::error(ErrorCode::InvalidMessage, e.to_string()))
                }
                Err(CoordinatorError::SaveFailed(e)) => {
                    Dispatch::Reply(Message::error(ErrorCode::InternalError, e))
                }
            }
        }

        Message::StateRequest => {
            if let Err(e) = ctx.gate.check(Operation::StateRead, &peer) {
                return Dispatch::Reply(gate_error_message(e));
            }
            Dispatch::Reply(Message::StateResponse {
                state: Box::new(ctx.coordinator.snapshot()),
            })
        }

        Message::Status => {
            if let Err(e) = ctx.gate.check(Operation::Status, &peer) {
                return Dispatch::Reply(gate_error_message(e));
            }
            Dispatch::Reply(Message::StatusResponse {
                status: Box::new((ctx.status)()),
            })
        }

        Message::ListClients => {
            if let Err(e) = ctx.gate.check(Operation::ListClients, &peer) {
                return Dispatch::Reply(gate_error_message(e));
            }
            let clients = ctx
                .tracker
                .clients()
                .into_iter()
                .map(|c| protocol::ClientEntry { tty: c.tty })
                .collect();
            Dispatch::Reply(Message::ListClientsResponse { clients })
        }

        Message::Shutdown { cleanup, force } => {
            let attached = ctx.tracker.count();
            if let Err(e) = ctx.gate.check_shutdown(&peer, cleanup, force, attached) {
                return Dispatch::Reply(gate_error_message(e));
            }
            info!(panel_id = %panel_id, cleanup, "shutdown requested over IPC");
            let _ = ctx
                .shutdown_tx
                .send(ShutdownReason::IpcShutdown { cleanup })
                .await;
            Dispatch::Close(Message::ShutdownResponse { stopping: true })
        }

        Message::ReloadLayout => {
            if let Err(e) = ctx.gate.check(Operation::ReloadLayout, &peer) {
                return Dispatch::Reply(gate_error_message(e));
            }
            let (reply_tx, reply_rx) = oneshot::channel();
            if ctx
                .reload_tx
                .send(ReloadRequest { reply: reply_tx })
                .await
                .is_err()
            {
                return Dispatch::Reply(Message::error(
                    ErrorCode::InternalError,
                    "orchestrator unavailable",
                ));
            }
            match tokio::time::timeout(DEFAULT_TIMEOUT, reply_rx).await {
                Ok(Ok(respawned)) => Dispatch::Reply(Message::ReloadLayoutResponse { respawned }),
                _ => Dispatch::Reply(Message::error(ErrorCode::Timeout, "reload timed out")),
            }
        }

        // Server-to-client message types are invalid as requests
        other => Dispatch::Reply(Message::error(
            ErrorCode::InvalidMessage,
            format!("unexpected message type: {}", message_kind(&other)),
        )),
    }
}

/// Wire tag of a message, for error reporting.
fn message_kind(message: &Message) -> &'static str {
    match message {
        Message::Handshake { .. } => "handshake",
        Message::HandshakeResponse { .. } => "handshake_response",
        Message::Subscribe { .. } => "subscribe",
        Message::Unsubscribe { .. } => "unsubscribe",
        Message::StateUpdate { .. } => "state_update",
        Message::StateUpdateResponse { .. } => "state_update_response",
        Message::StateRequest => "state_request",
        Message::StateResponse { .. } => "state_response",
        Message::StateEvent { .. } => "state_event",
        Message::Ping => "ping",
        Message::Pong => "pong",
        Message::Heartbeat { .. } => "heartbeat",
        Message::Error { .. } => "error",
        Message::Shutdown { .. } => "shutdown",
        Message::ShutdownResponse { .. } => "shutdown_response",
        Message::ReloadLayout => "reload_layout",
        Message::ReloadLayoutResponse { .. } => "reload_layout_response",
        Message::Status => "status",
        Message::StatusResponse { .. } => "status_response",
        Message::ListClients => "list_clients",
        Message::ListClientsResponse { .. } => "list_clients_response",
    }
}

#[cfg(test)]
#[path = "ipc_tests.rs"]
mod tests;
