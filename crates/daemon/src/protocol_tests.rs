// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Protocol unit tests

use super::*;
use px_core::{SessionEntry, StateUpdate};
use chrono::Utc;
use yare::parameterized;

#[test]
fn frame_wire_shape_has_type_timestamp_data() {
    let frame = Frame::new(Message::Handshake {
        panel_id: PanelId::new("input-1"),
        panel_type: PaneRole::Input,
        version: PROTOCOL_VERSION.to_string(),
    });

    let json = serde_json::to_value(&frame).unwrap();
    assert_eq!(json["type"], "handshake");
    assert_eq!(json["data"]["panel_id"], "input-1");
    assert_eq!(json["data"]["panel_type"], "input");
    assert!(json["timestamp"].is_string());
    assert!(json.get("request_id").is_none());
}

#[test]
fn request_id_round_trips() {
    let frame = Frame::reply(Message::Pong, Some("req-7".to_string()));
    let json = serde_json::to_string(&frame).unwrap();
    let back: Frame = serde_json::from_str(&json).unwrap();
    assert_eq!(back.request_id.as_deref(), Some("req-7"));
    assert_eq!(back.message, Message::Pong);
}

#[test]
fn unit_messages_need_no_data() {
    let frame: Frame = serde_json::from_value(serde_json::json!({
        "type": "ping",
        "timestamp": Utc::now().to_rfc3339(),
    }))
    .unwrap();
    assert_eq!(frame.message, Message::Ping);
}

#[test]
fn state_update_frame_round_trips() {
    let frame = Frame::new(Message::StateUpdate {
        expected_version: 4,
        update: StateUpdate::SessionAdded {
            session: SessionEntry::new("a", "Alpha", Utc::now()),
        },
    });

    let encoded = encode(&frame).expect("encode failed");
    let decoded: Frame = decode(&encoded).expect("decode failed");
    assert_eq!(decoded, frame);
}

#[test]
fn error_codes_serialize_screaming_snake() {
    let msg = Message::error(ErrorCode::AuthFailed, "not the owner");
    let json = serde_json::to_value(Frame::new(msg)).unwrap();
    assert_eq!(json["type"], "error");
    assert_eq!(json["data"]["code"], "AUTH_FAILED");
    assert_eq!(json["data"]["message"], "not the owner");
    assert!(json["data"].get("details").is_none());
}

#[parameterized(
    invalid_message = { ErrorCode::InvalidMessage, "INVALID_MESSAGE" },
    version_conflict = { ErrorCode::VersionConflict, "VERSION_CONFLICT" },
    state_not_found = { ErrorCode::StateNotFound, "STATE_NOT_FOUND" },
    internal = { ErrorCode::InternalError, "INTERNAL_ERROR" },
    closed = { ErrorCode::ConnectionClosed, "CONNECTION_CLOSED" },
    timeout = { ErrorCode::Timeout, "TIMEOUT" },
    retries = { ErrorCode::TooManyRetries, "TOO_MANY_RETRIES" },
)]
fn error_code_wire_names(code: ErrorCode, wire: &str) {
    let json = serde_json::to_value(code).unwrap();
    assert_eq!(json, wire);
}

#[test]
fn shutdown_flags_default_to_false() {
    let frame: Frame = serde_json::from_value(serde_json::json!({
        "type": "shutdown",
        "timestamp": Utc::now().to_rfc3339(),
        "data": {},
    }))
    .unwrap();
    assert_eq!(
        frame.message,
        Message::Shutdown {
            cleanup: false,
            force: false
        }
    );
}

#[test]
fn status_response_round_trips() {
    let status = DaemonStatus {
        session: "main".to_string(),
        pid: 4242,
        uptime_secs: 60,
        version: PROTOCOL_VERSION.to_string(),
        state_version: 12,
        update_count: 11,
        attached_clients: 2,
        panels: vec![PanelEntry {
            panel_id: PanelId::new("input-1"),
            panel_type: PaneRole::Input,
            connected_at: Utc::now(),
            events_delivered: 9,
        }],
        panes: vec![PaneStatusEntry {
            role: PaneRole::Input,
            target: "%3".to_string(),
            health: PaneHealth::Healthy,
            restarts: 1,
        }],
        socket_path: "/tmp/px/main.sock".to_string(),
        state_path: "/tmp/px/state/main.json".to_string(),
        updates_accepted: 11,
        updates_rejected: 1,
        conflicts_resolved: 2,
        saves: 5,
        saves_dropped: 0,
    };

    let frame = Frame::new(Message::StatusResponse {
        status: Box::new(status.clone()),
    });
    let encoded = encode(&frame).unwrap();
    let back: Frame = decode(&encoded).unwrap();
    match back.message {
        Message::StatusResponse { status: got } => assert_eq!(*got, status),
        other => panic!("unexpected message: {:?}", other),
    }
}

#[parameterized(
    same = { PROTOCOL_VERSION, true },
    same_major = { "0.99.7", true },
    next_major = { "1.0.0", false },
    garbage = { "", false },
)]
fn version_compatibility(client: &str, ok: bool) {
    assert_eq!(version_compatible(client), ok);
}

#[tokio::test]
async fn frames_cross_a_socket_pair() {
    let (mut a, mut b) = tokio::io::duplex(4096);

    let frame = Frame::new(Message::Heartbeat { sequence: 3 });
    write_frame(&mut a, &frame).await.unwrap();
    let got = read_frame(&mut b).await.unwrap();
    assert_eq!(got.message, Message::Heartbeat { sequence: 3 });
}

#[tokio::test]
async fn closed_reader_reports_connection_closed() {
    let (a, mut b) = tokio::io::duplex(4096);
    drop(a);
    match read_frame(&mut b).await {
        Err(ProtocolError::ConnectionClosed) => {}
        other => panic!("unexpected: {:?}", other),
    }
}

#[tokio::test]
async fn oversized_length_prefix_is_rejected() {
    let (mut a, mut b) = tokio::io::duplex(4096);
    use tokio::io::AsyncWriteExt;
    a.write_all(&(u32::MAX).to_be_bytes()).await.unwrap();
    match read_frame(&mut b).await {
        Err(ProtocolError::FrameTooLarge { .. }) => {}
        other => panic!("unexpected: {:?}", other),
    }
}
