// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use px_daemon::ErrorCode;
use tempfile::TempDir;

#[tokio::test]
async fn missing_socket_is_daemon_not_running() {
    let dir = TempDir::new().unwrap();
    let err = DaemonClient::connect(&dir.path().join("absent.sock"))
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::DaemonNotRunning));
}

#[tokio::test]
async fn dead_socket_is_daemon_not_running() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("dead.sock");
    drop(tokio::net::UnixListener::bind(&path).unwrap());

    let err = DaemonClient::connect(&path).await.unwrap_err();
    assert!(matches!(err, ClientError::DaemonNotRunning));
}

#[test]
fn auth_error_frames_map_to_auth_failed() {
    let err = unexpected(Message::Error {
        code: ErrorCode::AuthFailed,
        message: "not the owner".to_string(),
        details: None,
    });
    assert!(matches!(err, ClientError::AuthFailed(_)));
}

#[test]
fn other_error_frames_keep_their_code() {
    let err = unexpected(Message::Error {
        code: ErrorCode::VersionConflict,
        message: "stale".to_string(),
        details: None,
    });
    match err {
        ClientError::Daemon { code, .. } => assert_eq!(code, ErrorCode::VersionConflict),
        other => panic!("unexpected: {:?}", other),
    }
}

#[test]
fn non_error_surprise_is_unexpected_response() {
    let err = unexpected(Message::Pong);
    assert!(matches!(err, ClientError::UnexpectedResponse));
}
