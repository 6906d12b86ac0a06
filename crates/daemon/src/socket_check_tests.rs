// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::time::Instant;
use tempfile::TempDir;
use tokio::net::UnixListener;

#[tokio::test]
async fn missing_path_is_nonexistent() {
    let dir = TempDir::new().unwrap();
    let status = check_socket(&dir.path().join("nope.sock")).await.unwrap();
    assert_eq!(status, SocketStatus::Nonexistent);
}

#[tokio::test]
async fn live_listener_is_active() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("live.sock");
    let _listener = UnixListener::bind(&path).unwrap();

    // A live listener must never be classified stale, and repeated
    // probes must not disturb it
    for _ in 0..10 {
        let status = check_socket(&path).await.unwrap();
        assert_eq!(status, SocketStatus::Active);
    }
}

#[tokio::test]
async fn dead_listener_is_stale_within_two_seconds() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("dead.sock");
    let listener = UnixListener::bind(&path).unwrap();
    drop(listener); // socket file remains, nobody listening

    assert!(path.exists());
    let start = Instant::now();
    let status = check_socket(&path).await.unwrap();
    assert_eq!(status, SocketStatus::Stale);
    assert!(start.elapsed() < std::time::Duration::from_secs(2));
}

#[tokio::test]
async fn regular_file_is_a_hard_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("file.sock");
    std::fs::write(&path, "not a socket").unwrap();

    match check_socket(&path).await {
        Err(SocketCheckError::NotASocket(_)) => {}
        other => panic!("unexpected: {:?}", other),
    }
}

#[tokio::test]
async fn checker_never_deletes() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("dead.sock");
    drop(UnixListener::bind(&path).unwrap());

    let _ = check_socket(&path).await.unwrap();
    assert!(path.exists());
}
