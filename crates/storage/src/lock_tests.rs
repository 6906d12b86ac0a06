// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::time::Duration;
use tempfile::TempDir;

fn lock_in(dir: &TempDir, timeout_ms: u64) -> FileLock {
    FileLock::new(
        dir.path().join("state.json.lock"),
        Duration::from_millis(timeout_ms),
    )
}

#[test]
fn acquire_creates_lock_file() {
    let dir = TempDir::new().unwrap();
    let lock = lock_in(&dir, 200);

    let guard = lock.acquire().unwrap();
    assert!(lock.path().exists());
    drop(guard);
}

#[test]
fn reacquire_after_release() {
    let dir = TempDir::new().unwrap();
    let lock = lock_in(&dir, 200);

    drop(lock.acquire().unwrap());
    drop(lock.acquire().unwrap());
}

#[test]
fn held_elsewhere_is_visible() {
    let dir = TempDir::new().unwrap();
    let lock = lock_in(&dir, 200);

    assert!(!lock.is_held_elsewhere());
    let guard = lock.acquire().unwrap();
    assert!(lock.is_held_elsewhere());
    drop(guard);
    assert!(!lock.is_held_elsewhere());
}

#[test]
fn contended_acquire_times_out() {
    let dir = TempDir::new().unwrap();
    let lock_a = lock_in(&dir, 100);
    // Second FileLock instance models a second writer (separate in-process
    // mutex, same OS lock file).
    let lock_b = lock_in(&dir, 100);

    let guard = lock_a.acquire().unwrap();
    let err = lock_b.acquire().unwrap_err();
    assert_eq!(err.kind(), std::io::ErrorKind::TimedOut);
    drop(guard);
}

#[test]
fn leftover_lock_file_from_dead_writer_is_acquirable() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("state.json.lock");

    // A crashed writer leaves the file behind; its flock died with it.
    std::fs::write(&path, "").unwrap();
    let old = std::time::SystemTime::now() - Duration::from_secs(60);
    let file = std::fs::OpenOptions::new().write(true).open(&path).unwrap();
    file.set_modified(old).unwrap();
    drop(file);

    let lock = FileLock::new(&path, Duration::from_millis(100));
    let guard = lock.acquire().unwrap();
    drop(guard);
}
