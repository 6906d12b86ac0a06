// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn args(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

#[test]
fn no_args_means_default_session_daemon_mode() {
    let (session, options) = parse_args(&[]).unwrap().unwrap();
    assert_eq!(session, "main");
    assert_eq!(options.run_mode, RunMode::Daemon);
    assert!(!options.force_new);
    assert!(!options.reuse);
    assert!(!options.auto_shutdown_when_empty);
}

#[test]
fn session_name_and_flags() {
    let (session, options) = parse_args(&args(&[
        "work",
        "--foreground",
        "--force-new",
        "--auto-shutdown-when-empty",
    ]))
    .unwrap()
    .unwrap();
    assert_eq!(session, "work");
    assert_eq!(options.run_mode, RunMode::Foreground);
    assert!(options.force_new);
    assert!(options.auto_shutdown_when_empty);
}

#[test]
fn strategy_flag_parses() {
    let (_, options) = parse_args(&args(&["--strategy", "last-write-wins"]))
        .unwrap()
        .unwrap();
    assert_eq!(options.strategy, ConflictStrategy::LastWriteWins);
}

#[test]
fn unknown_strategy_is_an_error() {
    assert!(parse_args(&args(&["--strategy", "coin-flip"])).is_err());
    assert!(parse_args(&args(&["--strategy"])).is_err());
}

#[test]
fn unknown_flag_is_an_error() {
    assert!(parse_args(&args(&["--what"])).is_err());
}

#[test]
fn two_session_names_are_an_error() {
    assert!(parse_args(&args(&["one", "two"])).is_err());
}

#[test]
fn rotation_shifts_old_logs() {
    let dir = tempfile::TempDir::new().unwrap();
    let log = dir.path().join("main.log");
    std::fs::write(&log, vec![b'x'; (MAX_LOG_SIZE + 1) as usize]).unwrap();
    std::fs::write(format!("{}.1", log.display()), "old").unwrap();

    rotate_log_if_needed(&log);

    assert!(!log.exists());
    assert!(std::path::Path::new(&format!("{}.1", log.display())).exists());
    assert!(std::path::Path::new(&format!("{}.2", log.display())).exists());
}

#[test]
fn small_log_is_not_rotated() {
    let dir = tempfile::TempDir::new().unwrap();
    let log = dir.path().join("main.log");
    std::fs::write(&log, "tiny").unwrap();

    rotate_log_if_needed(&log);
    assert!(log.exists());
}
