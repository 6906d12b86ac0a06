// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use px_daemon::Config;
use tempfile::TempDir;

fn config_in(dir: &TempDir) -> Config {
    Config::for_base(dir.path().to_path_buf(), "main")
}

#[test]
fn startup_error_is_read_from_the_log() {
    let dir = TempDir::new().unwrap();
    let config = config_in(&dir);
    std::fs::create_dir_all(config.log_path.parent().unwrap()).unwrap();
    std::fs::write(
        &config.log_path,
        "--- pxd: starting (pid: 42) ---\n\nERROR Failed to start daemon: lock held\n",
    )
    .unwrap();

    assert_eq!(
        read_startup_error(&config).as_deref(),
        Some("Failed to start daemon: lock held")
    );
}

#[test]
fn missing_log_yields_no_error() {
    let dir = TempDir::new().unwrap();
    assert!(read_startup_error(&config_in(&dir)).is_none());
}

#[test]
fn last_error_wins() {
    let dir = TempDir::new().unwrap();
    let config = config_in(&dir);
    std::fs::create_dir_all(config.log_path.parent().unwrap()).unwrap();
    std::fs::write(
        &config.log_path,
        "ERROR first\nsome noise\nERROR second\n",
    )
    .unwrap();

    assert_eq!(read_startup_error(&config).as_deref(), Some("second"));
}
