// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workspace-level CLI specs.
//!
//! Exercise the built `px` and `pxd` binaries against an isolated state
//! directory. Anything needing a live tmux server stays in the crate
//! unit tests against the fake adapter.

use assert_cmd::Command;
use std::os::unix::net::UnixListener;
use tempfile::TempDir;

fn px(state_dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("px").expect("px binary");
    cmd.env("PX_STATE_DIR", state_dir.path());
    cmd.env("PX_TIMEOUT_IPC_MS", "500");
    cmd.env("PX_TIMEOUT_CONNECT_MS", "500");
    cmd
}

fn pxd(state_dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("pxd").expect("pxd binary");
    cmd.env("PX_STATE_DIR", state_dir.path());
    cmd
}

#[test]
fn px_help_lists_subcommands() {
    let dir = TempDir::new().unwrap();
    let assert = px(&dir).arg("--help").assert().success();
    let out = String::from_utf8_lossy(&assert.get_output().stdout).into_owned();
    for subcommand in ["start", "attach", "detach", "stop", "status", "list"] {
        assert!(out.contains(subcommand), "help missing '{}'", subcommand);
    }
}

#[test]
fn pxd_version_prints_and_exits_zero() {
    let dir = TempDir::new().unwrap();
    let assert = pxd(&dir).arg("--version").assert().success();
    let out = String::from_utf8_lossy(&assert.get_output().stdout).into_owned();
    assert!(out.starts_with("pxd "));
}

#[test]
fn pxd_rejects_unknown_arguments() {
    let dir = TempDir::new().unwrap();
    pxd(&dir).arg("--bogus").assert().code(1);
}

#[test]
fn list_is_empty_without_sessions() {
    let dir = TempDir::new().unwrap();
    let assert = px(&dir).args(["list", "--quiet"]).assert().success();
    let out = String::from_utf8_lossy(&assert.get_output().stdout).into_owned();
    assert!(out.trim().is_empty());
}

#[test]
fn list_classifies_a_stale_socket() {
    let dir = TempDir::new().unwrap();
    let socket = dir.path().join("old.sock");
    drop(UnixListener::bind(&socket).unwrap());

    let assert = px(&dir).arg("list").assert().success();
    let out = String::from_utf8_lossy(&assert.get_output().stdout).into_owned();
    assert!(out.contains("old"));
    assert!(out.contains("stale"));
}

#[test]
fn status_without_daemon_exits_not_found() {
    let dir = TempDir::new().unwrap();
    px(&dir).args(["status", "ghost"]).assert().code(3);
}

#[test]
fn stop_without_daemon_exits_not_found() {
    let dir = TempDir::new().unwrap();
    px(&dir).args(["stop", "ghost"]).assert().code(3);
}

#[test]
fn status_json_flag_requires_running_daemon() {
    let dir = TempDir::new().unwrap();
    let assert = px(&dir).args(["status", "--json"]).assert().code(3);
    let err = String::from_utf8_lossy(&assert.get_output().stderr).into_owned();
    assert!(err.contains("not running"));
}
