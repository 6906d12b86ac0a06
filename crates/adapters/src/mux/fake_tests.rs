// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use px_core::{PaneRole, PaneSpec};
use std::path::PathBuf;

fn spec(role: PaneRole) -> PaneSpec {
    PaneSpec::for_role(role, &PathBuf::from("/tmp/px/main.sock"))
}

#[tokio::test]
async fn new_session_creates_first_pane() {
    let mux = FakeMuxAdapter::new();
    let target = mux
        .new_session("main", &spec(PaneRole::Sessions))
        .await
        .unwrap();

    assert!(mux.has_session("main").await.unwrap());
    let panes = mux.list_panes("main").await.unwrap();
    assert_eq!(panes.len(), 1);
    assert_eq!(panes[0].id, target);
    assert_eq!(panes[0].title, "sessions");
    assert!(!panes[0].dead);
}

#[tokio::test]
async fn duplicate_session_fails() {
    let mux = FakeMuxAdapter::new();
    mux.new_session("main", &spec(PaneRole::Sessions))
        .await
        .unwrap();
    assert!(mux
        .new_session("main", &spec(PaneRole::Sessions))
        .await
        .is_err());
}

#[tokio::test]
async fn split_pane_appends_in_order() {
    let mux = FakeMuxAdapter::new();
    mux.new_session("main", &spec(PaneRole::Sessions))
        .await
        .unwrap();
    mux.split_pane("main", &spec(PaneRole::Messages))
        .await
        .unwrap();
    mux.split_pane("main", &spec(PaneRole::Input)).await.unwrap();

    let titles: Vec<_> = mux
        .list_panes("main")
        .await
        .unwrap()
        .into_iter()
        .map(|p| p.title)
        .collect();
    assert_eq!(titles, vec!["sessions", "messages", "input"]);
}

#[tokio::test]
async fn respawn_revives_dead_pane_with_new_pid() {
    let mux = FakeMuxAdapter::new();
    let target = mux
        .new_session("main", &spec(PaneRole::Input))
        .await
        .unwrap();
    let old_pid = mux.pane_pid(&target).await.unwrap().unwrap();

    mux.kill_pane_process(&target);
    assert!(mux.pane_dead(&target).await.unwrap());

    mux.respawn_pane(&target, &spec(PaneRole::Input))
        .await
        .unwrap();
    assert!(!mux.pane_dead(&target).await.unwrap());
    let new_pid = mux.pane_pid(&target).await.unwrap().unwrap();
    assert_ne!(new_pid, old_pid);
    assert_eq!(mux.respawn_count(&target), 1);
}

#[tokio::test]
async fn scripted_respawn_failures_run_out() {
    let mux = FakeMuxAdapter::new();
    let target = mux
        .new_session("main", &spec(PaneRole::Input))
        .await
        .unwrap();
    mux.fail_respawns(&target, 2);

    assert!(mux.respawn_pane(&target, &spec(PaneRole::Input)).await.is_err());
    assert!(mux.respawn_pane(&target, &spec(PaneRole::Input)).await.is_err());
    assert!(mux.respawn_pane(&target, &spec(PaneRole::Input)).await.is_ok());
}

#[tokio::test]
async fn process_env_reflects_spawn_env() {
    let mux = FakeMuxAdapter::new();
    let target = mux
        .new_session("main", &spec(PaneRole::Controller))
        .await
        .unwrap();
    let pid = mux.pane_pid(&target).await.unwrap().unwrap();

    let env = mux.process_env(pid).await.unwrap();
    assert_eq!(
        env.get(px_core::SOCKET_ENV_VAR).map(String::as_str),
        Some("/tmp/px/main.sock")
    );
}

#[tokio::test]
async fn clients_are_scriptable() {
    let mux = FakeMuxAdapter::new();
    mux.add_session("main");
    assert!(mux.list_clients("main").await.unwrap().is_empty());

    mux.set_clients("main", &["/dev/ttys001", "/dev/ttys002"]);
    let clients = mux.list_clients("main").await.unwrap();
    assert_eq!(clients.len(), 2);
    assert_eq!(clients[0].tty, "/dev/ttys001");
}

#[tokio::test]
async fn kill_session_removes_everything() {
    let mux = FakeMuxAdapter::new();
    let target = mux
        .new_session("main", &spec(PaneRole::Sessions))
        .await
        .unwrap();
    mux.kill_session("main").await.unwrap();

    assert!(!mux.has_session("main").await.unwrap());
    assert!(!mux.pane_exists(&target).await.unwrap());
    assert!(mux.list_panes("main").await.is_err());
}

#[tokio::test]
async fn calls_are_recorded() {
    let mux = FakeMuxAdapter::new();
    mux.new_session("main", &spec(PaneRole::Sessions))
        .await
        .unwrap();
    mux.set_status_message("main", "warning").await.unwrap();

    let calls = mux.calls();
    assert!(matches!(&calls[0], MuxCall::NewSession { session, .. } if session == "main"));
    assert!(matches!(&calls[1], MuxCall::SetStatusMessage { text, .. } if text == "warning"));
    assert_eq!(mux.status_message("main").as_deref(), Some("warning"));
}
