// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use px_core::{EventPayload, SessionEntry, StateEvent};
use tempfile::TempDir;
use tokio::sync::mpsc;

fn panel(id: &str) -> PanelId {
    PanelId::new(id)
}

fn theme(theme: &str) -> StateUpdate {
    StateUpdate::ThemeChanged {
        theme: theme.to_string(),
    }
}

struct Fixture {
    coordinator: Arc<Coordinator>,
    bus: EventBus,
    _dir: TempDir,
}

fn fixture(strategy: ConflictStrategy) -> Fixture {
    let dir = TempDir::new().unwrap();
    let repository = Arc::new(Repository::new(dir.path().join("main.json")));
    repository.initialize().unwrap();
    let bus = EventBus::new();
    let coordinator = Coordinator::new(
        AppState::new(Utc::now()),
        bus.clone(),
        strategy,
        repository,
    );
    Fixture {
        coordinator,
        bus,
        _dir: dir,
    }
}

fn listen(bus: &EventBus) -> mpsc::Receiver<StateEvent> {
    let (tx, rx) = mpsc::channel(64);
    bus.subscribe(panel("listener"), px_core::PaneRole::Controller, tx);
    rx
}

#[tokio::test]
async fn accepted_update_bumps_version_and_broadcasts() {
    let f = fixture(ConflictStrategy::default());
    let mut events = listen(&f.bus);

    let version = f
        .coordinator
        .apply_update(&panel("controller-1"), 1, theme("dark"))
        .await
        .unwrap();

    assert_eq!(version, 2);
    assert_eq!(f.coordinator.version(), 2);
    assert_eq!(f.coordinator.snapshot().theme, "dark");

    let event = events.recv().await.unwrap();
    assert_eq!(event.source, "controller-1");
    match event.payload {
        EventPayload::StateUpdated { version, .. } => assert_eq!(version, 2),
        other => panic!("unexpected: {:?}", other),
    }

    let metrics = f.coordinator.metrics();
    assert_eq!(metrics.updates_accepted, 1);
    assert_eq!(metrics.conflicts, 0);
}

#[tokio::test]
async fn rejected_update_surfaces_and_keeps_version() {
    let f = fixture(ConflictStrategy::default());

    let err = f
        .coordinator
        .apply_update(
            &panel("input-1"),
            1,
            StateUpdate::MessageAdded {
                message: px_core::MessageEntry {
                    id: "m1".to_string(),
                    session_id: "ghost".to_string(),
                    kind: px_core::MessageKind::User,
                    content: "hi".to_string(),
                    timestamp: Utc::now(),
                    status: px_core::MessageStatus::Pending,
                    parts: None,
                },
            },
        )
        .await
        .unwrap_err();

    assert!(matches!(err, CoordinatorError::Rejected(_)));
    assert_eq!(f.coordinator.version(), 1);
    assert_eq!(f.coordinator.metrics().updates_rejected, 1);
}

// Two panels race from the same version; the loser retries
#[tokio::test]
async fn version_based_retries_stale_submission() {
    let f = fixture(ConflictStrategy::default());

    // Panel A succeeds at version 1
    f.coordinator
        .apply_update(&panel("a"), 1, theme("dark"))
        .await
        .unwrap();

    // Panel B also read version 1; its submission is stale
    let version = f
        .coordinator
        .apply_update(
            &panel("b"),
            1,
            StateUpdate::ModelChanged {
                provider: "p".to_string(),
                model: "m".to_string(),
            },
        )
        .await
        .unwrap();

    assert_eq!(version, 3);
    let state = f.coordinator.snapshot();
    assert_eq!(state.theme, "dark");
    assert_eq!(state.provider, "p");
    assert_eq!(state.model, "m");
    assert_eq!(f.coordinator.metrics().conflicts_resolved, 1);
}

#[tokio::test]
async fn manual_resolve_surfaces_conflict() {
    let f = fixture(ConflictStrategy::ManualResolve);

    f.coordinator
        .apply_update(&panel("a"), 1, theme("dark"))
        .await
        .unwrap();

    let err = f
        .coordinator
        .apply_update(&panel("b"), 1, theme("lite"))
        .await
        .unwrap_err();

    match err {
        CoordinatorError::Conflict { expected, current } => {
            assert_eq!(expected, 1);
            assert_eq!(current, 2);
        }
        other => panic!("unexpected: {:?}", other),
    }
    assert_eq!(f.coordinator.snapshot().theme, "dark");
}

#[tokio::test]
async fn last_write_wins_restamps() {
    let f = fixture(ConflictStrategy::LastWriteWins);

    f.coordinator
        .apply_update(&panel("a"), 1, theme("dark"))
        .await
        .unwrap();
    let version = f
        .coordinator
        .apply_update(&panel("b"), 1, theme("lite"))
        .await
        .unwrap();

    assert_eq!(version, 3);
    assert_eq!(f.coordinator.snapshot().theme, "lite");
    assert_eq!(f.coordinator.metrics().conflicts_resolved, 1);
}

#[tokio::test]
async fn zero_retries_exhaust_immediately() {
    let f = fixture(ConflictStrategy::VersionBased {
        max_retries: 0,
        backoff: Duration::from_millis(1),
    });

    f.coordinator
        .apply_update(&panel("a"), 1, theme("dark"))
        .await
        .unwrap();
    let err = f
        .coordinator
        .apply_update(&panel("b"), 1, theme("lite"))
        .await
        .unwrap_err();

    assert!(matches!(err, CoordinatorError::TooManyRetries { .. }));
}

// K concurrent submissions against the same starting version all get
// accepted in some serialization order, and the resolver never deadlocks
// when invoked from inside the update path.
#[tokio::test]
async fn concurrent_conflicts_all_serialize() {
    let f = fixture(ConflictStrategy::VersionBased {
        max_retries: 32,
        backoff: Duration::from_millis(1),
    });
    let k = 8;

    let mut tasks = Vec::new();
    for i in 0..k {
        let coordinator = Arc::clone(&f.coordinator);
        tasks.push(tokio::spawn(async move {
            coordinator
                .apply_update(
                    &panel(&format!("panel-{}", i)),
                    1,
                    StateUpdate::SessionAdded {
                        session: SessionEntry::new(format!("s{}", i), "gen", Utc::now()),
                    },
                )
                .await
        }));
    }

    let mut versions = Vec::new();
    for task in tasks {
        versions.push(task.await.unwrap().unwrap());
    }

    versions.sort_unstable();
    let expected: Vec<u64> = (2..=(k as u64) + 1).collect();
    assert_eq!(versions, expected);

    let state = f.coordinator.snapshot();
    assert_eq!(state.sessions.len(), k);
    assert_eq!(state.version.counter, k as u64 + 1);
}

#[tokio::test]
async fn concurrent_last_write_wins_never_deadlocks() {
    let f = fixture(ConflictStrategy::LastWriteWins);
    let k = 8;

    let mut tasks = Vec::new();
    for i in 0..k {
        let coordinator = Arc::clone(&f.coordinator);
        tasks.push(tokio::spawn(async move {
            coordinator
                .apply_update(&panel("racer"), 1, theme(&format!("t{}", i)))
                .await
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }
    assert_eq!(f.coordinator.version(), k as u64 + 1);
}

#[tokio::test]
async fn sync_persists_and_emits_snapshot() {
    let f = fixture(ConflictStrategy::default());
    f.coordinator
        .apply_update(&panel("a"), 1, theme("dark"))
        .await
        .unwrap();

    let mut events = listen(&f.bus);
    f.coordinator.sync(&panel("system")).await.unwrap();

    let event = events.recv().await.unwrap();
    match event.payload {
        EventPayload::StateSync { state } => assert_eq!(state.theme, "dark"),
        other => panic!("unexpected: {:?}", other),
    }
    assert_eq!(f.coordinator.metrics().saves, 1);
}

#[tokio::test]
async fn reset_replaces_with_empty_state() {
    let f = fixture(ConflictStrategy::default());
    f.coordinator
        .apply_update(&panel("a"), 1, theme("dark"))
        .await
        .unwrap();

    f.coordinator.reset(&panel("controller-1")).await.unwrap();

    let state = f.coordinator.snapshot();
    assert_eq!(state.version.counter, 1);
    assert_eq!(state.theme, "");
    assert_eq!(state.update_count, 0);
}

#[tokio::test]
async fn save_worker_persists_accepted_updates() {
    let f = fixture(ConflictStrategy::default());
    f.coordinator.spawn_save_worker();

    f.coordinator
        .apply_update(&panel("a"), 1, theme("dark"))
        .await
        .unwrap();

    // Wait for the background writer to drain the queue
    let deadline = std::time::Instant::now() + Duration::from_secs(2);
    loop {
        if f.coordinator.metrics().saves >= 1 {
            break;
        }
        assert!(
            std::time::Instant::now() < deadline,
            "save worker never persisted"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn close_saves_makes_enqueue_a_noop() {
    let f = fixture(ConflictStrategy::default());
    f.coordinator.close_saves();

    f.coordinator
        .apply_update(&panel("a"), 1, theme("dark"))
        .await
        .unwrap();

    let metrics = f.coordinator.metrics();
    assert_eq!(metrics.saves, 0);
    assert_eq!(metrics.saves_dropped, 0);
}

#[tokio::test]
async fn final_save_round_trips_through_repository() {
    let dir = TempDir::new().unwrap();
    let repository = Arc::new(Repository::new(dir.path().join("main.json")));
    repository.initialize().unwrap();
    let coordinator = Coordinator::new(
        AppState::new(Utc::now()),
        EventBus::new(),
        ConflictStrategy::default(),
        Arc::clone(&repository),
    );

    coordinator
        .apply_update(&panel("a"), 1, theme("dark"))
        .await
        .unwrap();
    coordinator.final_save().await.unwrap();

    let (loaded, _) = repository.load().unwrap().unwrap();
    assert_eq!(loaded.theme, "dark");
    assert_eq!(loaded.version.counter, 2);
}
