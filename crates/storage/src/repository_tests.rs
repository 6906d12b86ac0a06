// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use chrono::Utc;
use px_core::{PanelId, SessionEntry, StateUpdate};
use tempfile::TempDir;

fn repo_in(dir: &TempDir) -> Repository {
    Repository::new(dir.path().join("state").join("main.json"))
}

fn populated_state() -> AppState {
    let mut state = AppState::new(Utc::now());
    let source = PanelId::new("sessions-1");
    state
        .apply(
            &StateUpdate::SessionAdded {
                session: SessionEntry::new("a", "Alpha", Utc::now()),
            },
            &source,
            Utc::now(),
        )
        .unwrap();
    state
        .apply(
            &StateUpdate::ThemeChanged {
                theme: "dark".to_string(),
            },
            &source,
            Utc::now(),
        )
        .unwrap();
    state
}

#[test]
fn load_from_empty_repository_is_none() {
    let dir = TempDir::new().unwrap();
    let repo = repo_in(&dir);
    repo.initialize().unwrap();
    assert!(repo.load().unwrap().is_none());
}

#[test]
fn save_then_load_round_trips() {
    let dir = TempDir::new().unwrap();
    let repo = repo_in(&dir);
    repo.initialize().unwrap();

    let state = populated_state();
    repo.save(&state).unwrap();

    let (loaded, outcome) = repo.load().unwrap().unwrap();
    assert_eq!(outcome, LoadOutcome::Primary);
    assert_eq!(loaded, state);
}

#[test]
fn save_writes_header_with_checksum() {
    let dir = TempDir::new().unwrap();
    let repo = repo_in(&dir);
    repo.initialize().unwrap();
    repo.save(&populated_state()).unwrap();

    let raw = std::fs::read_to_string(repo.path()).unwrap();
    let doc: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(doc["header"]["format_version"], FORMAT_VERSION);
    let checksum = doc["header"]["checksum"].as_str().unwrap();
    assert_eq!(checksum.len(), 64);
    assert!(doc["header"]["timestamp"].is_string());
    assert!(doc["state"].is_object());
}

#[test]
fn second_save_rotates_a_backup() {
    let dir = TempDir::new().unwrap();
    let repo = repo_in(&dir);
    repo.initialize().unwrap();

    let first = AppState::new(Utc::now());
    repo.save(&first).unwrap();
    repo.save(&populated_state()).unwrap();

    let backup = PathBuf::from(format!("{}.backup", repo.path().display()));
    assert!(backup.exists());
    assert_eq!(repo.stats().backups, 1);
}

#[test]
fn backup_chain_is_bounded() {
    let dir = TempDir::new().unwrap();
    let repo = Repository::with_backup_depth(dir.path().join("main.json"), 2);
    repo.initialize().unwrap();

    for _ in 0..5 {
        repo.save(&populated_state()).unwrap();
    }

    let base = repo.path().display().to_string();
    assert!(PathBuf::from(format!("{}.backup", base)).exists());
    assert!(PathBuf::from(format!("{}.backup.2", base)).exists());
    assert!(!PathBuf::from(format!("{}.backup.3", base)).exists());
}

#[test]
fn corrupt_main_file_falls_back_to_backup() {
    let dir = TempDir::new().unwrap();
    let repo = repo_in(&dir);
    repo.initialize().unwrap();

    let state = populated_state();
    repo.save(&state).unwrap();
    repo.save(&state).unwrap(); // rotates a good copy into .backup

    std::fs::write(repo.path(), "{ not json").unwrap();

    let (loaded, outcome) = repo.load().unwrap().unwrap();
    assert_eq!(outcome, LoadOutcome::Backup(1));
    assert_eq!(loaded, state);
}

#[test]
fn checksum_mismatch_is_treated_as_corruption() {
    let dir = TempDir::new().unwrap();
    let repo = repo_in(&dir);
    repo.initialize().unwrap();

    let state = populated_state();
    repo.save(&state).unwrap();
    repo.save(&state).unwrap();

    // Valid JSON, wrong checksum: flip the theme without re-stamping
    let raw = std::fs::read_to_string(repo.path()).unwrap();
    let tampered = raw.replace("\"dark\"", "\"lite\"");
    assert_ne!(raw, tampered);
    std::fs::write(repo.path(), tampered).unwrap();

    let (loaded, outcome) = repo.load().unwrap().unwrap();
    assert_eq!(outcome, LoadOutcome::Backup(1));
    assert_eq!(loaded.theme, "dark");
}

#[test]
fn exhausted_backups_yield_none() {
    let dir = TempDir::new().unwrap();
    let repo = repo_in(&dir);
    repo.initialize().unwrap();

    repo.save(&populated_state()).unwrap();
    repo.save(&populated_state()).unwrap();

    std::fs::write(repo.path(), "junk").unwrap();
    let backup = PathBuf::from(format!("{}.backup", repo.path().display()));
    std::fs::write(&backup, "more junk").unwrap();

    assert!(repo.load().unwrap().is_none());
}

#[test]
fn unknown_header_fields_are_tolerated() {
    let dir = TempDir::new().unwrap();
    let repo = repo_in(&dir);
    repo.initialize().unwrap();
    repo.save(&populated_state()).unwrap();

    let raw = std::fs::read_to_string(repo.path()).unwrap();
    let mut doc: serde_json::Value = serde_json::from_str(&raw).unwrap();
    doc["header"]["written_by"] = serde_json::json!("px 9.9.9");
    std::fs::write(repo.path(), serde_json::to_string(&doc).unwrap()).unwrap();

    let (_, outcome) = repo.load().unwrap().unwrap();
    assert_eq!(outcome, LoadOutcome::Primary);
}

#[test]
fn future_format_version_is_corruption() {
    let dir = TempDir::new().unwrap();
    let repo = repo_in(&dir);
    repo.initialize().unwrap();
    repo.save(&populated_state()).unwrap();
    repo.save(&populated_state()).unwrap();

    let raw = std::fs::read_to_string(repo.path()).unwrap();
    let mut doc: serde_json::Value = serde_json::from_str(&raw).unwrap();
    doc["header"]["format_version"] = serde_json::json!(99);
    std::fs::write(repo.path(), serde_json::to_string(&doc).unwrap()).unwrap();

    let (_, outcome) = repo.load().unwrap().unwrap();
    assert_eq!(outcome, LoadOutcome::Backup(1));
}

#[test]
fn stats_reports_file_facts() {
    let dir = TempDir::new().unwrap();
    let repo = repo_in(&dir);
    repo.initialize().unwrap();

    let empty = repo.stats();
    assert!(empty.size_bytes.is_none());
    assert_eq!(empty.backups, 0);
    assert!(!empty.lock_held);

    repo.save(&populated_state()).unwrap();
    let stats = repo.stats();
    assert!(stats.size_bytes.unwrap() > 0);
    assert!(stats.modified.is_some());
    assert_eq!(stats.path, repo.path());
}
