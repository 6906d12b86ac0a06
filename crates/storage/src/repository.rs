// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Atomic, lock-protected persistence of the shared application state.
//!
//! The on-disk document is `{ header, state }` where the header carries a
//! format version, a write timestamp, and a sha256 checksum of the state
//! payload. Saves write to a temp file in the same directory, fsync,
//! rotate the previous file into the backup chain, and rename into place.
//! Loads verify the header and fall back through the backups newest-first
//! when the main file is corrupt.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use px_core::{AppState, StateError};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{info, warn};

use crate::lock::FileLock;

/// Current on-disk format version.
pub const FORMAT_VERSION: u32 = 1;

/// Default lock acquisition timeout.
const LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors from repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("State validation error: {0}")]
    State(#[from] StateError),
}

/// Metadata header preceding the state document.
///
/// Unknown fields written by newer versions are tolerated on load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateHeader {
    pub format_version: u32,
    pub timestamp: DateTime<Utc>,
    /// Lowercase hex sha256 of the serialized state payload
    pub checksum: String,
}

#[derive(Serialize, Deserialize)]
struct StateDocument {
    header: StateHeader,
    state: serde_json::Value,
}

/// Where a successful load came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// The main state file decoded and validated
    Primary,
    /// Backup `n` (1 = newest) was the first recoverable copy
    Backup(u32),
}

/// Snapshot of repository facts for the `status` surface.
#[derive(Debug, Clone, Serialize)]
pub struct RepositoryStats {
    pub path: PathBuf,
    pub lock_path: PathBuf,
    pub size_bytes: Option<u64>,
    pub modified: Option<DateTime<Utc>>,
    pub lock_held: bool,
    pub backups: u32,
}

/// Repository for one session's persisted state.
pub struct Repository {
    path: PathBuf,
    lock: FileLock,
    backup_depth: u32,
}

impl Repository {
    /// Repository at `path` with the default backup depth (3).
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_backup_depth(path, 3)
    }

    pub fn with_backup_depth(path: impl Into<PathBuf>, backup_depth: u32) -> Self {
        let path = path.into();
        let lock_path = lock_path_for(&path);
        Self {
            path,
            lock: FileLock::new(lock_path, LOCK_TIMEOUT),
            backup_depth,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create the state directory (temp files and backups live beside the
    /// state file, so one directory covers all of them).
    pub fn initialize(&self) -> Result<(), RepositoryError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(())
    }

    /// Persist `state` atomically.
    ///
    /// Failures leave the previous file (and its backups) in place; the
    /// caller keeps its in-memory state and may retry.
    pub fn save(&self, state: &AppState) -> Result<(), RepositoryError> {
        let _guard = self.lock.acquire()?;

        let state_value = serde_json::to_value(state)?;
        let payload = serde_json::to_vec(&state_value)?;
        let document = StateDocument {
            header: StateHeader {
                format_version: FORMAT_VERSION,
                timestamp: Utc::now(),
                checksum: format!("{:x}", Sha256::digest(&payload)),
            },
            state: state_value,
        };

        // Fresh temp file in the same directory so the rename is atomic
        let tmp_path = self.path.with_extension("tmp");
        {
            let file = File::create(&tmp_path)?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer(&mut writer, &document)?;
            writer.write_all(b"\n")?;
            let file = writer.into_inner().map_err(|e| e.into_error())?;
            file.sync_all()?;
        }

        // Rotate the current file into the backup chain, then swap in
        if self.path.exists() {
            let backup = self.rotate_backups();
            if let Err(e) = fs::rename(&self.path, &backup) {
                warn!(error = %e, "failed to rotate state backup");
            }
        }
        fs::rename(&tmp_path, &self.path)?;

        Ok(())
    }

    /// Load the newest recoverable state.
    ///
    /// Returns `Ok(None)` when neither the main file nor any backup holds
    /// a valid document, including the nothing-persisted-yet case. The
    /// caller starts from the empty state.
    pub fn load(&self) -> Result<Option<(AppState, LoadOutcome)>, RepositoryError> {
        let _guard = self.lock.acquire()?;

        if !self.path.exists() {
            return Ok(None);
        }

        match read_document(&self.path) {
            Ok(state) => return Ok(Some((state, LoadOutcome::Primary))),
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "state file corrupt, trying backups"
                );
            }
        }

        for n in 1..=self.backup_depth {
            let backup = self.backup_path(n);
            if !backup.exists() {
                continue;
            }
            match read_document(&backup) {
                Ok(state) => {
                    info!(backup = %backup.display(), "recovered state from backup");
                    return Ok(Some((state, LoadOutcome::Backup(n))));
                }
                Err(e) => {
                    warn!(backup = %backup.display(), error = %e, "backup unreadable");
                }
            }
        }

        Ok(None)
    }

    /// Facts about the persisted file for the status surface.
    pub fn stats(&self) -> RepositoryStats {
        let meta = fs::metadata(&self.path).ok();
        let backups = (1..=self.backup_depth)
            .filter(|n| self.backup_path(*n).exists())
            .count() as u32;
        RepositoryStats {
            path: self.path.clone(),
            lock_path: self.lock.path().to_path_buf(),
            size_bytes: meta.as_ref().map(|m| m.len()),
            modified: meta
                .and_then(|m| m.modified().ok())
                .map(DateTime::<Utc>::from),
            lock_held: self.lock.is_held_elsewhere(),
            backups,
        }
    }

    fn backup_path(&self, n: u32) -> PathBuf {
        let base = self.path.display();
        if n == 1 {
            PathBuf::from(format!("{}.backup", base))
        } else {
            PathBuf::from(format!("{}.backup.{}", base, n))
        }
    }

    /// Shift backups up by one and return the slot for the current file.
    fn rotate_backups(&self) -> PathBuf {
        let oldest = self.backup_path(self.backup_depth);
        if oldest.exists() {
            let _ = fs::remove_file(&oldest);
        }
        for n in (1..self.backup_depth).rev() {
            let src = self.backup_path(n);
            if src.exists() {
                let _ = fs::rename(&src, self.backup_path(n + 1));
            }
        }
        self.backup_path(1)
    }
}

fn lock_path_for(path: &Path) -> PathBuf {
    PathBuf::from(format!("{}.lock", path.display()))
}

/// Decode and verify one document file.
fn read_document(path: &Path) -> Result<AppState, RepositoryError> {
    let file = File::open(path)?;
    let document: StateDocument = serde_json::from_reader(BufReader::new(file))?;

    if document.header.format_version > FORMAT_VERSION {
        return Err(RepositoryError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!(
                "unsupported state format version {}",
                document.header.format_version
            ),
        )));
    }

    let payload = serde_json::to_vec(&document.state)?;
    let checksum = format!("{:x}", Sha256::digest(&payload));
    if checksum != document.header.checksum {
        return Err(RepositoryError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "state checksum mismatch",
        )));
    }

    let mut state: AppState = serde_json::from_value(document.state)?;
    state.validate()?;
    Ok(state)
}

#[cfg(test)]
#[path = "repository_tests.rs"]
mod tests;
