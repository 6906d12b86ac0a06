// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process-wide exclusive file lock.
//!
//! An in-process `parking_lot::Mutex` serializes lock ownership between
//! tasks of this daemon; an `fs2` exclusive flock on the lock file
//! serializes against other processes. Acquisition polls with a timeout;
//! a lock file older than the timeout with no live flock holder is
//! presumed stale, removed, and the acquisition retried once.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use fs2::FileExt;
use parking_lot::{Mutex, MutexGuard};
use tracing::warn;

const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Exclusive lock on a sibling `.lock` file.
pub struct FileLock {
    path: PathBuf,
    mutex: Arc<Mutex<()>>,
    timeout: Duration,
}

/// Holds the lock until dropped.
#[derive(Debug)]
pub struct LockGuard<'a> {
    file: File,
    _serial: MutexGuard<'a, ()>,
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        // Closing the file would release the flock anyway; unlock explicitly
        // so the release is not at the mercy of descriptor lifetime.
        let _ = FileExt::unlock(&self.file);
    }
}

impl FileLock {
    pub fn new(path: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            path: path.into(),
            mutex: Arc::new(Mutex::new(())),
            timeout,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether some other holder currently has the OS lock.
    pub fn is_held_elsewhere(&self) -> bool {
        let Ok(file) = OpenOptions::new().write(true).open(&self.path) else {
            return false;
        };
        if file.try_lock_exclusive().is_ok() {
            let _ = FileExt::unlock(&file);
            false
        } else {
            true
        }
    }

    /// Acquire the lock, polling up to the configured timeout.
    pub fn acquire(&self) -> io::Result<LockGuard<'_>> {
        let serial = self.mutex.lock();

        match self.try_acquire_os_lock() {
            Ok(file) => Ok(LockGuard {
                file,
                _serial: serial,
            }),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => {
                // A lock file untouched for longer than the timeout with no
                // live flock holder is a leftover from a crashed writer.
                if self.lock_file_is_stale() {
                    warn!(path = %self.path.display(), "removing stale lock file");
                    let _ = std::fs::remove_file(&self.path);
                    let file = self.try_acquire_os_lock()?;
                    return Ok(LockGuard {
                        file,
                        _serial: serial,
                    });
                }
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    fn try_acquire_os_lock(&self) -> io::Result<File> {
        let deadline = Instant::now() + self.timeout;
        loop {
            let file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(false)
                .open(&self.path)?;

            match file.try_lock_exclusive() {
                Ok(()) => return Ok(file),
                Err(_) if Instant::now() < deadline => {
                    std::thread::sleep(POLL_INTERVAL);
                }
                Err(_) => {
                    return Err(io::Error::new(
                        io::ErrorKind::TimedOut,
                        format!(
                            "timed out acquiring lock {} after {:?}",
                            self.path.display(),
                            self.timeout
                        ),
                    ));
                }
            }
        }
    }

    fn lock_file_is_stale(&self) -> bool {
        let Ok(meta) = std::fs::metadata(&self.path) else {
            return false;
        };
        let age = meta
            .modified()
            .ok()
            .and_then(|mtime| SystemTime::now().duration_since(mtime).ok());
        match age {
            Some(age) if age > self.timeout => !self.is_held_elsewhere(),
            _ => false,
        }
    }
}

#[cfg(test)]
#[path = "lock_tests.rs"]
mod tests;
