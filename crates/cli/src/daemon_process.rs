// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon process management utilities.
//!
//! Starting `pxd` in the background, waiting for its socket to come up,
//! and surfacing startup errors from its log.

use std::path::PathBuf;
use std::time::Instant;

use px_daemon::{check_socket, Config, Options, SocketStatus};

use crate::client::ClientError;
use crate::env;

/// Start the daemon in the background for `session`.
pub fn start_daemon_background(
    session: &str,
    options: &Options,
) -> Result<std::process::Child, ClientError> {
    let pxd = find_pxd_binary()?;

    // Background-started daemons always run in signal-ignoring daemon
    // mode; --foreground is handled by the start command itself.
    let mut command = std::process::Command::new(&pxd);
    command.arg(session);
    if options.force_new {
        command.arg("--force-new");
    }
    if options.reuse {
        command.arg("--reuse");
    }
    if options.auto_shutdown_when_empty {
        command.arg("--auto-shutdown-when-empty");
    }

    command
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .spawn()
        .map_err(|e| ClientError::DaemonStartFailed(e.to_string()))
}

/// Wait until the daemon's socket answers, or time out with whatever
/// error its log recorded.
pub async fn wait_for_daemon(config: &Config) -> Result<(), ClientError> {
    let deadline = Instant::now() + env::timeout_connect();
    loop {
        if let Ok(SocketStatus::Active) = check_socket(&config.socket_path).await {
            return Ok(());
        }
        if Instant::now() >= deadline {
            return Err(match read_startup_error(config) {
                Some(error) => ClientError::DaemonStartFailed(error),
                None => ClientError::DaemonStartTimeout,
            });
        }
        tokio::time::sleep(env::poll_interval()).await;
    }
}

/// Last startup error the daemon wrote to its log, if any.
pub fn read_startup_error(config: &Config) -> Option<String> {
    let log = std::fs::read_to_string(&config.log_path).ok()?;
    log.lines()
        .rev()
        .find(|line| line.starts_with("ERROR "))
        .map(|line| line.trim_start_matches("ERROR ").to_string())
}

/// Find the pxd binary: explicit override, then a sibling of the current
/// executable, then PATH.
fn find_pxd_binary() -> Result<PathBuf, ClientError> {
    if let Some(path) = env::daemon_binary() {
        return Ok(PathBuf::from(path));
    }

    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            let sibling = dir.join("pxd");
            if sibling.exists() {
                return Ok(sibling);
            }
        }
    }

    Ok(PathBuf::from("pxd"))
}

#[cfg(test)]
#[path = "daemon_process_tests.rs"]
mod tests;
