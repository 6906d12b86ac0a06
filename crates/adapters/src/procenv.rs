// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process liveness and environment probes.
//!
//! Linux reads `/proc/<pid>`; other unixes fall back to `ps`. The daemon
//! uses these to verify a reclaimed pane's process still points at the
//! current socket path.

use std::collections::HashMap;
#[cfg(not(target_os = "linux"))]
use std::time::Duration;

use crate::mux::MuxError;

#[cfg(not(target_os = "linux"))]
const PS_TIMEOUT: Duration = Duration::from_secs(5);

/// Whether `pid` refers to a live process.
pub(crate) async fn process_alive(pid: u32) -> bool {
    #[cfg(target_os = "linux")]
    {
        std::path::Path::new(&format!("/proc/{}", pid)).exists()
    }

    #[cfg(not(target_os = "linux"))]
    {
        let fut = tokio::process::Command::new("ps")
            .args(["-p", &pid.to_string()])
            .output();
        match tokio::time::timeout(PS_TIMEOUT, fut).await {
            Ok(Ok(output)) => output.status.success(),
            _ => false,
        }
    }
}

/// Environment of a live process.
pub(crate) async fn process_env(pid: u32) -> Result<HashMap<String, String>, MuxError> {
    #[cfg(target_os = "linux")]
    {
        let path = format!("/proc/{}/environ", pid);
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| MuxError::CommandFailed(format!("read {}: {}", path, e)))?;
        Ok(bytes
            .split(|b| *b == 0)
            .filter_map(|entry| {
                let entry = String::from_utf8_lossy(entry);
                let (key, value) = entry.split_once('=')?;
                Some((key.to_string(), value.to_string()))
            })
            .collect())
    }

    #[cfg(not(target_os = "linux"))]
    {
        let fut = tokio::process::Command::new("ps")
            .args(["eww", "-p", &pid.to_string()])
            .output();
        let output = match tokio::time::timeout(PS_TIMEOUT, fut).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(MuxError::CommandFailed(e.to_string())),
            Err(_) => return Err(MuxError::Timeout(format!("ps eww -p {}", pid))),
        };
        if !output.status.success() {
            return Err(MuxError::CommandFailed(format!(
                "ps eww -p {} failed",
                pid
            )));
        }
        Ok(parse_ps_env(&String::from_utf8_lossy(&output.stdout)))
    }
}

/// Parse `VAR=value` tokens out of `ps eww` output.
///
/// `ps eww` appends the environment to the command line; everything after
/// the command that looks like an assignment is taken as one.
pub fn parse_ps_env(output: &str) -> HashMap<String, String> {
    let Some(line) = output.lines().last() else {
        return HashMap::new();
    };
    line.split_whitespace()
        .filter_map(|token| {
            let (key, value) = token.split_once('=')?;
            // Environment keys are [A-Z0-9_]; skips command-line noise
            if key.is_empty()
                || !key
                    .chars()
                    .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
            {
                return None;
            }
            Some((key.to_string(), value.to_string()))
        })
        .collect()
}

#[cfg(test)]
#[path = "procenv_tests.rs"]
mod tests;
