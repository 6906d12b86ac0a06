// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tmux multiplexer adapter

use super::{ClientInfo, MuxAdapter, MuxError, PaneInfo};
use async_trait::async_trait;
use std::collections::HashMap;
use std::process::Output;
use std::time::Duration;
use tokio::process::Command;

use px_core::PaneSpec;

/// Upper bound on any single tmux invocation.
const TMUX_TIMEOUT: Duration = Duration::from_secs(5);

/// Tmux-based multiplexer adapter
#[derive(Clone, Default)]
pub struct TmuxAdapter;

impl TmuxAdapter {
    pub fn new() -> Self {
        Self
    }

    async fn run(&self, args: &[&str]) -> Result<Output, MuxError> {
        let fut = Command::new("tmux").args(args).output();
        match tokio::time::timeout(TMUX_TIMEOUT, fut).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) => Err(MuxError::CommandFailed(e.to_string())),
            Err(_) => Err(MuxError::Timeout(format!("tmux {}", args.join(" ")))),
        }
    }

    /// Run and require success; map failure onto `err`.
    async fn run_ok(&self, args: &[&str], err: impl FnOnce(String) -> MuxError) -> Result<Output, MuxError> {
        let output = self.run(args).await?;
        if output.status.success() {
            Ok(output)
        } else {
            Err(err(String::from_utf8_lossy(&output.stderr).to_string()))
        }
    }

    /// Query a single format field for a target pane.
    async fn display(&self, target: &str, format: &str) -> Result<String, MuxError> {
        let output = self
            .run_ok(&["display-message", "-p", "-t", target, format], |_| {
                MuxError::PaneNotFound(target.to_string())
            })
            .await?;
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

/// `-e KEY=VALUE` argument pairs for a pane spec, in stable order.
fn env_args(spec: &PaneSpec) -> Vec<String> {
    let mut args = Vec::new();
    for (key, value) in spec.env_sorted() {
        args.push("-e".to_string());
        args.push(format!("{}={}", key, value));
    }
    args
}

pub(crate) fn parse_pane_line(line: &str) -> Option<PaneInfo> {
    let mut fields = line.split('\t');
    let id = fields.next()?.to_string();
    let title = fields.next().unwrap_or_default().to_string();
    let pid = fields.next().and_then(|s| s.trim().parse().ok());
    let dead = fields.next().map(|s| s.trim() == "1").unwrap_or(false);
    if id.is_empty() {
        return None;
    }
    Some(PaneInfo {
        id,
        title,
        pid,
        dead,
    })
}

#[async_trait]
impl MuxAdapter for TmuxAdapter {
    async fn has_session(&self, session: &str) -> Result<bool, MuxError> {
        let output = self.run(&["has-session", "-t", session]).await?;
        Ok(output.status.success())
    }

    async fn new_session(&self, session: &str, spec: &PaneSpec) -> Result<String, MuxError> {
        let env = env_args(spec);
        let mut args: Vec<&str> = vec![
            "new-session",
            "-d",
            "-s",
            session,
            "-P",
            "-F",
            "#{pane_id}",
        ];
        args.extend(env.iter().map(String::as_str));
        args.push(&spec.command);

        let output = self
            .run_ok(&args, MuxError::CommandFailed)
            .await?;
        let target = String::from_utf8_lossy(&output.stdout).trim().to_string();
        self.set_pane_title(&target, spec.role.as_str()).await?;
        Ok(target)
    }

    async fn split_pane(&self, session: &str, spec: &PaneSpec) -> Result<String, MuxError> {
        let env = env_args(spec);
        let mut args: Vec<&str> = vec![
            "split-window",
            "-d",
            "-t",
            session,
            "-P",
            "-F",
            "#{pane_id}",
        ];
        args.extend(env.iter().map(String::as_str));
        args.push(&spec.command);

        let output = self
            .run_ok(&args, MuxError::CommandFailed)
            .await?;
        let target = String::from_utf8_lossy(&output.stdout).trim().to_string();
        self.set_pane_title(&target, spec.role.as_str()).await?;
        Ok(target)
    }

    async fn kill_session(&self, session: &str) -> Result<(), MuxError> {
        let output = self.run(&["kill-session", "-t", session]).await?;
        if !output.status.success() {
            // Session may already be gone; killing twice is not an error
            tracing::debug!(session, "kill-session reported failure");
        }
        Ok(())
    }

    async fn list_panes(&self, session: &str) -> Result<Vec<PaneInfo>, MuxError> {
        let output = self
            .run_ok(
                &[
                    "list-panes",
                    "-s",
                    "-t",
                    session,
                    "-F",
                    "#{pane_id}\t#{pane_title}\t#{pane_pid}\t#{pane_dead}",
                ],
                |_| MuxError::SessionNotFound(session.to_string()),
            )
            .await?;

        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .filter_map(parse_pane_line)
            .collect())
    }

    async fn pane_exists(&self, target: &str) -> Result<bool, MuxError> {
        let output = self
            .run(&["display-message", "-p", "-t", target, "#{pane_id}"])
            .await?;
        Ok(output.status.success())
    }

    async fn pane_dead(&self, target: &str) -> Result<bool, MuxError> {
        Ok(self.display(target, "#{pane_dead}").await? == "1")
    }

    async fn pane_pid(&self, target: &str) -> Result<Option<u32>, MuxError> {
        let pid = self.display(target, "#{pane_pid}").await?;
        Ok(pid.parse().ok())
    }

    async fn respawn_pane(&self, target: &str, spec: &PaneSpec) -> Result<(), MuxError> {
        let env = env_args(spec);
        let mut args: Vec<&str> = vec!["respawn-pane", "-k", "-t", target];
        args.extend(env.iter().map(String::as_str));
        args.push(&spec.command);

        self.run_ok(&args, |stderr| {
            if stderr.contains("can't find") {
                MuxError::PaneNotFound(target.to_string())
            } else {
                MuxError::CommandFailed(stderr)
            }
        })
        .await?;
        Ok(())
    }

    async fn set_pane_title(&self, target: &str, title: &str) -> Result<(), MuxError> {
        self.run_ok(&["select-pane", "-t", target, "-T", title], |_| {
            MuxError::PaneNotFound(target.to_string())
        })
        .await?;
        Ok(())
    }

    async fn list_clients(&self, session: &str) -> Result<Vec<ClientInfo>, MuxError> {
        let output = self
            .run_ok(
                &["list-clients", "-t", session, "-F", "#{client_tty}"],
                |_| MuxError::SessionNotFound(session.to_string()),
            )
            .await?;

        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(|l| ClientInfo {
                tty: l.trim().to_string(),
            })
            .collect())
    }

    async fn set_status_message(&self, session: &str, text: &str) -> Result<(), MuxError> {
        let output = self
            .run(&["set-option", "-t", session, "status-left", text])
            .await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            tracing::warn!(session, stderr = %stderr, "tmux set-option failed");
            // Non-fatal: the warning banner is advisory
        }
        Ok(())
    }

    async fn process_alive(&self, pid: u32) -> bool {
        crate::procenv::process_alive(pid).await
    }

    async fn process_env(&self, pid: u32) -> Result<HashMap<String, String>, MuxError> {
        crate::procenv::process_env(pid).await
    }
}

#[cfg(test)]
#[path = "tmux_tests.rs"]
mod tests;
