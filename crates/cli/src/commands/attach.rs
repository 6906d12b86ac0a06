// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `px attach` - attach a tmux client to the session.

use crate::{EXIT_FAILURE, EXIT_STATE};

pub fn run(session: &str) -> i32 {
    let status = std::process::Command::new("tmux")
        .args(["attach-session", "-t", session])
        .status();

    match status {
        Ok(status) if status.success() => 0,
        Ok(_) => {
            eprintln!("error: no tmux session named '{}'", session);
            EXIT_STATE
        }
        Err(e) => {
            eprintln!("error: failed to run tmux: {}", e);
            EXIT_FAILURE
        }
    }
}
