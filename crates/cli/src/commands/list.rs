// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `px list` - list sessions under the state directory.

use px_daemon::{check_socket, state_dir, SocketStatus};

use crate::{EXIT_FAILURE, EXIT_OK};

pub async fn run(quiet: bool) -> i32 {
    let base = match state_dir() {
        Ok(base) => base,
        Err(e) => {
            eprintln!("error: {}", e);
            return EXIT_FAILURE;
        }
    };

    let entries = match std::fs::read_dir(&base) {
        Ok(entries) => entries,
        Err(_) => {
            // No state directory yet means no sessions
            return EXIT_OK;
        }
    };

    let mut sessions: Vec<String> = entries
        .filter_map(|e| e.ok())
        .filter_map(|e| {
            let name = e.file_name().to_string_lossy().into_owned();
            name.strip_suffix(".sock").map(|s| s.to_string())
        })
        .collect();
    sessions.sort();

    for session in sessions {
        if quiet {
            println!("{}", session);
            continue;
        }

        let socket = base.join(format!("{}.sock", session));
        let status = match check_socket(&socket).await {
            Ok(SocketStatus::Active) => "running",
            Ok(SocketStatus::Stale) => "stale",
            Ok(SocketStatus::Nonexistent) => "stopped",
            Ok(SocketStatus::PermissionDenied) => "no access",
            Err(_) => "unknown",
        };
        println!("{:<24} {}", session, status);
    }

    EXIT_OK
}
