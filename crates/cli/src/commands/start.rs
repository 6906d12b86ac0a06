// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `px start` - start the daemon, then attach.

use px_daemon::{check_socket, Config, Options, RunMode, SocketStatus};

use crate::commands::attach;
use crate::daemon_process::{start_daemon_background, wait_for_daemon};
use crate::{report, EXIT_FAILURE, EXIT_OK, EXIT_STATE};

pub struct StartArgs {
    pub server_only: bool,
    pub foreground: bool,
    pub force_new: bool,
    pub reuse: bool,
    pub auto_shutdown_when_empty: bool,
}

pub async fn run(session: &str, args: StartArgs) -> i32 {
    let config = match Config::load(session) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {}", e);
            return EXIT_FAILURE;
        }
    };

    // Pre-flight so "already running" is reported here instead of as a
    // daemon startup failure
    match check_socket(&config.socket_path).await {
        Ok(SocketStatus::Active) if args.reuse => {
            println!("session '{}' already running, reusing", session);
            if args.server_only {
                return EXIT_OK;
            }
            return attach::run(session);
        }
        Ok(SocketStatus::Active) if !args.force_new => {
            eprintln!(
                "error: session '{}' already running (use --reuse to attach, --force-new to take over)",
                session
            );
            return EXIT_STATE;
        }
        Ok(_) => {}
        Err(e) => {
            eprintln!("error: {}", e);
            return EXIT_FAILURE;
        }
    }

    let options = Options {
        run_mode: if args.foreground {
            RunMode::Foreground
        } else {
            RunMode::Daemon
        },
        force_new: args.force_new,
        reuse: args.reuse,
        auto_shutdown_when_empty: args.auto_shutdown_when_empty,
        strategy: Default::default(),
    };

    if args.foreground {
        // Run pxd in this terminal and block until it exits
        return run_foreground(session, &options);
    }

    if let Err(e) = start_daemon_background(session, &options) {
        return report(&e);
    }
    if let Err(e) = wait_for_daemon(&config).await {
        return report(&e);
    }
    println!("session '{}' started", session);

    if args.server_only {
        return EXIT_OK;
    }
    attach::run(session)
}

fn run_foreground(session: &str, options: &Options) -> i32 {
    let pxd = match crate::env::daemon_binary() {
        Some(path) => std::path::PathBuf::from(path),
        None => std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(|d| d.join("pxd")))
            .filter(|p| p.exists())
            .unwrap_or_else(|| std::path::PathBuf::from("pxd")),
    };

    let mut command = std::process::Command::new(pxd);
    command.arg(session).arg("--foreground");
    if options.force_new {
        command.arg("--force-new");
    }
    if options.auto_shutdown_when_empty {
        command.arg("--auto-shutdown-when-empty");
    }

    match command.status() {
        Ok(status) => status.code().unwrap_or(EXIT_FAILURE),
        Err(e) => {
            eprintln!("error: failed to run pxd: {}", e);
            EXIT_FAILURE
        }
    }
}
