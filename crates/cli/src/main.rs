// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! px CLI
//!
//! Control surface for the px daemon: start/stop sessions, attach and
//! detach tmux clients, inspect status.

mod client;
mod commands;
mod daemon_process;
mod env;

use clap::{Parser, Subcommand};

use crate::client::ClientError;

/// Exit codes: 0 success, 1 generic failure, 2 authorization failure,
/// 3 already-running / not-found.
pub const EXIT_OK: i32 = 0;
pub const EXIT_FAILURE: i32 = 1;
pub const EXIT_AUTH: i32 = 2;
pub const EXIT_STATE: i32 = 3;

#[derive(Parser)]
#[command(name = "px", version, about = "Multi-pane terminal orchestrator")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the daemon (and attach unless --server-only)
    Start {
        /// Session name
        name: Option<String>,
        /// Start the daemon without attaching a tmux client
        #[arg(long)]
        server_only: bool,
        /// Run the daemon in this terminal; signals shut it down
        #[arg(long, conflicts_with = "daemon")]
        foreground: bool,
        /// Detach the daemon from terminal signals (default)
        #[arg(long)]
        daemon: bool,
        /// Take over an active socket
        #[arg(long)]
        force_new: bool,
        /// Succeed quietly when the session is already served
        #[arg(long)]
        reuse: bool,
        /// Stop the daemon after the session has no attached clients
        #[arg(long)]
        auto_shutdown_when_empty: bool,
    },

    /// Attach a tmux client to the session
    Attach {
        /// Session name
        name: Option<String>,
    },

    /// Detach tmux clients from the session
    Detach {
        /// Session name
        name: Option<String>,
        /// Detach every attached client
        #[arg(long)]
        all: bool,
    },

    /// Stop the daemon
    Stop {
        /// Session name
        name: Option<String>,
        /// Kill the tmux session too
        #[arg(long)]
        cleanup: bool,
        /// Refuse when other clients are still attached
        #[arg(long)]
        check_clients: bool,
        /// Override the attached-clients refusal
        #[arg(long)]
        force: bool,
    },

    /// Show daemon status
    Status {
        /// Session name
        name: Option<String>,
        /// Emit raw JSON
        #[arg(long)]
        json: bool,
    },

    /// List sessions under the state directory
    List {
        /// Print session names only
        #[arg(long, short)]
        quiet: bool,
    },
}

fn default_session(name: Option<String>) -> String {
    name.unwrap_or_else(|| "main".to_string())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let code = match cli.command {
        Command::Start {
            name,
            server_only,
            foreground,
            daemon: _,
            force_new,
            reuse,
            auto_shutdown_when_empty,
        } => {
            commands::start::run(
                &default_session(name),
                commands::start::StartArgs {
                    server_only,
                    foreground,
                    force_new,
                    reuse,
                    auto_shutdown_when_empty,
                },
            )
            .await
        }
        Command::Attach { name } => commands::attach::run(&default_session(name)),
        Command::Detach { name, all } => commands::detach::run(&default_session(name), all),
        Command::Stop {
            name,
            cleanup,
            check_clients,
            force,
        } => commands::stop::run(&default_session(name), cleanup, check_clients, force).await,
        Command::Status { name, json } => commands::status::run(&default_session(name), json).await,
        Command::List { quiet } => commands::list::run(quiet).await,
    };

    std::process::exit(code);
}

/// Map a client error onto the exit code contract, printing the message.
fn report(error: &ClientError) -> i32 {
    eprintln!("error: {}", error);
    match error {
        ClientError::AuthFailed(_) => EXIT_AUTH,
        ClientError::DaemonNotRunning => EXIT_STATE,
        _ => EXIT_FAILURE,
    }
}
