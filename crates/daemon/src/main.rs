// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! px daemon (pxd)
//!
//! Long-lived process that owns one tmux session, supervises its panes,
//! and coordinates shared panel state over a Unix socket.
//!
//! Architecture:
//! - IPC server task handling panel and CLI connections
//! - One supervisor task per pane, plus session watcher and client tracker
//! - Orchestrator main task parked on the signal/shutdown selector

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

use px_adapters::TmuxAdapter;
use px_daemon::{
    Config, ConflictStrategy, Options, Orchestrator, OrchestratorError, RunMode,
};
use tracing::{error, info};

const DEFAULT_SESSION: &str = "main";

fn print_help() {
    println!("pxd {}", env!("CARGO_PKG_VERSION"));
    println!("px daemon - owns a tmux session and coordinates panel state");
    println!();
    println!("USAGE:");
    println!("    pxd [SESSION] [OPTIONS]");
    println!();
    println!("The daemon is typically started by the `px` CLI and should not");
    println!("be invoked directly. It listens on a Unix socket for panels");
    println!("and control commands from `px`.");
    println!();
    println!("OPTIONS:");
    println!("    --foreground                 SIGINT/SIGTERM shut the daemon down");
    println!("    --daemon                     Ignore terminal signals (default)");
    println!("    --force-new                  Take over an active socket");
    println!("    --reuse                      Exit 0 if a daemon already serves the session");
    println!("    --auto-shutdown-when-empty   Stop after the session has no clients");
    println!("    --strategy <name>            Conflict strategy: version-based,");
    println!("                                 last-write-wins, manual");
    println!("    -h, --help                   Print help information");
    println!("    -v, --version                Print version information");
}

/// Parse argv into a session name and options. Returns `None` after
/// handling an informational flag.
fn parse_args(args: &[String]) -> Result<Option<(String, Options)>, String> {
    let mut session: Option<String> = None;
    let mut options = Options::default();

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--version" | "-V" | "-v" => {
                println!("pxd {}", env!("CARGO_PKG_VERSION"));
                return Ok(None);
            }
            "--help" | "-h" | "help" => {
                print_help();
                return Ok(None);
            }
            "--foreground" => options.run_mode = RunMode::Foreground,
            "--daemon" => options.run_mode = RunMode::Daemon,
            "--force-new" => options.force_new = true,
            "--reuse" => options.reuse = true,
            "--auto-shutdown-when-empty" => options.auto_shutdown_when_empty = true,
            "--strategy" => {
                let value = iter
                    .next()
                    .ok_or_else(|| "--strategy needs a value".to_string())?;
                options.strategy = ConflictStrategy::parse(value)
                    .ok_or_else(|| format!("unknown conflict strategy: {}", value))?;
            }
            other if other.starts_with('-') => {
                return Err(format!("unexpected argument '{}'", other));
            }
            name => {
                if session.is_some() {
                    return Err(format!("unexpected argument '{}'", name));
                }
                session = Some(name.to_string());
            }
        }
    }

    Ok(Some((
        session.unwrap_or_else(|| DEFAULT_SESSION.to_string()),
        options,
    )))
}

#[tokio::main]
async fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let (session, options) = match parse_args(&args) {
        Ok(Some(parsed)) => parsed,
        Ok(None) => return,
        Err(e) => {
            eprintln!("error: {}", e);
            eprintln!("Usage: pxd [SESSION] [OPTIONS]  (see pxd --help)");
            std::process::exit(1);
        }
    };

    let config = match Config::load(&session) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {}", e);
            std::process::exit(1);
        }
    };

    // Rotate the log if it has grown too large, then write the startup
    // marker the CLI scans for (before tracing owns the file)
    rotate_log_if_needed(&config.log_path);
    if let Err(e) = write_startup_marker(&config) {
        eprintln!("error: cannot write log file: {}", e);
        std::process::exit(1);
    }

    let log_guard = match setup_logging(&config) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("error: cannot set up logging: {}", e);
            std::process::exit(1);
        }
    };

    info!(session = %session, "starting daemon");

    let reuse = options.reuse;
    let orchestrator = match Orchestrator::start(config.clone(), options, TmuxAdapter::new()).await
    {
        Ok(orchestrator) => orchestrator,
        Err(OrchestratorError::AlreadyRunning(path)) => {
            if reuse {
                println!("READY");
                info!("daemon already serving session, reusing");
                return;
            }
            let pid = std::fs::read_to_string(&config.lock_path)
                .unwrap_or_default()
                .trim()
                .to_string();
            eprintln!("pxd is already running for session '{}'", session);
            if !pid.is_empty() {
                eprintln!("  pid: {}", pid);
            }
            eprintln!("  socket: {}", path.display());
            std::process::exit(3);
        }
        Err(e) => {
            // Write the error synchronously; the non-blocking tracing
            // writer may not flush before the process exits
            write_startup_error(&config, &e);
            error!("failed to start daemon: {}", e);
            drop(log_guard);
            std::process::exit(1);
        }
    };

    // Parent (CLI) waits for this line
    println!("READY");

    if let Err(e) = orchestrator.run().await {
        error!("daemon exited with error: {}", e);
        drop(log_guard);
        std::process::exit(1);
    }
}

/// Maximum log file size before rotation (10 MB).
const MAX_LOG_SIZE: u64 = 10 * 1024 * 1024;

/// Number of rotated log files to keep.
const MAX_ROTATED_LOGS: u32 = 3;

/// Rotate the daemon log file if it exceeds [`MAX_LOG_SIZE`].
///
/// Shifts `main.log` → `main.log.1` → `main.log.2` → `main.log.3`,
/// deleting the oldest. Best-effort: rotation failures are ignored so the
/// daemon still starts.
fn rotate_log_if_needed(log_path: &std::path::Path) {
    let size = match std::fs::metadata(log_path) {
        Ok(m) => m.len(),
        Err(_) => return,
    };

    if size < MAX_LOG_SIZE {
        return;
    }

    let log_str = log_path.display().to_string();
    for i in (1..MAX_ROTATED_LOGS).rev() {
        let from = format!("{log_str}.{i}");
        let to = format!("{log_str}.{}", i + 1);
        let _ = std::fs::rename(&from, &to);
    }
    let _ = std::fs::rename(log_path, format!("{log_str}.1"));
}

/// Startup marker prefix written to the log before anything else.
/// The CLI uses it to find where the current startup attempt begins.
const STARTUP_MARKER_PREFIX: &str = "--- pxd: starting (pid: ";

fn write_startup_marker(config: &Config) -> std::io::Result<()> {
    use std::io::Write;

    if let Some(parent) = config.log_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&config.log_path)?;
    writeln!(file, "{}{}) ---\n", STARTUP_MARKER_PREFIX, std::process::id())?;
    Ok(())
}

/// Write a startup error synchronously so the CLI can surface it even if
/// the process exits before the async log writer flushes.
fn write_startup_error(config: &Config, error: &OrchestratorError) {
    use std::io::Write;

    let Ok(mut file) = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&config.log_path)
    else {
        return;
    };
    let _ = writeln!(file, "ERROR Failed to start daemon: {}", error);
}

fn setup_logging(
    config: &Config,
) -> Result<tracing_appender::non_blocking::WorkerGuard, std::io::Error> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let parent = config.log_path.parent().ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::InvalidInput, "log path has no parent")
    })?;
    std::fs::create_dir_all(parent)?;
    let file_name = config.log_path.file_name().ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::InvalidInput, "log path has no file name")
    })?;

    let file_appender = tracing_appender::rolling::never(parent, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(non_blocking))
        .init();

    Ok(guard)
}

#[cfg(test)]
#[path = "main_tests.rs"]
mod tests;
