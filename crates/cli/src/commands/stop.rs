// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `px stop` - stop the daemon over IPC.

use std::time::{Duration, Instant};

use px_daemon::{check_socket, Config, Message, SocketStatus};

use crate::client::{unexpected, DaemonClient};
use crate::{report, EXIT_FAILURE, EXIT_OK};

/// How long to wait for the daemon to actually exit after it acknowledges.
const EXIT_TIMEOUT: Duration = Duration::from_secs(5);

pub async fn run(session: &str, cleanup: bool, check_clients: bool, force: bool) -> i32 {
    let config = match Config::load(session) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {}", e);
            return EXIT_FAILURE;
        }
    };

    let mut client = match DaemonClient::connect(&config.socket_path).await {
        Ok(client) => client,
        Err(e) => return report(&e),
    };

    if check_clients {
        match client.request(Message::ListClients).await {
            Ok(Message::ListClientsResponse { clients }) if clients.len() > 1 && !force => {
                eprintln!(
                    "error: {} clients attached; use --force to stop anyway",
                    clients.len()
                );
                return EXIT_FAILURE;
            }
            Ok(Message::ListClientsResponse { .. }) => {}
            Ok(other) => return report(&unexpected(other)),
            Err(e) => return report(&e),
        }
    }

    match client.request(Message::Shutdown { cleanup, force }).await {
        Ok(Message::ShutdownResponse { stopping: true }) => {}
        Ok(other) => return report(&unexpected(other)),
        Err(e) => return report(&e),
    }

    // Wait for the socket to go away
    let deadline = Instant::now() + EXIT_TIMEOUT;
    loop {
        match check_socket(&config.socket_path).await {
            Ok(SocketStatus::Active) if Instant::now() < deadline => {
                tokio::time::sleep(crate::env::poll_interval()).await;
            }
            Ok(SocketStatus::Active) => {
                eprintln!("warning: daemon acknowledged but is still running");
                return EXIT_FAILURE;
            }
            _ => break,
        }
    }

    println!("session '{}' stopped", session);
    EXIT_OK
}
