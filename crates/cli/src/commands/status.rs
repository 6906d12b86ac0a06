// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `px status` - show the daemon's status snapshot.

use px_daemon::protocol::DaemonStatus;
use px_daemon::{Config, Message};

use crate::client::{unexpected, DaemonClient};
use crate::{report, EXIT_FAILURE, EXIT_OK};

pub async fn run(session: &str, json: bool) -> i32 {
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

    let status = match client.request(Message::Status).await {
        Ok(Message::StatusResponse { status }) => *status,
        Ok(other) => return report(&unexpected(other)),
        Err(e) => return report(&e),
    };

    if json {
        match serde_json::to_string_pretty(&status) {
            Ok(out) => println!("{}", out),
            Err(e) => {
                eprintln!("error: {}", e);
                return EXIT_FAILURE;
            }
        }
        return EXIT_OK;
    }

    print_human(&status);
    EXIT_OK
}

fn print_human(status: &DaemonStatus) {
    println!("session:  {}", status.session);
    println!("pid:      {}", status.pid);
    println!("version:  {}", status.version);
    println!("uptime:   {}s", status.uptime_secs);
    println!("clients:  {}", status.attached_clients);
    println!(
        "state:    version {} ({} updates, {} accepted, {} rejected)",
        status.state_version,
        status.update_count,
        status.updates_accepted,
        status.updates_rejected
    );
    println!(
        "saves:    {} ({} dropped), conflicts resolved: {}",
        status.saves, status.saves_dropped, status.conflicts_resolved
    );
    println!("socket:   {}", status.socket_path);
    println!("state:    {}", status.state_path);

    if !status.panes.is_empty() {
        println!();
        println!("panes:");
        for pane in &status.panes {
            println!(
                "  {:<12} {:<8} {:<8} restarts: {}",
                pane.role.as_str(),
                pane.target,
                pane.health,
                pane.restarts
            );
        }
    }

    if !status.panels.is_empty() {
        println!();
        println!("panels:");
        for panel in &status.panels {
            println!(
                "  {:<20} {:<12} events: {}",
                panel.panel_id.as_str(),
                panel.panel_type.as_str(),
                panel.events_delivered
            );
        }
    }
}
