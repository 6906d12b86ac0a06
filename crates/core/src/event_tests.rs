// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::{AppState, PanelId, PaneRole, StateUpdate};
use chrono::Utc;

#[test]
fn system_events_carry_the_system_source() {
    let event = StateEvent::system(EventPayload::PanelDisconnected {
        panel_id: PanelId::new("input-1"),
    });
    assert_eq!(event.source, SYSTEM_SOURCE);
    assert_eq!(event.kind(), "panel_disconnected");
}

#[test]
fn updated_event_kind_and_version() {
    let event = StateEvent::updated(
        PanelId::new("sessions-1"),
        7,
        StateUpdate::ThemeChanged {
            theme: "dark".to_string(),
        },
    );
    assert_eq!(event.kind(), "state_updated");
    match event.payload {
        EventPayload::StateUpdated { version, .. } => assert_eq!(version, 7),
        other => panic!("unexpected payload: {:?}", other),
    }
}

#[test]
fn event_serializes_with_flattened_kind() {
    let event = StateEvent::system(EventPayload::PaneFailed {
        role: PaneRole::Input,
        target: "main:0.2".to_string(),
        failures: 10,
    });
    let json = serde_json::to_value(&event).unwrap();
    assert_eq!(json["kind"], "pane_failed");
    assert_eq!(json["source"], "system");
    assert_eq!(json["data"]["target"], "main:0.2");
    assert_eq!(json["data"]["failures"], 10);

    let back: StateEvent = serde_json::from_value(json).unwrap();
    assert_eq!(back.payload, event.payload);
}

#[test]
fn sync_event_round_trips_full_state() {
    let state = AppState::new(Utc::now());
    let event = StateEvent::sync(PanelId::new(SYSTEM_SOURCE), state.clone());
    let json = serde_json::to_string(&event).unwrap();
    let back: StateEvent = serde_json::from_str(&json).unwrap();
    match back.payload {
        EventPayload::StateSync { state: got } => assert_eq!(*got, state),
        other => panic!("unexpected payload: {:?}", other),
    }
}
