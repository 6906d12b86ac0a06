// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn short_id_truncates() {
    let id = "abcdefghij";
    assert_eq!(id.short(4), "abcd");
    assert_eq!(id.short(20), "abcdefghij");
}

#[test]
fn panel_id_display_and_eq() {
    let id = PanelId::new("input-4242");
    assert_eq!(id.to_string(), "input-4242");
    assert_eq!(id, "input-4242");
    assert_eq!(id.as_str(), "input-4242");
    assert_eq!(id.short(5), "input");
}

#[test]
fn panel_id_serde_is_transparent_string() {
    let id = PanelId::new("sessions-1");
    let json = serde_json::to_string(&id).unwrap();
    assert_eq!(json, "\"sessions-1\"");
    let back: PanelId = serde_json::from_str(&json).unwrap();
    assert_eq!(back, id);
}

#[test]
fn uuid_gen_produces_unique_ids() {
    let gen = UuidIdGen;
    let a = gen.next();
    let b = gen.next();
    assert_ne!(a, b);
    assert_eq!(a.len(), 36);
}

#[test]
fn sequential_gen_counts_up() {
    let gen = SequentialIdGen::new("conn");
    assert_eq!(gen.next(), "conn-1");
    assert_eq!(gen.next(), "conn-2");

    // Clones share the counter
    let clone = gen.clone();
    assert_eq!(clone.next(), "conn-3");
    assert_eq!(gen.next(), "conn-4");
}
