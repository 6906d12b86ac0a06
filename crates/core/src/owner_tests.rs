// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn capture_records_current_uid_gid() {
    let owner = SessionOwner::capture();
    assert_eq!(owner.uid, nix::unistd::Uid::effective().as_raw());
    assert_eq!(owner.gid, nix::unistd::Gid::effective().as_raw());
    assert!(owner.is_owner(owner.uid));
    assert!(!owner.is_owner(owner.uid.wrapping_add(1)));
    assert!(owner.same_group(owner.gid));
}

#[test]
fn serde_round_trip() {
    let owner = SessionOwner::capture();
    let json = serde_json::to_string(&owner).unwrap();
    let back: SessionOwner = serde_json::from_str(&json).unwrap();
    assert_eq!(back, owner);
}
