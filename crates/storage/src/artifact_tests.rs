// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use forge_core::{ArtifactKind, FakeClock, SequentialIdGen};
use std::fs;

fn store(dir: &Path, ttl_ms: Option<u64>, clock: FakeClock) -> ArtifactStore<FakeClock, SequentialIdGen> {
    ArtifactStore::with_parts(dir, ttl_ms, clock, SequentialIdGen::new("ref"))
}

#[test]
fn put_then_get_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let store = store(dir.path(), None, FakeClock::new());

    let stored = store
        .put(&JobId::new("job-1"), "app.apk", ArtifactKind::Binary, b"apk bytes")
        .unwrap();
    assert_eq!(stored.size, 9);
    assert_eq!(stored.checksum.len(), 64);

    let bytes = store.get(&stored.reference).unwrap();
    assert_eq!(bytes, b"apk bytes");
}

#[test]
fn identical_content_is_stored_once() {
    let dir = tempfile::tempdir().unwrap();
    let store = store(dir.path(), None, FakeClock::new());

    let a = store
        .put(&JobId::new("job-1"), "a.apk", ArtifactKind::Binary, b"same")
        .unwrap();
    let b = store
        .put(&JobId::new("job-2"), "b.apk", ArtifactKind::Binary, b"same")
        .unwrap();

    assert_eq!(a.checksum, b.checksum);
    assert_ne!(a.reference, b.reference);
    let objects: Vec<_> = fs::read_dir(dir.path().join("objects")).unwrap().collect();
    assert_eq!(objects.len(), 1);
}

#[test]
fn unknown_reference_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let store = store(dir.path(), None, FakeClock::new());
    assert!(matches!(store.get("missing"), Err(ArtifactError::NotFound)));
}

#[test]
fn expired_reference_is_distinct_from_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let clock = FakeClock::new();
    let store = store(dir.path(), Some(1_000), clock.clone());

    let stored = store
        .put(&JobId::new("job-1"), "app.apk", ArtifactKind::Binary, b"bytes")
        .unwrap();

    // Still valid just before the ttl
    clock.advance_ms(999);
    assert!(store.get(&stored.reference).is_ok());

    clock.advance_ms(1);
    assert!(matches!(
        store.get(&stored.reference),
        Err(ArtifactError::Expired)
    ));
}

#[test]
fn corrupted_object_is_reported_as_checksum_mismatch() {
    let dir = tempfile::tempdir().unwrap();
    let store = store(dir.path(), None, FakeClock::new());

    let stored = store
        .put(&JobId::new("job-1"), "app.apk", ArtifactKind::Binary, b"original")
        .unwrap();

    // Flip the stored bytes behind the store's back
    fs::write(dir.path().join("objects").join(&stored.checksum), b"tampered").unwrap();

    match store.get(&stored.reference) {
        Err(ArtifactError::ChecksumMismatch { expected, actual }) => {
            assert_eq!(expected, stored.checksum);
            assert_ne!(actual, expected);
        }
        other => panic!("expected checksum mismatch, got {other:?}"),
    }
}

#[test]
fn sweep_removes_expired_refs_and_orphan_objects() {
    let dir = tempfile::tempdir().unwrap();
    let clock = FakeClock::new();
    let store = store(dir.path(), Some(100), clock.clone());

    let stored = store
        .put(&JobId::new("job-1"), "app.apk", ArtifactKind::Binary, b"bytes")
        .unwrap();

    clock.advance_ms(200);
    let removed = store.sweep_expired().unwrap();
    assert_eq!(removed, 1);

    assert!(matches!(store.get(&stored.reference), Err(ArtifactError::NotFound)));
    assert!(!dir.path().join("objects").join(&stored.checksum).exists());
}

#[test]
fn stat_reports_metadata_without_content() {
    let dir = tempfile::tempdir().unwrap();
    let store = store(dir.path(), None, FakeClock::new());

    let stored = store
        .put(&JobId::new("job-1"), "app.apk", ArtifactKind::Binary, b"apk bytes")
        .unwrap();

    let record = store.stat(&stored.reference).unwrap();
    assert_eq!(record.name, "app.apk");
    assert_eq!(record.kind, ArtifactKind::Binary);
    assert_eq!(record.size, 9);
    assert_eq!(record.checksum, stored.checksum);
    assert_eq!(record.job_id, JobId::new("job-1"));

    assert!(matches!(store.stat("missing"), Err(ArtifactError::NotFound)));
}

#[test]
fn sha256_hex_known_vector() {
    assert_eq!(
        sha256_hex(b"abc"),
        "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
    );
}
