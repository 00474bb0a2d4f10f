// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use forge_core::test_support::queued_job;
use std::io::Write as _;

fn state_with_jobs(n: usize) -> JobState {
    let mut state = JobState::new();
    for i in 0..n {
        let job = queued_job(&format!("job-{i}"), "acme");
        state.jobs.insert(job.id.as_str().to_string(), job);
    }
    state
}

#[test]
fn save_and_load_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("jobs.snapshot");

    let snapshot = Snapshot::new(42, state_with_jobs(3));
    snapshot.save(&path).unwrap();

    let loaded = Snapshot::load(&path).unwrap().unwrap();
    assert_eq!(loaded.seq, 42);
    assert_eq!(loaded.state.jobs.len(), 3);
}

#[test]
fn load_missing_returns_none() {
    let dir = tempfile::tempdir().unwrap();
    assert!(Snapshot::load(&dir.path().join("absent")).unwrap().is_none());
}

#[test]
fn corrupt_snapshot_moved_to_bak() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("jobs.snapshot");

    {
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(b"not a zstd snapshot").unwrap();
    }

    assert!(Snapshot::load(&path).unwrap().is_none());
    assert!(!path.exists());
    assert!(path.with_extension("bak").exists());
}

#[test]
fn save_overwrites_previous_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("jobs.snapshot");

    Snapshot::new(1, state_with_jobs(1)).save(&path).unwrap();
    Snapshot::new(2, state_with_jobs(5)).save(&path).unwrap();

    let loaded = Snapshot::load(&path).unwrap().unwrap();
    assert_eq!(loaded.seq, 2);
    assert_eq!(loaded.state.jobs.len(), 5);
    // No stray tmp file left behind
    assert!(!path.with_extension("tmp").exists());
}

#[test]
fn bak_rotation_keeps_limited_history() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("jobs.snapshot");

    for _ in 0..5 {
        {
            let mut file = std::fs::File::create(&path).unwrap();
            file.write_all(b"garbage").unwrap();
        }
        assert!(Snapshot::load(&path).unwrap().is_none());
    }

    assert!(path.with_extension("bak").exists());
    assert!(path.with_extension("bak.2").exists());
    assert!(path.with_extension("bak.3").exists());
    assert!(!path.with_extension("bak.4").exists());
}
