// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use forge_core::test_support::build_request;
use forge_core::JobId;
use std::io::Write as _;

fn started(n: u64) -> Event {
    Event::JobStarted {
        id: JobId::new(format!("job-{n}")),
        started_at_ms: n,
    }
}

#[test]
fn append_assigns_increasing_seqs() {
    let dir = tempfile::tempdir().unwrap();
    let mut wal = Wal::open(&dir.path().join("events.wal")).unwrap();

    assert_eq!(wal.append(&started(1)).unwrap(), 1);
    assert_eq!(wal.append(&started(2)).unwrap(), 2);
    assert_eq!(wal.write_seq(), 2);
}

#[test]
fn flush_then_replay() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("events.wal");

    {
        let mut wal = Wal::open(&path).unwrap();
        wal.append(&Event::JobSubmitted {
            id: JobId::new("job-1"),
            request: build_request("acme", 0, 5),
            created_at_ms: 5,
        })
        .unwrap();
        wal.append(&started(1)).unwrap();
        wal.flush().unwrap();
    }

    // Reopen picks up the existing sequence and entries
    let wal = Wal::open(&path).unwrap();
    assert_eq!(wal.write_seq(), 2);

    let entries = wal.entries_after(0).unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].seq, 1);
    assert_eq!(entries[1].event.name(), "job:started");

    let after_first = wal.entries_after(1).unwrap();
    assert_eq!(after_first.len(), 1);
}

#[test]
fn unflushed_entries_are_not_durable() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("events.wal");

    {
        let mut wal = Wal::open(&path).unwrap();
        wal.append(&started(1)).unwrap();
        // dropped without flush
    }

    let wal = Wal::open(&path).unwrap();
    assert_eq!(wal.write_seq(), 0);
    assert!(wal.entries_after(0).unwrap().is_empty());
}

#[test]
fn corrupt_tail_is_rotated_and_valid_prefix_kept() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("events.wal");

    {
        let mut wal = Wal::open(&path).unwrap();
        wal.append(&started(1)).unwrap();
        wal.append(&started(2)).unwrap();
        wal.flush().unwrap();
    }

    // Simulate a torn write
    {
        let mut file = std::fs::OpenOptions::new()
            .append(true)
            .open(&path)
            .unwrap();
        file.write_all(b"{\"seq\":3,\"event\":{\"ty").unwrap();
    }

    let wal = Wal::open(&path).unwrap();
    assert_eq!(wal.write_seq(), 2);
    assert_eq!(wal.entries_after(0).unwrap().len(), 2);
    assert!(path.with_extension("bak").exists());
}

#[test]
fn truncate_through_drops_covered_entries() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("events.wal");

    let mut wal = Wal::open(&path).unwrap();
    for n in 1..=4 {
        wal.append(&started(n)).unwrap();
    }
    wal.truncate_through(2).unwrap();

    let entries = wal.entries_after(0).unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].seq, 3);

    // Appends continue from the old sequence
    assert_eq!(wal.append(&started(5)).unwrap(), 5);
}

#[test]
fn needs_flush_after_threshold() {
    let dir = tempfile::tempdir().unwrap();
    let mut wal = Wal::open(&dir.path().join("events.wal")).unwrap();

    wal.flush().unwrap();
    for n in 0..100 {
        wal.append(&started(n)).unwrap();
    }
    assert!(wal.needs_flush());
    wal.flush().unwrap();
    assert!(!wal.needs_flush());
}
