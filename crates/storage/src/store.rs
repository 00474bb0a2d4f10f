// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable job store: WAL + snapshot + materialized state.
//!
//! The store is the authoritative record of every build job. Writers append
//! events; the materialized [`JobState`] is updated in the same call, so
//! readers always see the state implied by everything recorded so far.
//! Recovery is snapshot load + replay of newer WAL entries.

use crate::{JobFilter, JobPage, JobState, Page, Snapshot, SnapshotError, Wal, WalError};
use forge_core::{BuildJob, Event, JobId};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

const WAL_FILE: &str = "events.wal";
const SNAPSHOT_FILE: &str = "jobs.snapshot";

/// Errors from job store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("wal error: {0}")]
    Wal(#[from] WalError),
    #[error("snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),
}

/// Durable, crash-survivable record of every build job.
///
/// Not internally synchronized; callers wrap it in their own lock. All
/// mutations to a given job arrive from its single writer (queue or the
/// executor currently running it), so the lock only guards the map itself.
pub struct JobStore {
    wal: Wal,
    state: JobState,
    snapshot_path: PathBuf,
    /// WAL sequence covered by the last durable snapshot
    snapshot_seq: u64,
}

impl JobStore {
    /// Open the store in `dir`, recovering state from snapshot + WAL replay.
    pub fn open(dir: &Path) -> Result<Self, StoreError> {
        let snapshot_path = dir.join(SNAPSHOT_FILE);
        let wal = Wal::open(&dir.join(WAL_FILE))?;

        let (mut state, snapshot_seq) = match Snapshot::load(&snapshot_path)? {
            Some(snapshot) => (snapshot.state, snapshot.seq),
            None => (JobState::new(), 0),
        };

        let replayed = wal.entries_after(snapshot_seq)?;
        let replay_count = replayed.len();
        for entry in replayed {
            state.apply_event(&entry.event);
        }

        if snapshot_seq > 0 || replay_count > 0 {
            info!(
                snapshot_seq,
                replayed = replay_count,
                jobs = state.jobs.len(),
                "job store recovered",
            );
        }

        Ok(Self {
            wal,
            state,
            snapshot_path,
            snapshot_seq,
        })
    }

    /// Record an event: append to the WAL and apply to the state.
    ///
    /// Terminal events are flushed to disk before returning; non-terminal
    /// events ride the group-commit buffer.
    pub fn record(&mut self, event: &Event) -> Result<u64, StoreError> {
        let seq = self.wal.append(event)?;
        self.state.apply_event(event);
        if event.is_terminal() || self.wal.needs_flush() {
            self.wal.flush()?;
        }
        Ok(seq)
    }

    /// Flush any buffered WAL entries.
    pub fn flush(&mut self) -> Result<(), StoreError> {
        self.wal.flush()?;
        Ok(())
    }

    pub fn job(&self, id: &JobId) -> Option<&BuildJob> {
        self.state.job(id)
    }

    pub fn list(&self, filter: &JobFilter, page: Page) -> JobPage {
        self.state.list(filter, page)
    }

    pub fn state(&self) -> &JobState {
        &self.state
    }

    /// Current WAL write sequence.
    pub fn seq(&self) -> u64 {
        self.wal.write_seq()
    }

    /// Take a durable snapshot and truncate the WAL through it.
    ///
    /// Snapshot durability (including directory fsync) strictly precedes
    /// truncation, so a crash between the two only costs replay time.
    pub fn checkpoint(&mut self) -> Result<u64, StoreError> {
        self.wal.flush()?;
        let seq = self.wal.write_seq();
        if seq == self.snapshot_seq {
            return Ok(seq);
        }

        Snapshot::new(seq, self.state.clone()).save(&self.snapshot_path)?;
        self.wal.truncate_through(seq)?;
        self.snapshot_seq = seq;

        info!(seq, jobs = self.state.jobs.len(), "checkpoint complete");
        Ok(seq)
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
