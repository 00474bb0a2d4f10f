// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Storage layer for Forge: durable job store and content-addressed
//! artifact store.

mod artifact;
mod snapshot;
mod state;
mod store;
mod wal;

pub use artifact::{ArtifactError, ArtifactRecord, ArtifactStore, StoredArtifact};
pub use snapshot::{Snapshot, SnapshotError};
pub use state::{JobFilter, JobPage, JobState, JobSummary, Page};
pub use store::{JobStore, StoreError};
pub use wal::{Wal, WalEntry, WalError};
