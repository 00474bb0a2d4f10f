// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! IPC protocol between the daemon and its clients.
//!
//! Wire format: 4-byte length prefix (big-endian) + JSON payload.

use forge_core::{
    ArtifactKind, BuildJob, BuildRequest, BuildStatus, JobId, JobUpdate, LogEntry, PartnerId,
};
use forge_engine::CancelOutcome;
use forge_storage::JobPage;
use serde::{Deserialize, Serialize};

#[path = "protocol_wire.rs"]
pub mod wire;
pub use wire::{ProtocolError, DEFAULT_TIMEOUT, MAX_MESSAGE_SIZE, PROTOCOL_VERSION};

/// Request from a client to the daemon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Request {
    /// Health check ping.
    Ping,

    /// Version handshake.
    Hello { version: String },

    /// Admit a build request.
    Submit { request: BuildRequest },

    /// Full record of one job.
    Status { id: JobId },

    /// Build log of one job, optionally only the last `tail` entries.
    Logs {
        id: JobId,
        #[serde(default)]
        tail: Option<usize>,
    },

    /// Filtered, paginated job listing.
    List {
        #[serde(default)]
        partner_id: Option<PartnerId>,
        #[serde(default)]
        status: Option<BuildStatus>,
        #[serde(default)]
        page: Option<usize>,
        #[serde(default)]
        per_page: Option<usize>,
    },

    /// Cancel a job wherever it currently is.
    Cancel { id: JobId },

    /// Stream live updates for a job until it retires.
    Subscribe { id: JobId },

    /// Fetch artifact bytes by retrieval reference.
    Artifact { reference: String },

    /// Request daemon shutdown.
    Shutdown,
}

/// How a cancel request landed, on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelResult {
    /// Still queued; now terminal, will never run.
    Cancelled,
    /// Running; signalled, terminal state follows.
    Requested,
    NotFound,
    AlreadyTerminal,
}

impl From<CancelOutcome> for CancelResult {
    fn from(outcome: CancelOutcome) -> Self {
        match outcome {
            CancelOutcome::Cancelled => CancelResult::Cancelled,
            CancelOutcome::Requested => CancelResult::Requested,
            CancelOutcome::NotFound => CancelResult::NotFound,
            CancelOutcome::AlreadyTerminal => CancelResult::AlreadyTerminal,
        }
    }
}

/// Response from the daemon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Response {
    Pong,

    Hello { version: String },

    /// The job id assigned to an admitted request.
    Submitted { id: JobId },

    /// Full job record.
    Job { job: Box<BuildJob> },

    /// Build log entries, oldest first.
    Logs { id: JobId, entries: Vec<LogEntry> },

    /// One page of job summaries.
    Jobs { page: JobPage },

    Cancel { result: CancelResult },

    /// One live update on a subscription stream.
    Update { update: JobUpdate },

    /// End of a subscription stream.
    End,

    /// Artifact content.
    Artifact {
        name: String,
        kind: ArtifactKind,
        bytes: Vec<u8>,
    },

    ShuttingDown,

    Error { message: String },
}

impl Response {
    pub fn error(message: impl Into<String>) -> Self {
        Response::Error {
            message: message.into(),
        }
    }
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;
