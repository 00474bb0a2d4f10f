// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Events recording build job state transitions.
//!
//! Events are the unit of durability (the job store's WAL is a sequence of
//! these) and the unit of live fan-out (the status hub publishes the
//! [`JobUpdate`] projection of them). Serializes with
//! `{"type": "job:name", ...fields}` format.

use crate::id::JobId;
use crate::job::{BuildError, BuildJob, BuildResult, BuildStatus, LogEntry};
use crate::request::BuildRequest;
use crate::stage::Stage;
use serde::{Deserialize, Serialize};

/// Events that drive job state transitions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    /// A request was admitted and a job created in `Queued`.
    #[serde(rename = "job:submitted")]
    JobSubmitted {
        id: JobId,
        request: BuildRequest,
        #[serde(default)]
        created_at_ms: u64,
    },

    /// The dispatcher handed the job to an executor.
    #[serde(rename = "job:started")]
    JobStarted {
        id: JobId,
        #[serde(default)]
        started_at_ms: u64,
    },

    /// The executor finished (or entered) a stage.
    #[serde(rename = "job:progress")]
    JobProgress {
        id: JobId,
        stage: Stage,
        progress: u8,
        message: String,
    },

    /// A build log line.
    #[serde(rename = "job:log")]
    JobLog { id: JobId, entry: LogEntry },

    /// Cooperative cancellation was requested for a running job.
    /// The terminal `job:cancelled` follows only after executor teardown.
    #[serde(rename = "job:cancel-requested")]
    JobCancelRequested { id: JobId },

    #[serde(rename = "job:completed")]
    JobCompleted {
        id: JobId,
        result: BuildResult,
        #[serde(default)]
        finished_at_ms: u64,
    },

    #[serde(rename = "job:failed")]
    JobFailed {
        id: JobId,
        error: BuildError,
        #[serde(default)]
        finished_at_ms: u64,
    },

    #[serde(rename = "job:cancelled")]
    JobCancelled {
        id: JobId,
        #[serde(default)]
        finished_at_ms: u64,
    },
}

impl Event {
    /// The job this event belongs to.
    pub fn job_id(&self) -> &JobId {
        match self {
            Event::JobSubmitted { id, .. }
            | Event::JobStarted { id, .. }
            | Event::JobProgress { id, .. }
            | Event::JobLog { id, .. }
            | Event::JobCancelRequested { id }
            | Event::JobCompleted { id, .. }
            | Event::JobFailed { id, .. }
            | Event::JobCancelled { id, .. } => id,
        }
    }

    /// Event name for logging (matches the serde tag).
    pub fn name(&self) -> &'static str {
        match self {
            Event::JobSubmitted { .. } => "job:submitted",
            Event::JobStarted { .. } => "job:started",
            Event::JobProgress { .. } => "job:progress",
            Event::JobLog { .. } => "job:log",
            Event::JobCancelRequested { .. } => "job:cancel-requested",
            Event::JobCompleted { .. } => "job:completed",
            Event::JobFailed { .. } => "job:failed",
            Event::JobCancelled { .. } => "job:cancelled",
        }
    }

    /// Whether this event puts the job in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Event::JobCompleted { .. } | Event::JobFailed { .. } | Event::JobCancelled { .. }
        )
    }
}

/// Live progress message delivered to subscribers.
///
/// Shaped for the wire: `{ job_id, status, progress, stage, message, error? }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobUpdate {
    pub job_id: JobId,
    pub status: BuildStatus,
    pub progress: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<Stage>,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<BuildError>,
}

impl JobUpdate {
    /// Snapshot of a job's current state (for late subscribers).
    pub fn snapshot(job: &BuildJob, message: impl Into<String>) -> Self {
        Self {
            job_id: job.id.clone(),
            status: job.status,
            progress: job.progress,
            stage: job.stage,
            message: message.into(),
            error: job.error.clone(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
