// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Build job record and status state machine.

use crate::clock::Clock;
use crate::id::JobId;
use crate::request::BuildRequest;
use crate::stage::Stage;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Finite status of a build job.
///
/// `Queued → Running → {Completed | Failed | Cancelled}`, with the shortcut
/// `Queued → Cancelled`. Terminal states admit no further transitions; a
/// failed build can only be resubmitted as a new job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildStatus {
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl BuildStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BuildStatus::Completed | BuildStatus::Failed | BuildStatus::Cancelled
        )
    }

    /// Whether `next` is a legal successor of this status.
    pub fn can_transition_to(&self, next: BuildStatus) -> bool {
        use BuildStatus::*;
        matches!(
            (self, next),
            (Queued, Running)
                | (Queued, Cancelled)
                | (Running, Completed)
                | (Running, Failed)
                | (Running, Cancelled)
        )
    }
}

impl fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildStatus::Queued => write!(f, "queued"),
            BuildStatus::Running => write!(f, "running"),
            BuildStatus::Completed => write!(f, "completed"),
            BuildStatus::Failed => write!(f, "failed"),
            BuildStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Severity of a build log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Debug,
    Info,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Debug => write!(f, "debug"),
            Severity::Info => write!(f, "info"),
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
        }
    }
}

/// One ordered log line attached to a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub ts_ms: u64,
    pub severity: Severity,
    pub stage: Stage,
    pub message: String,
}

/// Classification of a terminal failure.
///
/// Cancellation is deliberately absent: a cancelled job is not a failed job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCause {
    /// The build tooling itself failed (compile error, signing error, ...).
    Tool,
    /// The hard wall-clock timeout expired.
    Timeout,
    /// Infrastructure fault (workspace, store, daemon restart).
    Infra,
}

impl fmt::Display for FailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureCause::Tool => write!(f, "tool"),
            FailureCause::Timeout => write!(f, "timeout"),
            FailureCause::Infra => write!(f, "infra"),
        }
    }
}

/// Structured terminal error attached to a failed job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildError {
    pub stage: Stage,
    pub cause: FailureCause,
    pub message: String,
    /// Captured tail of the build log at the point of failure.
    #[serde(default)]
    pub log_tail: Vec<String>,
}

/// Kind of a produced artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// Installable binary (unsigned or signed).
    Binary,
    /// Store distribution bundle.
    Bundle,
    /// Obfuscation mapping file.
    Mapping,
    /// Machine-readable build report.
    Report,
}

/// Metadata for one stored artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactMeta {
    pub name: String,
    pub kind: ArtifactKind,
    pub size: u64,
    /// Hex sha-256 of the content.
    pub checksum: String,
    /// Opaque retrieval reference issued by the artifact store.
    pub reference: String,
}

/// Toolchain versions a build ran with.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolchainInfo {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub sdk: Option<String>,
}

/// Result attached on completion (and, partially, on failure).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildResult {
    pub artifacts: Vec<ArtifactMeta>,
    pub duration_ms: u64,
    pub toolchain: ToolchainInfo,
}

/// Mutable record of one accepted build request.
///
/// Single-writer: while `Queued` only the admission queue mutates it, while
/// `Running` only the executor driving it does. Everything else reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildJob {
    pub id: JobId,
    pub request: BuildRequest,
    pub status: BuildStatus,
    /// 0–100, monotone non-decreasing within a run.
    pub progress: u8,
    /// Stage most recently reported by the executor.
    #[serde(default)]
    pub stage: Option<Stage>,
    #[serde(default)]
    pub logs: Vec<LogEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<BuildError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<BuildResult>,
    pub created_at_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at_ms: Option<u64>,
}

impl BuildJob {
    /// Create a freshly admitted job in `Queued`.
    pub fn new(id: JobId, request: BuildRequest, clock: &impl Clock) -> Self {
        Self::new_with_epoch_ms(id, request, clock.epoch_ms())
    }

    /// Create a job with an explicit creation time (for WAL replay).
    pub fn new_with_epoch_ms(id: JobId, request: BuildRequest, epoch_ms: u64) -> Self {
        Self {
            id,
            request,
            status: BuildStatus::Queued,
            progress: 0,
            stage: None,
            logs: Vec::new(),
            error: None,
            result: None,
            created_at_ms: epoch_ms,
            started_at_ms: None,
            finished_at_ms: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Apply a status transition if the state machine allows it.
    ///
    /// Returns false (and leaves the job untouched) for illegal transitions.
    pub fn transition(&mut self, next: BuildStatus) -> bool {
        if !self.status.can_transition_to(next) {
            return false;
        }
        self.status = next;
        true
    }

    /// Record executor progress, keeping the value monotone within the run.
    pub fn record_progress(&mut self, stage: Stage, progress: u8) {
        self.stage = Some(stage);
        self.progress = self.progress.max(progress.min(100));
    }

    /// Append a log entry.
    pub fn push_log(&mut self, entry: LogEntry) {
        self.logs.push(entry);
    }

    /// Last `n` log messages, oldest first. Used for failure log tails.
    pub fn log_tail(&self, n: usize) -> Vec<String> {
        let skip = self.logs.len().saturating_sub(n);
        self.logs[skip..].iter().map(|l| l.message.clone()).collect()
    }
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;
