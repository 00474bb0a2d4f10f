// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Materialized job state from WAL replay.
//!
//! `apply_event` is the single place job status transitions happen. It
//! enforces the state machine: an event implying an illegal transition is
//! logged and ignored, so replaying a WAL with stale or duplicated entries
//! can never drive a job out of a terminal state.

use forge_core::{BuildJob, BuildStatus, Event, JobId, PartnerId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::warn;

/// Filter for job listings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partner_id: Option<PartnerId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<BuildStatus>,
}

impl JobFilter {
    fn matches(&self, job: &BuildJob) -> bool {
        if let Some(partner) = &self.partner_id {
            if &job.request.partner_id != partner {
                return false;
            }
        }
        if let Some(status) = self.status {
            if job.status != status {
                return false;
            }
        }
        true
    }
}

/// Pagination request. Pages are 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub page: usize,
    pub per_page: usize,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: 20,
        }
    }
}

/// Summary row for job listings (full logs and request omitted).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSummary {
    pub id: JobId,
    pub partner_id: PartnerId,
    pub app_name: String,
    pub status: BuildStatus,
    pub progress: u8,
    pub created_at_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at_ms: Option<u64>,
}

impl JobSummary {
    fn of(job: &BuildJob) -> Self {
        Self {
            id: job.id.clone(),
            partner_id: job.request.partner_id.clone(),
            app_name: job.request.app.app_name.clone(),
            status: job.status,
            progress: job.progress,
            created_at_ms: job.created_at_ms,
            finished_at_ms: job.finished_at_ms,
        }
    }
}

/// One page of job summaries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobPage {
    pub jobs: Vec<JobSummary>,
    pub total: usize,
    pub page: usize,
    pub per_page: usize,
}

/// All build jobs, materialized from event replay.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobState {
    pub jobs: HashMap<String, BuildJob>,
}

impl JobState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn job(&self, id: &JobId) -> Option<&BuildJob> {
        self.jobs.get(id.as_str())
    }

    /// Jobs currently in `Running`.
    pub fn running_count(&self) -> usize {
        self.jobs
            .values()
            .filter(|j| j.status == BuildStatus::Running)
            .count()
    }

    /// Jobs currently in `Queued`, unordered.
    pub fn queued_jobs(&self) -> Vec<&BuildJob> {
        self.jobs
            .values()
            .filter(|j| j.status == BuildStatus::Queued)
            .collect()
    }

    /// Filtered, paginated listing, newest submissions first.
    pub fn list(&self, filter: &JobFilter, page: Page) -> JobPage {
        let mut matched: Vec<&BuildJob> =
            self.jobs.values().filter(|j| filter.matches(j)).collect();
        matched.sort_by(|a, b| {
            b.created_at_ms
                .cmp(&a.created_at_ms)
                .then_with(|| b.id.as_str().cmp(a.id.as_str()))
        });

        let total = matched.len();
        let per_page = page.per_page.max(1);
        let start = page.page.saturating_sub(1).saturating_mul(per_page);
        let jobs = matched
            .into_iter()
            .skip(start)
            .take(per_page)
            .map(JobSummary::of)
            .collect();

        JobPage {
            jobs,
            total,
            page: page.page.max(1),
            per_page,
        }
    }

    /// Apply an event, enforcing the job status state machine.
    pub fn apply_event(&mut self, event: &Event) {
        match event {
            Event::JobSubmitted {
                id,
                request,
                created_at_ms,
            } => {
                if self.jobs.contains_key(id.as_str()) {
                    warn!(job_id = %id, "duplicate job:submitted ignored");
                    return;
                }
                self.jobs.insert(
                    id.as_str().to_string(),
                    BuildJob::new_with_epoch_ms(id.clone(), request.clone(), *created_at_ms),
                );
            }

            Event::JobStarted { id, started_at_ms } => {
                self.with_transition(id, BuildStatus::Running, |job| {
                    job.started_at_ms = Some(*started_at_ms);
                });
            }

            Event::JobProgress {
                id,
                stage,
                progress,
                ..
            } => {
                if let Some(job) = self.jobs.get_mut(id.as_str()) {
                    if !job.is_terminal() {
                        job.record_progress(*stage, *progress);
                    }
                }
            }

            Event::JobLog { id, entry } => {
                if let Some(job) = self.jobs.get_mut(id.as_str()) {
                    job.push_log(entry.clone());
                }
            }

            // Marker only -- the terminal transition arrives with job:cancelled
            Event::JobCancelRequested { .. } => {}

            Event::JobCompleted {
                id,
                result,
                finished_at_ms,
            } => {
                self.with_transition(id, BuildStatus::Completed, |job| {
                    job.progress = 100;
                    job.result = Some(result.clone());
                    job.finished_at_ms = Some(*finished_at_ms);
                });
            }

            Event::JobFailed {
                id,
                error,
                finished_at_ms,
            } => {
                self.with_transition(id, BuildStatus::Failed, |job| {
                    job.error = Some(error.clone());
                    job.finished_at_ms = Some(*finished_at_ms);
                });
            }

            Event::JobCancelled { id, finished_at_ms } => {
                self.with_transition(id, BuildStatus::Cancelled, |job| {
                    job.finished_at_ms = Some(*finished_at_ms);
                });
            }
        }
    }

    /// Transition a job, applying `update` only when the transition is legal.
    fn with_transition(
        &mut self,
        id: &JobId,
        next: BuildStatus,
        update: impl FnOnce(&mut BuildJob),
    ) {
        match self.jobs.get_mut(id.as_str()) {
            Some(job) => {
                let from = job.status;
                if job.transition(next) {
                    update(job);
                } else {
                    warn!(job_id = %id, %from, to = %next, "illegal status transition ignored");
                }
            }
            None => warn!(job_id = %id, to = %next, "event for unknown job ignored"),
        }
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
