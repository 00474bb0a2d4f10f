// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::test_support::{build_request, queued_job};
use crate::FakeClock;
use yare::parameterized;

#[test]
fn new_job_is_queued() {
    let clock = FakeClock::at(42_000);
    let job = BuildJob::new(JobId::new("job-1"), build_request("acme", 0, 42_000), &clock);

    assert_eq!(job.status, BuildStatus::Queued);
    assert_eq!(job.progress, 0);
    assert_eq!(job.created_at_ms, 42_000);
    assert!(job.stage.is_none());
    assert!(!job.is_terminal());
}

#[parameterized(
    queued_to_running = { BuildStatus::Queued, BuildStatus::Running, true },
    queued_to_cancelled = { BuildStatus::Queued, BuildStatus::Cancelled, true },
    queued_to_completed = { BuildStatus::Queued, BuildStatus::Completed, false },
    queued_to_failed = { BuildStatus::Queued, BuildStatus::Failed, false },
    running_to_completed = { BuildStatus::Running, BuildStatus::Completed, true },
    running_to_failed = { BuildStatus::Running, BuildStatus::Failed, true },
    running_to_cancelled = { BuildStatus::Running, BuildStatus::Cancelled, true },
    running_to_queued = { BuildStatus::Running, BuildStatus::Queued, false },
    completed_to_running = { BuildStatus::Completed, BuildStatus::Running, false },
    failed_to_running = { BuildStatus::Failed, BuildStatus::Running, false },
    cancelled_to_running = { BuildStatus::Cancelled, BuildStatus::Running, false },
    failed_to_queued = { BuildStatus::Failed, BuildStatus::Queued, false },
)]
fn status_transitions(from: BuildStatus, to: BuildStatus, legal: bool) {
    assert_eq!(from.can_transition_to(to), legal);
}

#[test]
fn transition_rejects_illegal_and_leaves_status() {
    let mut job = queued_job("job-1", "acme");
    assert!(!job.transition(BuildStatus::Completed));
    assert_eq!(job.status, BuildStatus::Queued);

    assert!(job.transition(BuildStatus::Running));
    assert!(job.transition(BuildStatus::Completed));
    assert!(job.is_terminal());

    // Terminal is sticky
    assert!(!job.transition(BuildStatus::Running));
    assert!(!job.transition(BuildStatus::Cancelled));
    assert_eq!(job.status, BuildStatus::Completed);
}

#[test]
fn progress_never_decreases() {
    let mut job = queued_job("job-1", "acme");
    job.record_progress(Stage::Branding, 15);
    assert_eq!(job.progress, 15);

    // A stale lower value does not rewind
    job.record_progress(Stage::Branding, 10);
    assert_eq!(job.progress, 15);

    job.record_progress(Stage::Compile, 75);
    assert_eq!(job.progress, 75);
    assert_eq!(job.stage, Some(Stage::Compile));

    // Values above 100 are clamped
    job.record_progress(Stage::Verify, 200);
    assert_eq!(job.progress, 100);
}

#[test]
fn log_tail_returns_last_entries() {
    let mut job = queued_job("job-1", "acme");
    for i in 0..5 {
        job.push_log(LogEntry {
            ts_ms: i,
            severity: Severity::Info,
            stage: Stage::Compile,
            message: format!("line {i}"),
        });
    }

    assert_eq!(job.log_tail(2), vec!["line 3", "line 4"]);
    assert_eq!(job.log_tail(10).len(), 5);
}

#[test]
fn status_display() {
    assert_eq!(BuildStatus::Queued.to_string(), "queued");
    assert_eq!(BuildStatus::Cancelled.to_string(), "cancelled");
    assert_eq!(FailureCause::Timeout.to_string(), "timeout");
}
