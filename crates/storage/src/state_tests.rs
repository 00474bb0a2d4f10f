// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use forge_core::test_support::build_request;
use forge_core::{BuildError, BuildResult, FailureCause, Stage, ToolchainInfo};

fn submitted(id: &str, partner: &str, at_ms: u64) -> Event {
    Event::JobSubmitted {
        id: JobId::new(id),
        request: build_request(partner, 0, at_ms),
        created_at_ms: at_ms,
    }
}

fn started(id: &str) -> Event {
    Event::JobStarted {
        id: JobId::new(id),
        started_at_ms: 10,
    }
}

fn completed(id: &str) -> Event {
    Event::JobCompleted {
        id: JobId::new(id),
        result: BuildResult {
            artifacts: vec![],
            duration_ms: 100,
            toolchain: ToolchainInfo::default(),
        },
        finished_at_ms: 110,
    }
}

#[test]
fn submitted_creates_queued_job() {
    let mut state = JobState::new();
    state.apply_event(&submitted("job-1", "acme", 1));

    let job = state.job(&JobId::new("job-1")).unwrap();
    assert_eq!(job.status, BuildStatus::Queued);
    assert_eq!(state.queued_jobs().len(), 1);
    assert_eq!(state.running_count(), 0);
}

#[test]
fn duplicate_submitted_is_ignored() {
    let mut state = JobState::new();
    state.apply_event(&submitted("job-1", "acme", 1));
    state.apply_event(&started("job-1"));
    // Replay of the same submission must not reset the job
    state.apply_event(&submitted("job-1", "acme", 1));

    assert_eq!(state.job(&JobId::new("job-1")).unwrap().status, BuildStatus::Running);
}

#[test]
fn full_lifecycle_to_completed() {
    let mut state = JobState::new();
    state.apply_event(&submitted("job-1", "acme", 1));
    state.apply_event(&started("job-1"));
    state.apply_event(&Event::JobProgress {
        id: JobId::new("job-1"),
        stage: Stage::Compile,
        progress: 60,
        message: "compiling".into(),
    });
    state.apply_event(&completed("job-1"));

    let job = state.job(&JobId::new("job-1")).unwrap();
    assert_eq!(job.status, BuildStatus::Completed);
    assert_eq!(job.progress, 100);
    assert!(job.result.is_some());
    assert_eq!(job.finished_at_ms, Some(110));
}

#[test]
fn terminal_state_is_sticky_under_replay() {
    let mut state = JobState::new();
    state.apply_event(&submitted("job-1", "acme", 1));
    state.apply_event(&started("job-1"));
    state.apply_event(&Event::JobCancelled {
        id: JobId::new("job-1"),
        finished_at_ms: 50,
    });

    // Stale events after the terminal transition are ignored
    state.apply_event(&started("job-1"));
    state.apply_event(&completed("job-1"));
    state.apply_event(&Event::JobProgress {
        id: JobId::new("job-1"),
        stage: Stage::Compile,
        progress: 99,
        message: "late".into(),
    });

    let job = state.job(&JobId::new("job-1")).unwrap();
    assert_eq!(job.status, BuildStatus::Cancelled);
    assert!(job.result.is_none());
    assert_ne!(job.progress, 99);
}

#[test]
fn failed_attaches_error() {
    let mut state = JobState::new();
    state.apply_event(&submitted("job-1", "acme", 1));
    state.apply_event(&started("job-1"));
    state.apply_event(&Event::JobFailed {
        id: JobId::new("job-1"),
        error: BuildError {
            stage: Stage::Compile,
            cause: FailureCause::Timeout,
            message: "wall clock exceeded".into(),
            log_tail: vec!["compiling module 7".into()],
        },
        finished_at_ms: 90,
    });

    let job = state.job(&JobId::new("job-1")).unwrap();
    assert_eq!(job.status, BuildStatus::Failed);
    let error = job.error.as_ref().unwrap();
    assert_eq!(error.cause, FailureCause::Timeout);
}

#[test]
fn events_for_unknown_jobs_are_ignored() {
    let mut state = JobState::new();
    state.apply_event(&started("ghost"));
    state.apply_event(&completed("ghost"));
    assert!(state.jobs.is_empty());
}

#[test]
fn list_filters_by_partner_and_status() {
    let mut state = JobState::new();
    state.apply_event(&submitted("job-1", "acme", 1));
    state.apply_event(&submitted("job-2", "acme", 2));
    state.apply_event(&submitted("job-3", "globex", 3));
    state.apply_event(&started("job-2"));

    let acme = JobFilter {
        partner_id: Some(PartnerId::new("acme")),
        status: None,
    };
    assert_eq!(state.list(&acme, Page::default()).total, 2);

    let acme_running = JobFilter {
        partner_id: Some(PartnerId::new("acme")),
        status: Some(BuildStatus::Running),
    };
    let page = state.list(&acme_running, Page::default());
    assert_eq!(page.total, 1);
    assert_eq!(page.jobs[0].id, JobId::new("job-2"));
}

#[test]
fn list_pages_newest_first() {
    let mut state = JobState::new();
    for n in 1..=5 {
        state.apply_event(&submitted(&format!("job-{n}"), "acme", n));
    }

    let first = state.list(
        &JobFilter::default(),
        Page {
            page: 1,
            per_page: 2,
        },
    );
    assert_eq!(first.total, 5);
    assert_eq!(first.jobs.len(), 2);
    assert_eq!(first.jobs[0].id, JobId::new("job-5"));
    assert_eq!(first.jobs[1].id, JobId::new("job-4"));

    let last = state.list(
        &JobFilter::default(),
        Page {
            page: 3,
            per_page: 2,
        },
    );
    assert_eq!(last.jobs.len(), 1);
    assert_eq!(last.jobs[0].id, JobId::new("job-1"));
}
