// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon lifecycle management: startup, recovery, shutdown.

use std::fs::File;
use std::io::Write as _;
use std::sync::Arc;
use std::time::{Duration, Instant};

use fs2::FileExt as _;
use forge_core::{
    BuildError, BuildStatus, Clock, Event, FailureCause, JobId, Stage, SystemClock,
};
use forge_engine::{
    sweep_stale, AdmissionQueue, BuildExecutor, ExecutorConfig, HubConfig, QueueConfig,
    ShellToolchain, StatusHub, StoreHandle,
};
use forge_storage::{ArtifactStore, JobStore, StoreError};
use parking_lot::Mutex;
use thiserror::Error;
use tokio::net::UnixListener;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::Config;

/// Queue with the daemon's concrete toolchain and clock.
pub type DaemonQueue = AdmissionQueue<ShellToolchain, SystemClock>;

const LOG_TAIL_LINES: usize = 10;
const FLUSH_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("failed to acquire lock: daemon already running?")]
    LockFailed(#[source] std::io::Error),

    #[error("failed to bind socket at {0}: {1}")]
    BindFailed(std::path::PathBuf, std::io::Error),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Live daemon state shared with the listener.
pub struct Daemon {
    pub config: Config,
    // NOTE(lifetime): held to maintain the exclusive file lock; released on drop
    #[allow(dead_code)]
    lock_file: File,
    pub store: StoreHandle,
    pub artifacts: Arc<ArtifactStore>,
    pub hub: StatusHub,
    pub queue: DaemonQueue,
    pub start_time: Instant,
}

/// Result of daemon startup.
pub struct StartupResult {
    pub daemon: Daemon,
    /// Unix socket, ready to accept; spawned as the listener task.
    pub listener: UnixListener,
    /// The admission queue's dispatcher task.
    pub dispatcher: JoinHandle<()>,
}

/// What recovery found in the store.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Recovered {
    /// Jobs that were `Running` when the previous process died, now failed.
    pub failed: Vec<JobId>,
    /// Jobs still `Queued`, to be re-admitted.
    pub queued: Vec<JobId>,
}

/// Start the daemon: lock, recover, sweep, bind.
pub async fn startup(config: &Config) -> Result<StartupResult, LifecycleError> {
    for dir in [
        &config.state_dir,
        &config.jobs_dir,
        &config.builds_dir,
        &config.artifacts_dir,
    ] {
        std::fs::create_dir_all(dir)?;
    }

    // Lock first; everything after this is ours alone. Open without
    // truncating so a losing race does not wipe the winner's PID.
    let mut lock_file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(&config.lock_path)?;
    lock_file
        .try_lock_exclusive()
        .map_err(LifecycleError::LockFailed)?;
    lock_file.set_len(0)?;
    writeln!(lock_file, "{}", std::process::id())?;

    let clock = SystemClock;
    let mut job_store = JobStore::open(&config.jobs_dir)?;
    let recovered = recover(&mut job_store, &clock)?;
    if !recovered.failed.is_empty() || !recovered.queued.is_empty() {
        info!(
            failed = recovered.failed.len(),
            queued = recovered.queued.len(),
            "recovered jobs from previous run",
        );
    }
    let store: StoreHandle = Arc::new(Mutex::new(job_store));

    let swept = sweep_stale(&config.builds_dir)?;
    if swept > 0 {
        info!(swept, "removed stale build workspaces");
    }

    let artifacts = Arc::new(ArtifactStore::new(
        &config.artifacts_dir,
        config.artifact_ttl.map(|ttl| ttl.as_millis() as u64),
    ));
    match artifacts.sweep_expired() {
        Ok(0) => {}
        Ok(removed) => info!(removed, "swept expired artifact references"),
        Err(e) => warn!(error = %e, "artifact sweep failed"),
    }

    let hub = StatusHub::new(HubConfig {
        queue_depth: config.subscriber_queue_depth,
        teardown_grace: config.teardown_grace,
    });
    let executor = BuildExecutor::new(
        Arc::clone(&store),
        Arc::clone(&artifacts),
        hub.clone(),
        Arc::new(ShellToolchain::new(
            config.toolchain_commands.clone(),
            config.toolchain_info.clone(),
        )),
        clock,
        ExecutorConfig {
            builds_dir: config.builds_dir.clone(),
            build_timeout: config.build_timeout,
            compile_checkpoint: config.compile_checkpoint,
        },
    );
    let queue = AdmissionQueue::new(
        Arc::clone(&store),
        hub.clone(),
        executor,
        clock,
        QueueConfig {
            max_concurrent: config.max_concurrent_builds,
        },
    );
    for id in &recovered.queued {
        queue.readmit(id);
    }
    let dispatcher = queue.spawn_dispatcher();

    // A leftover socket file from a dead daemon would make bind fail.
    if config.socket_path.exists() {
        std::fs::remove_file(&config.socket_path)?;
    }
    let listener = UnixListener::bind(&config.socket_path)
        .map_err(|e| LifecycleError::BindFailed(config.socket_path.clone(), e))?;

    Ok(StartupResult {
        daemon: Daemon {
            config: config.clone(),
            lock_file,
            store,
            artifacts,
            hub,
            queue,
            start_time: Instant::now(),
        },
        listener,
        dispatcher,
    })
}

/// Reconcile store state with reality after a restart.
///
/// A job recorded as `Running` cannot still be running: its executor died
/// with the previous process, so it fails with an infra cause. `Queued` jobs
/// survive as-is and are re-admitted by the caller.
pub fn recover(store: &mut JobStore, clock: &impl Clock) -> Result<Recovered, StoreError> {
    let mut recovered = Recovered::default();

    let jobs: Vec<(JobId, BuildStatus, Option<Stage>, Vec<String>)> = store
        .state()
        .jobs
        .values()
        .filter(|job| !job.is_terminal())
        .map(|job| {
            (
                job.id.clone(),
                job.status,
                job.stage,
                job.log_tail(LOG_TAIL_LINES),
            )
        })
        .collect();

    for (id, status, stage, log_tail) in jobs {
        match status {
            BuildStatus::Running => {
                store.record(&Event::JobFailed {
                    id: id.clone(),
                    error: BuildError {
                        stage: stage.unwrap_or(Stage::Init),
                        cause: FailureCause::Infra,
                        message: "daemon restarted while the build was running".to_string(),
                        log_tail,
                    },
                    finished_at_ms: clock.epoch_ms(),
                })?;
                recovered.failed.push(id);
            }
            BuildStatus::Queued => recovered.queued.push(id),
            _ => {}
        }
    }

    // Oldest first, so re-admission preserves the original order.
    recovered.queued.sort_by_key(|id| {
        store
            .job(id)
            .map(|job| (job.created_at_ms, job.id.as_str().to_string()))
    });
    Ok(recovered)
}

/// Periodic snapshot + WAL truncation.
pub fn spawn_checkpoint(store: StoreHandle, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await; // immediate first tick
        loop {
            ticker.tick().await;
            let store = Arc::clone(&store);
            let result = tokio::task::spawn_blocking(move || store.lock().checkpoint()).await;
            match result {
                Ok(Ok(seq)) => debug!(seq, "checkpoint complete"),
                Ok(Err(e)) => warn!(error = %e, "checkpoint failed"),
                Err(e) => warn!(error = %e, "checkpoint task panicked"),
            }
        }
    })
}

/// Group-commit flush loop (~10ms durability window for non-terminal events).
pub fn spawn_flush(store: StoreHandle) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(FLUSH_INTERVAL);
        loop {
            ticker.tick().await;
            if let Err(e) = store.lock().flush() {
                warn!(error = %e, "wal flush failed");
            }
        }
    })
}

/// Graceful shutdown: stop admitting, close sinks, persist, clean up files.
pub fn shutdown(daemon: &Daemon) {
    daemon.queue.shutdown();
    daemon.hub.shutdown();

    {
        let mut store = daemon.store.lock();
        if let Err(e) = store.checkpoint() {
            warn!(error = %e, "final checkpoint failed");
        }
    }

    let _ = std::fs::remove_file(&daemon.config.socket_path);
    let _ = std::fs::remove_file(&daemon.config.lock_path);
    info!("daemon stopped");
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
