// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Build executor: drives one job through the stage pipeline.
//!
//! Every run ends in exactly one terminal event, written through a single
//! retire path that also tears down the workspace. Cancellation is observed
//! at stage boundaries and at checkpoints during compile; the hard wall-clock
//! timeout wraps the whole pipeline.

use crate::cancel::CancelToken;
use crate::stages::{self, PackagedFile, StageFailure};
use crate::toolchain::Toolchain;
use crate::workspace::Workspace;
use crate::StatusHub;
use forge_core::{
    ArtifactMeta, BuildError, BuildJob, BuildResult, BuildStatus, Clock, Event, FailureCause,
    JobUpdate, LogEntry, Severity, Stage,
};
use forge_storage::{ArtifactStore, JobStore, StoreError};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn, Instrument};

/// Shared handle to the job store. The lock guards the map; each job has a
/// single writer at any time.
pub type StoreHandle = Arc<Mutex<JobStore>>;

/// Lines of build log carried on a failure.
const LOG_TAIL_LINES: usize = 10;

const RECORD_RETRIES: u32 = 5;
const RECORD_BACKOFF: Duration = Duration::from_millis(50);

/// Record an event, retrying with backoff on store errors.
///
/// Used for events that must not be lost (terminal transitions, job start).
/// A final failure is returned to the caller, which can only log it; by then
/// the in-memory state has already moved on.
pub async fn record_durable(store: &StoreHandle, event: &Event) -> Result<u64, StoreError> {
    let mut backoff = RECORD_BACKOFF;
    let mut attempt = 1;
    loop {
        let result = store.lock().record(event);
        match result {
            Ok(seq) => return Ok(seq),
            Err(e) if attempt < RECORD_RETRIES => {
                warn!(
                    event = event.name(),
                    attempt,
                    error = %e,
                    "event record failed, retrying",
                );
                tokio::time::sleep(backoff).await;
                backoff *= 2;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Executor tuning.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Root under which per-job workspaces are created.
    pub builds_dir: PathBuf,
    /// Hard wall-clock cap for a whole run.
    pub build_timeout: Duration,
    /// Interval between cancellation/progress checkpoints during compile.
    pub compile_checkpoint: Duration,
}

impl ExecutorConfig {
    pub fn new(builds_dir: impl Into<PathBuf>) -> Self {
        Self {
            builds_dir: builds_dir.into(),
            build_timeout: Duration::from_secs(30 * 60),
            compile_checkpoint: Duration::from_millis(500),
        }
    }
}

enum StageAbort {
    Cancelled { stage: Stage },
    Failed { stage: Stage, failure: StageFailure },
}

impl StageAbort {
    fn failed(stage: Stage, failure: impl Into<StageFailure>) -> Self {
        StageAbort::Failed {
            stage,
            failure: failure.into(),
        }
    }
}

enum Outcome {
    Completed(Vec<ArtifactMeta>),
    Failed(BuildError),
    Cancelled,
}

/// Runs one admitted job to a terminal state.
pub struct BuildExecutor<T, C: Clock> {
    store: StoreHandle,
    artifacts: Arc<ArtifactStore<C>>,
    hub: StatusHub,
    toolchain: Arc<T>,
    clock: C,
    config: ExecutorConfig,
}

impl<T: Toolchain, C: Clock> BuildExecutor<T, C> {
    pub fn new(
        store: StoreHandle,
        artifacts: Arc<ArtifactStore<C>>,
        hub: StatusHub,
        toolchain: Arc<T>,
        clock: C,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            store,
            artifacts,
            hub,
            toolchain,
            clock,
            config,
        }
    }

    /// Drive `job` to a terminal state and return it.
    ///
    /// The job arrives already `Running` (the queue records `job:started`).
    /// Whatever happens inside, exactly one terminal event is recorded and
    /// the workspace is removed.
    pub async fn run(&self, job: BuildJob, cancel: CancelToken) -> BuildStatus {
        let span = tracing::info_span!("build", job = %job.id.short(8));
        self.run_to_completion(job, cancel).instrument(span).await
    }

    async fn run_to_completion(&self, mut job: BuildJob, cancel: CancelToken) -> BuildStatus {
        let started = self.clock.now();
        info!(partner = %job.request.partner_id, output = ?job.request.output, "build starting");

        let workspace = match Workspace::create(&self.config.builds_dir, &job.id) {
            Ok(ws) => ws,
            Err(e) => {
                let outcome = Outcome::Failed(BuildError {
                    stage: Stage::Init,
                    cause: FailureCause::Infra,
                    message: format!("workspace setup failed: {e}"),
                    log_tail: Vec::new(),
                });
                return self.retire(job, outcome, None, started).await;
            }
        };

        let timeout = self.config.build_timeout;
        let outcome =
            match tokio::time::timeout(timeout, self.run_stages(&mut job, &workspace, cancel))
                .await
            {
                Ok(Ok(artifacts)) => Outcome::Completed(artifacts),
                Ok(Err(StageAbort::Cancelled { stage })) => {
                    info!(stage = %stage, "build cancelled");
                    Outcome::Cancelled
                }
                Ok(Err(StageAbort::Failed { stage, failure })) => Outcome::Failed(BuildError {
                    stage,
                    cause: failure.cause,
                    message: failure.message,
                    log_tail: job.log_tail(LOG_TAIL_LINES),
                }),
                Err(_elapsed) => Outcome::Failed(BuildError {
                    stage: job.stage.unwrap_or(Stage::Init),
                    cause: FailureCause::Timeout,
                    message: format!(
                        "build exceeded the {}s wall-clock cap",
                        timeout.as_secs()
                    ),
                    log_tail: job.log_tail(LOG_TAIL_LINES),
                }),
            };

        self.retire(job, outcome, Some(workspace), started).await
    }

    async fn run_stages(
        &self,
        job: &mut BuildJob,
        ws: &Workspace,
        mut cancel: CancelToken,
    ) -> Result<Vec<ArtifactMeta>, StageAbort> {
        let mut binary: Option<PathBuf> = None;
        let mut mapping: Option<PathBuf> = None;
        let mut bundle: Option<PathBuf> = None;
        let mut packaged: Vec<PackagedFile> = Vec::new();
        let mut artifacts: Vec<ArtifactMeta> = Vec::new();

        for stage in Stage::SEQUENCE {
            if cancel.is_cancelled() {
                return Err(StageAbort::Cancelled { stage });
            }
            self.enter_stage(job, stage);

            match stage {
                Stage::Init => stages::init_workspace(ws, &job.request)
                    .map_err(|f| StageAbort::failed(stage, f))?,
                Stage::Branding => stages::apply_branding(ws, &job.request.app)
                    .map_err(|f| StageAbort::failed(stage, f))?,
                Stage::Resources => stages::generate_resources(ws, &job.request.app)
                    .map_err(|f| StageAbort::failed(stage, f))?,
                Stage::Compile => {
                    let output = self.compile_with_checkpoints(job, ws, &mut cancel).await?;
                    binary = Some(output.binary);
                    mapping = output.mapping;
                }
                Stage::Sign => {
                    bundle = self.sign(job, ws, binary.as_deref()).await?;
                }
                Stage::Package => {
                    let Some(binary) = binary.as_deref() else {
                        return Err(StageAbort::failed(
                            stage,
                            StageFailure::infra("compile produced no binary to package"),
                        ));
                    };
                    packaged =
                        stages::package(ws, &job.request, binary, mapping.as_deref(), bundle.as_deref())
                            .map_err(|f| StageAbort::failed(stage, f))?;
                }
                Stage::Verify => {
                    artifacts = stages::verify(self.artifacts.as_ref(), &job.id, &packaged)
                        .map_err(|f| StageAbort::failed(stage, f))?;
                }
            }

            self.emit_progress(job, stage, stage.progress_done(), format!("{stage} complete"));
        }

        Ok(artifacts)
    }

    /// Compile through the toolchain, observing cancellation and emitting
    /// intra-stage progress at a bounded interval.
    async fn compile_with_checkpoints(
        &self,
        job: &mut BuildJob,
        ws: &Workspace,
        cancel: &mut CancelToken,
    ) -> Result<crate::CompileOutput, StageAbort> {
        let app = job.request.app.clone();
        let compile = self.toolchain.compile(ws.root(), &app);
        tokio::pin!(compile);

        let mut ticks: u32 = 0;
        loop {
            let checkpoint = tokio::time::sleep(self.config.compile_checkpoint);
            tokio::select! {
                result = &mut compile => {
                    return result.map_err(|e| StageAbort::failed(Stage::Compile, e));
                }
                _ = cancel.cancelled() => {
                    return Err(StageAbort::Cancelled { stage: Stage::Compile });
                }
                _ = checkpoint => {
                    ticks += 1;
                    // Creep through the compile band without ever claiming
                    // completion; real progress comes at stage exit.
                    let fraction = ticks as f32 / (ticks as f32 + 4.0);
                    let progress = Stage::Compile.progress_at(fraction);
                    self.emit_progress(job, Stage::Compile, progress, "compiling".to_string());
                }
            }
        }
    }

    async fn sign(
        &self,
        job: &mut BuildJob,
        ws: &Workspace,
        binary: Option<&std::path::Path>,
    ) -> Result<Option<PathBuf>, StageAbort> {
        if !job.request.output.wants_signing() {
            self.log(job, Stage::Sign, Severity::Info, "unsigned output, nothing to sign");
            return Ok(None);
        }

        let Some(signing) = job.request.app.signing.clone() else {
            return Err(StageAbort::failed(
                Stage::Sign,
                StageFailure::tool("signed bundle requested but no signing config present"),
            ));
        };
        let Some(binary) = binary else {
            return Err(StageAbort::failed(
                Stage::Sign,
                StageFailure::infra("compile produced no binary to sign"),
            ));
        };

        let bundle = self
            .toolchain
            .sign(ws.root(), binary, &signing)
            .await
            .map_err(|e| StageAbort::failed(Stage::Sign, e))?;
        Ok(Some(bundle))
    }

    fn enter_stage(&self, job: &mut BuildJob, stage: Stage) {
        self.log(job, stage, Severity::Info, format!("{stage} started"));
        self.emit_progress(job, stage, stage.offset(), format!("{stage} started"));
    }

    /// Record a progress event and publish the live update.
    ///
    /// The job copy is advanced through the same monotone guard the store
    /// applies, so the two views never diverge.
    fn emit_progress(&self, job: &mut BuildJob, stage: Stage, progress: u8, message: String) {
        job.record_progress(stage, progress);
        let event = Event::JobProgress {
            id: job.id.clone(),
            stage,
            progress: job.progress,
            message: message.clone(),
        };
        if let Err(e) = self.store.lock().record(&event) {
            warn!(stage = %stage, error = %e, "progress record failed");
        }
        self.hub.publish(&JobUpdate::snapshot(job, message));
    }

    fn log(&self, job: &mut BuildJob, stage: Stage, severity: Severity, message: impl Into<String>) {
        let entry = LogEntry {
            ts_ms: self.clock.epoch_ms(),
            severity,
            stage,
            message: message.into(),
        };
        job.push_log(entry.clone());
        let event = Event::JobLog {
            id: job.id.clone(),
            entry,
        };
        if let Err(e) = self.store.lock().record(&event) {
            warn!(stage = %stage, error = %e, "log record failed");
        }
    }

    /// The single exit path: tear down the workspace, record the terminal
    /// event durably, and publish the final update.
    async fn retire(
        &self,
        mut job: BuildJob,
        outcome: Outcome,
        workspace: Option<Workspace>,
        started: std::time::Instant,
    ) -> BuildStatus {
        if let Some(ws) = workspace {
            if let Err(e) = ws.teardown() {
                warn!(error = %e, "workspace teardown failed");
            }
        }

        let finished_at_ms = self.clock.epoch_ms();
        let duration_ms = self.clock.now().saturating_duration_since(started).as_millis() as u64;

        let (event, status, message) = match outcome {
            Outcome::Completed(artifacts) => {
                let result = BuildResult {
                    artifacts,
                    duration_ms,
                    toolchain: self.toolchain.info(),
                };
                job.result = Some(result.clone());
                info!(duration_ms, artifacts = result.artifacts.len(), "build completed");
                (
                    Event::JobCompleted {
                        id: job.id.clone(),
                        result,
                        finished_at_ms,
                    },
                    BuildStatus::Completed,
                    "build completed",
                )
            }
            Outcome::Failed(build_error) => {
                warn!(
                    stage = %build_error.stage,
                    cause = %build_error.cause,
                    error = %build_error.message,
                    "build failed",
                );
                job.error = Some(build_error.clone());
                (
                    Event::JobFailed {
                        id: job.id.clone(),
                        error: build_error,
                        finished_at_ms,
                    },
                    BuildStatus::Failed,
                    "build failed",
                )
            }
            Outcome::Cancelled => (
                Event::JobCancelled {
                    id: job.id.clone(),
                    finished_at_ms,
                },
                BuildStatus::Cancelled,
                "build cancelled",
            ),
        };

        if let Err(e) = record_durable(&self.store, &event).await {
            error!(event = event.name(), error = %e, "terminal event could not be recorded");
        }

        job.transition(status);
        job.finished_at_ms = Some(finished_at_ms);
        if status == BuildStatus::Completed {
            job.record_progress(Stage::Verify, 100);
        }
        self.hub.publish(&JobUpdate::snapshot(&job, message));
        status
    }
}

#[cfg(test)]
#[path = "executor_tests.rs"]
mod tests;
