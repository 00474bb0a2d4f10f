// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Admission queue: priority order under a fixed concurrency ceiling.
//!
//! `submit` records the job durably and parks it in a priority heap; the
//! dispatcher task pulls the next runnable job whenever a semaphore slot is
//! free and spawns an executor run for it. Queued cancellations are handled
//! entirely here, a queued-then-cancelled job never reaches an executor.
//! Running cancellations are forwarded through the job's [`CancelHandle`];
//! the executor owns the terminal transition.

use crate::cancel::{cancel_pair, CancelHandle};
use crate::executor::{record_durable, BuildExecutor, StoreHandle};
use crate::toolchain::Toolchain;
use crate::StatusHub;
use forge_core::{BuildRequest, BuildStatus, Clock, Event, IdGen, JobId, JobUpdate, UuidIdGen};
use forge_storage::StoreError;
use parking_lot::Mutex;
use std::cmp::Ordering as CmpOrdering;
use std::collections::{BinaryHeap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Notify, Semaphore};
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Errors from queue operations.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("queue is shutting down")]
    ShuttingDown,
}

/// What a cancel request achieved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// The job was still queued; it is now terminal and will never run.
    Cancelled,
    /// The job is running; it was signalled and will retire as cancelled
    /// once the executor reaches a checkpoint.
    Requested,
    /// No job with that id.
    NotFound,
    /// The job had already reached a terminal state.
    AlreadyTerminal,
}

/// Queue tuning.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Concurrency ceiling: builds running at once.
    pub max_concurrent: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self { max_concurrent: 3 }
    }
}

/// Heap entry. Higher priority first, then earlier admission.
#[derive(Debug, PartialEq, Eq)]
struct Waiting {
    priority: u8,
    admitted_at_ms: u64,
    seq: u64,
    id: JobId,
}

impl Ord for Waiting {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.admitted_at_ms.cmp(&self.admitted_at_ms))
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for Waiting {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

struct QueueInner<T, C: Clock, G: IdGen> {
    store: StoreHandle,
    hub: StatusHub,
    executor: BuildExecutor<T, C>,
    clock: C,
    ids: G,
    waiting: Mutex<BinaryHeap<Waiting>>,
    running: Mutex<HashMap<String, CancelHandle>>,
    slots: Arc<Semaphore>,
    wake: Notify,
    admitted: AtomicU64,
    stopping: AtomicBool,
}

/// Cloneable handle to the admission queue.
pub struct AdmissionQueue<T, C: Clock, G: IdGen = UuidIdGen> {
    inner: Arc<QueueInner<T, C, G>>,
}

impl<T, C: Clock, G: IdGen> Clone for AdmissionQueue<T, C, G> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Toolchain, C: Clock> AdmissionQueue<T, C> {
    pub fn new(
        store: StoreHandle,
        hub: StatusHub,
        executor: BuildExecutor<T, C>,
        clock: C,
        config: QueueConfig,
    ) -> Self {
        Self::with_ids(store, hub, executor, clock, UuidIdGen, config)
    }
}

impl<T: Toolchain, C: Clock, G: IdGen + 'static> AdmissionQueue<T, C, G> {
    /// Construct with an explicit id generator (for tests).
    pub fn with_ids(
        store: StoreHandle,
        hub: StatusHub,
        executor: BuildExecutor<T, C>,
        clock: C,
        ids: G,
        config: QueueConfig,
    ) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                store,
                hub,
                executor,
                clock,
                ids,
                waiting: Mutex::new(BinaryHeap::new()),
                running: Mutex::new(HashMap::new()),
                slots: Arc::new(Semaphore::new(config.max_concurrent)),
                wake: Notify::new(),
                admitted: AtomicU64::new(0),
                stopping: AtomicBool::new(false),
            }),
        }
    }

    /// Admit a request: record it durably and park it for dispatch.
    pub fn submit(&self, request: BuildRequest) -> Result<JobId, QueueError> {
        if self.inner.stopping.load(Ordering::Acquire) {
            return Err(QueueError::ShuttingDown);
        }

        let id = JobId::new(self.inner.ids.next());
        let created_at_ms = self.inner.clock.epoch_ms();
        self.inner.store.lock().record(&Event::JobSubmitted {
            id: id.clone(),
            request: request.clone(),
            created_at_ms,
        })?;

        let seq = self.inner.admitted.fetch_add(1, Ordering::SeqCst);
        self.inner.waiting.lock().push(Waiting {
            priority: request.priority,
            admitted_at_ms: created_at_ms,
            seq,
            id: id.clone(),
        });
        self.inner.wake.notify_one();

        info!(
            job = %id.short(8),
            partner = %request.partner_id,
            priority = request.priority,
            "job admitted",
        );
        Ok(id)
    }

    /// Cancel a job wherever it currently is.
    pub fn cancel(&self, id: &JobId) -> Result<CancelOutcome, QueueError> {
        // A registered handle means an executor owns the job right now.
        if let Some(handle) = self.inner.running.lock().get(id.as_str()) {
            handle.cancel();
            self.inner
                .store
                .lock()
                .record(&Event::JobCancelRequested { id: id.clone() })?;
            info!(job = %id.short(8), "cancellation requested for running job");
            return Ok(CancelOutcome::Requested);
        }

        let update = {
            let mut store = self.inner.store.lock();
            let Some(job) = store.job(id) else {
                return Ok(CancelOutcome::NotFound);
            };
            match job.status {
                status if status.is_terminal() => return Ok(CancelOutcome::AlreadyTerminal),
                BuildStatus::Queued => {
                    let finished_at_ms = self.inner.clock.epoch_ms();
                    store.record(&Event::JobCancelled {
                        id: id.clone(),
                        finished_at_ms,
                    })?;
                    // The heap entry stays; the dispatcher skips non-queued
                    // jobs when it pops them.
                    store
                        .job(id)
                        .map(|job| JobUpdate::snapshot(job, "cancelled before start"))
                }
                BuildStatus::Running => {
                    // Start is in flight; the executor will observe the
                    // request at its first checkpoint.
                    store.record(&Event::JobCancelRequested { id: id.clone() })?;
                    drop(store);
                    if let Some(handle) = self.inner.running.lock().get(id.as_str()) {
                        handle.cancel();
                    }
                    return Ok(CancelOutcome::Requested);
                }
                _ => return Ok(CancelOutcome::AlreadyTerminal),
            }
        };

        if let Some(update) = update {
            self.inner.hub.publish(&update);
        }
        info!(job = %id.short(8), "queued job cancelled");
        Ok(CancelOutcome::Cancelled)
    }

    /// Re-park a job that is already recorded as `Queued` in the store.
    ///
    /// Used at startup to pick up jobs recovered from the WAL; no new
    /// submission event is written.
    pub fn readmit(&self, id: &JobId) {
        QueueInner::repark(&self.inner, id);
        self.inner.wake.notify_one();
    }

    /// Jobs parked and not yet dispatched (including lazily-removed ones).
    pub fn waiting_len(&self) -> usize {
        self.inner.waiting.lock().len()
    }

    /// Jobs currently held by an executor.
    pub fn running_len(&self) -> usize {
        self.inner.running.lock().len()
    }

    /// Stop admitting and dispatching. Running builds keep their slots and
    /// retire normally.
    pub fn shutdown(&self) {
        self.inner.stopping.store(true, Ordering::Release);
        self.inner.slots.close();
        self.inner.wake.notify_waiters();
    }

    /// Spawn the dispatcher task.
    pub fn spawn_dispatcher(&self) -> JoinHandle<()> {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            QueueInner::dispatch_loop(inner).await;
        })
    }
}

impl<T: Toolchain, C: Clock, G: IdGen + 'static> QueueInner<T, C, G> {
    async fn dispatch_loop(inner: Arc<Self>) {
        loop {
            // Ceiling first: hold a slot before committing to a job.
            let permit = match Arc::clone(&inner.slots).acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return, // closed on shutdown
            };

            let Some(id) = Self::next_runnable(&inner).await else {
                return;
            };

            let (handle, token) = cancel_pair();
            inner
                .running
                .lock()
                .insert(id.as_str().to_string(), handle);

            let started_at_ms = inner.clock.epoch_ms();
            let started = Event::JobStarted {
                id: id.clone(),
                started_at_ms,
            };
            if let Err(e) = record_durable(&inner.store, &started).await {
                // Without a durable start the terminal event would be
                // rejected on replay; put the job back and try again later.
                error!(job = %id.short(8), error = %e, "start could not be recorded");
                inner.running.lock().remove(id.as_str());
                Self::repark(&inner, &id);
                continue;
            }

            let job = inner.store.lock().job(&id).cloned();
            let Some(job) = job else {
                inner.running.lock().remove(id.as_str());
                continue;
            };
            if job.status != BuildStatus::Running {
                // A cancel slipped in between the heap pop and the start
                // record; the job is already terminal.
                inner.running.lock().remove(id.as_str());
                continue;
            }
            inner.hub.publish(&JobUpdate::snapshot(&job, "build started"));

            let task_inner = Arc::clone(&inner);
            tokio::spawn(async move {
                let _slot = permit;
                let status = task_inner.executor.run(job, token).await;
                task_inner.running.lock().remove(id.as_str());
                info!(job = %id.short(8), status = %status, "slot released");
            });
        }
    }

    /// Pop heap entries until one is still `Queued`, waiting for work when
    /// the heap is empty. Returns `None` on shutdown.
    async fn next_runnable(inner: &Arc<Self>) -> Option<JobId> {
        loop {
            if inner.stopping.load(Ordering::Acquire) {
                return None;
            }
            loop {
                let Some(waiting) = inner.waiting.lock().pop() else {
                    break;
                };
                let runnable = inner
                    .store
                    .lock()
                    .job(&waiting.id)
                    .is_some_and(|job| job.status == BuildStatus::Queued);
                if runnable {
                    return Some(waiting.id);
                }
                // Cancelled while queued; skip it.
            }
            inner.wake.notified().await;
        }
    }

    fn repark(inner: &Arc<Self>, id: &JobId) {
        let request = inner
            .store
            .lock()
            .job(id)
            .map(|job| (job.request.priority, job.created_at_ms));
        if let Some((priority, admitted_at_ms)) = request {
            let seq = inner.admitted.fetch_add(1, Ordering::SeqCst);
            inner.waiting.lock().push(Waiting {
                priority,
                admitted_at_ms,
                seq,
                id: id.clone(),
            });
            info!(job = %id.short(8), "job parked for dispatch");
        }
    }
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
