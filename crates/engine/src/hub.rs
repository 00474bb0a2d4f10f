// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-process status hub: per-job fan-out of live progress updates.
//!
//! Subscribers attach a bounded sink queue to a job id. Publishing walks the
//! job's sinks under the hub lock, so every subscriber sees the same updates
//! in the same order. A full sink drops its oldest buffered update rather
//! than blocking the publisher; durable history lives in the job store, the
//! hub only carries the live view.
//!
//! When a terminal update is published the job's sinks are closed after a
//! short grace window, giving slow consumers time to drain the final update.

use forge_core::{JobId, JobUpdate, SinkId};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::debug;

/// Status hub tuning.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Buffered updates per sink before drop-oldest kicks in.
    pub queue_depth: usize,
    /// How long sinks stay open after a terminal update.
    pub teardown_grace: Duration,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            queue_depth: 64,
            teardown_grace: Duration::from_millis(500),
        }
    }
}

struct SinkQueue {
    buf: Mutex<VecDeque<JobUpdate>>,
    notify: Notify,
    closed: AtomicBool,
    depth: usize,
    dropped: AtomicU64,
}

impl SinkQueue {
    fn new(depth: usize) -> Self {
        Self {
            buf: Mutex::new(VecDeque::with_capacity(depth)),
            notify: Notify::new(),
            closed: AtomicBool::new(false),
            depth,
            dropped: AtomicU64::new(0),
        }
    }

    fn push(&self, update: JobUpdate) {
        {
            let mut buf = self.buf.lock();
            if buf.len() == self.depth {
                buf.pop_front();
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
            buf.push_back(update);
        }
        self.notify.notify_one();
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        // notify_one stores a permit when no receiver is parked, so a close
        // racing ahead of recv's registration is never lost.
        self.notify.notify_one();
    }

    async fn notified(&self) {
        self.notify.notified().await;
    }
}

/// One subscriber's receive side. Dropping it detaches the sink.
pub struct Subscription {
    sink_id: SinkId,
    job_id: JobId,
    queue: Arc<SinkQueue>,
    hub: Arc<HubInner>,
}

impl Subscription {
    pub fn sink_id(&self) -> &SinkId {
        &self.sink_id
    }

    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    /// Receive the next update, in publish order.
    ///
    /// Returns `None` once the sink is closed and drained: after the
    /// grace-window teardown that follows a terminal update, or after
    /// [`StatusHub::unsubscribe`].
    pub async fn recv(&mut self) -> Option<JobUpdate> {
        loop {
            if let Some(update) = self.queue.buf.lock().pop_front() {
                return Some(update);
            }
            if self.queue.closed.load(Ordering::Acquire) {
                return None;
            }
            self.queue.notified().await;
        }
    }

    /// Non-blocking receive.
    pub fn try_recv(&mut self) -> Option<JobUpdate> {
        self.queue.buf.lock().pop_front()
    }

    /// Updates discarded by drop-oldest on this sink so far.
    pub fn dropped(&self) -> u64 {
        self.queue.dropped.load(Ordering::Relaxed)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.hub.detach(&self.job_id, &self.sink_id);
    }
}

struct SinkEntry {
    id: SinkId,
    queue: Arc<SinkQueue>,
}

struct HubInner {
    sinks: Mutex<HashMap<String, Vec<SinkEntry>>>,
    config: HubConfig,
}

impl HubInner {
    fn detach(&self, job_id: &JobId, sink_id: &SinkId) {
        let mut sinks = self.sinks.lock();
        if let Some(entries) = sinks.get_mut(job_id.as_str()) {
            if let Some(pos) = entries.iter().position(|e| e.id == *sink_id) {
                let entry = entries.remove(pos);
                entry.queue.close();
            }
            if entries.is_empty() {
                sinks.remove(job_id.as_str());
            }
        }
    }
}

/// Cloneable handle to the hub. All clones share one sink table.
#[derive(Clone)]
pub struct StatusHub {
    inner: Arc<HubInner>,
}

impl StatusHub {
    pub fn new(config: HubConfig) -> Self {
        Self {
            inner: Arc::new(HubInner {
                sinks: Mutex::new(HashMap::new()),
                config,
            }),
        }
    }

    /// Attach a new sink to a job's update stream.
    ///
    /// The hub does not check that the job exists; subscribing to an unknown
    /// or already-torn-down job yields a sink that never receives anything.
    pub fn subscribe(&self, job_id: &JobId) -> Subscription {
        let sink_id = SinkId::new(uuid::Uuid::new_v4().to_string());
        let queue = Arc::new(SinkQueue::new(self.inner.config.queue_depth));

        self.inner
            .sinks
            .lock()
            .entry(job_id.as_str().to_string())
            .or_default()
            .push(SinkEntry {
                id: sink_id.clone(),
                queue: Arc::clone(&queue),
            });

        debug!(job = %job_id.short(8), sink = %sink_id.short(8), "subscribed");
        Subscription {
            sink_id,
            job_id: job_id.clone(),
            queue,
            hub: Arc::clone(&self.inner),
        }
    }

    /// Detach one sink. The sink's `recv` drains what is buffered, then ends.
    pub fn unsubscribe(&self, job_id: &JobId, sink_id: &SinkId) {
        self.inner.detach(job_id, sink_id);
    }

    /// Deliver an update to every sink attached to its job.
    ///
    /// A terminal update schedules teardown of the job's sinks after the
    /// configured grace window. Must be called from within a tokio runtime.
    pub fn publish(&self, update: &JobUpdate) {
        let terminal = update.is_terminal();
        {
            let sinks = self.inner.sinks.lock();
            if let Some(entries) = sinks.get(update.job_id.as_str()) {
                for entry in entries {
                    entry.queue.push(update.clone());
                }
            }
        }
        if terminal {
            self.schedule_teardown(update.job_id.clone());
        }
    }

    fn schedule_teardown(&self, job_id: JobId) {
        let inner = Arc::clone(&self.inner);
        let grace = inner.config.teardown_grace;
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            if let Some(entries) = inner.sinks.lock().remove(job_id.as_str()) {
                debug!(job = %job_id.short(8), sinks = entries.len(), "tearing down sinks");
                for entry in entries {
                    entry.queue.close();
                }
            }
        });
    }

    /// Sinks currently attached to a job.
    pub fn subscriber_count(&self, job_id: &JobId) -> usize {
        self.inner
            .sinks
            .lock()
            .get(job_id.as_str())
            .map_or(0, Vec::len)
    }

    /// Close every sink immediately. Used on daemon shutdown.
    pub fn shutdown(&self) {
        let mut sinks = self.inner.sinks.lock();
        for (_, entries) in sinks.drain() {
            for entry in entries {
                entry.queue.close();
            }
        }
    }
}

#[cfg(test)]
#[path = "hub_tests.rs"]
mod tests;
