// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Unix socket listener: accepts client connections and serves requests.
//!
//! Connections are request/response over the length-prefixed wire format.
//! `Subscribe` is the one streaming request: the connection carries `Update`
//! frames until the job retires, then an `End` frame, then goes back to
//! normal request handling.

use std::sync::Arc;

use forge_core::{Clock, IdGen, JobId, JobUpdate, UuidIdGen};
use forge_engine::{AdmissionQueue, StatusHub, StoreHandle, Toolchain};
use forge_storage::{ArtifactError, ArtifactStore};
use tokio::net::{unix::OwnedWriteHalf, UnixListener, UnixStream};
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::protocol::{
    wire, CancelResult, ProtocolError, Request, Response, DEFAULT_TIMEOUT, PROTOCOL_VERSION,
};

/// Serves the daemon's state over a Unix socket.
pub struct Listener<T: Toolchain, C: Clock, G: IdGen = UuidIdGen> {
    store: StoreHandle,
    artifacts: Arc<ArtifactStore<C>>,
    hub: StatusHub,
    queue: AdmissionQueue<T, C, G>,
    /// Notified when a client asks the daemon to shut down. The accept loop
    /// is the only waiter, so `notify_one` can never lose the wakeup.
    shutdown: Arc<Notify>,
}

impl<T: Toolchain, C: Clock, G: IdGen + 'static> Listener<T, C, G> {
    pub fn new(
        store: StoreHandle,
        artifacts: Arc<ArtifactStore<C>>,
        hub: StatusHub,
        queue: AdmissionQueue<T, C, G>,
        shutdown: Arc<Notify>,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            artifacts,
            hub,
            queue,
            shutdown,
        })
    }

    /// Accept loop. Returns when shutdown is requested.
    pub async fn serve(self: Arc<Self>, listener: UnixListener) {
        info!("listener ready");
        loop {
            tokio::select! {
                _ = self.shutdown.notified() => {
                    info!("listener stopping");
                    return;
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, _addr)) => {
                        let conn = Arc::clone(&self);
                        tokio::spawn(conn.handle_connection(stream));
                    }
                    Err(e) => {
                        warn!(error = %e, "accept failed");
                        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
                    }
                },
            }
        }
    }

    async fn handle_connection(self: Arc<Self>, stream: UnixStream) {
        let (mut reader, mut writer) = stream.into_split();
        loop {
            let request = match wire::read_request(&mut reader).await {
                Ok(request) => request,
                Err(ProtocolError::ConnectionClosed) => return,
                Err(e) => {
                    debug!(error = %e, "dropping connection on bad request");
                    return;
                }
            };
            if let Err(e) = self.handle_request(request, &mut writer).await {
                debug!(error = %e, "dropping connection on failed write");
                return;
            }
        }
    }

    async fn handle_request(
        &self,
        request: Request,
        writer: &mut OwnedWriteHalf,
    ) -> Result<(), ProtocolError> {
        match request {
            Request::Ping => write(writer, &Response::Pong).await,

            Request::Hello { version } => {
                if version != PROTOCOL_VERSION {
                    debug!(client = %version, daemon = %PROTOCOL_VERSION, "version skew");
                }
                write(
                    writer,
                    &Response::Hello {
                        version: PROTOCOL_VERSION.to_string(),
                    },
                )
                .await
            }

            Request::Submit { request } => {
                let response = match self.queue.submit(request) {
                    Ok(id) => Response::Submitted { id },
                    Err(e) => Response::error(e.to_string()),
                };
                write(writer, &response).await
            }

            Request::Status { id } => {
                let job = self.store.lock().job(&id).cloned();
                let response = match job {
                    Some(job) => Response::Job { job: Box::new(job) },
                    None => Response::error(format!("no such job: {id}")),
                };
                write(writer, &response).await
            }

            Request::Logs { id, tail } => {
                let entries = {
                    let store = self.store.lock();
                    store.job(&id).map(|job| match tail {
                        Some(n) => {
                            let skip = job.logs.len().saturating_sub(n);
                            job.logs[skip..].to_vec()
                        }
                        None => job.logs.clone(),
                    })
                };
                let response = match entries {
                    Some(entries) => Response::Logs { id, entries },
                    None => Response::error(format!("no such job: {id}")),
                };
                write(writer, &response).await
            }

            Request::List {
                partner_id,
                status,
                page,
                per_page,
            } => {
                let filter = forge_storage::JobFilter { partner_id, status };
                let mut paging = forge_storage::Page::default();
                if let Some(page) = page {
                    paging.page = page;
                }
                if let Some(per_page) = per_page {
                    paging.per_page = per_page;
                }
                let page = self.store.lock().list(&filter, paging);
                write(writer, &Response::Jobs { page }).await
            }

            Request::Cancel { id } => {
                let response = match self.queue.cancel(&id) {
                    Ok(outcome) => Response::Cancel {
                        result: CancelResult::from(outcome),
                    },
                    Err(e) => Response::error(e.to_string()),
                };
                write(writer, &response).await
            }

            Request::Subscribe { id } => self.stream_updates(&id, writer).await,

            Request::Artifact { reference } => {
                let response = self.fetch_artifact(&reference);
                write(writer, &response).await
            }

            Request::Shutdown => {
                write(writer, &Response::ShuttingDown).await?;
                info!("shutdown requested by client");
                self.shutdown.notify_one();
                Ok(())
            }
        }
    }

    /// Stream a job's updates: snapshot first, then live updates until the
    /// job retires, then `End`.
    async fn stream_updates(
        &self,
        id: &JobId,
        writer: &mut OwnedWriteHalf,
    ) -> Result<(), ProtocolError> {
        // Attach before reading the snapshot so no update can fall in the gap.
        let mut sub = self.hub.subscribe(id);
        let job = self.store.lock().job(id).cloned();
        let Some(job) = job else {
            return write(writer, &Response::error(format!("no such job: {id}"))).await;
        };

        let snapshot = JobUpdate::snapshot(&job, "status snapshot");
        let floor = snapshot.progress;
        let terminal = snapshot.is_terminal();
        write(writer, &Response::Update { update: snapshot }).await?;

        if !terminal {
            while let Some(update) = sub.recv().await {
                // An update published between attach and the snapshot read can
                // sit behind the snapshot; skip it to keep the stream monotone.
                if !update.is_terminal() && update.progress < floor {
                    continue;
                }
                let last = update.is_terminal();
                write(writer, &Response::Update { update }).await?;
                if last {
                    break;
                }
            }
        }
        write(writer, &Response::End).await
    }

    fn fetch_artifact(&self, reference: &str) -> Response {
        let record = match self.artifacts.stat(reference) {
            Ok(record) => record,
            Err(e) => return artifact_error(reference, e),
        };
        match self.artifacts.get(reference) {
            Ok(bytes) => Response::Artifact {
                name: record.name,
                kind: record.kind,
                bytes,
            },
            Err(e) => artifact_error(reference, e),
        }
    }
}

fn artifact_error(reference: &str, error: ArtifactError) -> Response {
    match error {
        ArtifactError::NotFound => Response::error(format!("no such artifact: {reference}")),
        ArtifactError::Expired => {
            Response::error(format!("artifact reference expired: {reference}"))
        }
        other => Response::error(format!("artifact retrieval failed: {other}")),
    }
}

async fn write(writer: &mut OwnedWriteHalf, response: &Response) -> Result<(), ProtocolError> {
    wire::write_response(writer, response, DEFAULT_TIMEOUT).await
}

#[cfg(test)]
#[path = "listener_tests.rs"]
mod tests;
