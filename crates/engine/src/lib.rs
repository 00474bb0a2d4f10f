// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Build engine: admission queue, build executor, and status hub.
//!
//! The engine sits between the daemon's wire surface and the storage layer.
//! Requests enter through the [`AdmissionQueue`], which enforces the
//! concurrency ceiling and priority order. Each admitted job is driven to a
//! terminal state by the [`BuildExecutor`], which runs the fixed stage
//! pipeline inside an isolated workspace. Live progress fans out through the
//! [`StatusHub`].

mod cancel;
mod executor;
mod hub;
mod queue;
mod stages;
mod toolchain;
mod workspace;

pub use cancel::{cancel_pair, CancelHandle, CancelToken};
pub use executor::{record_durable, BuildExecutor, ExecutorConfig, StoreHandle};
pub use hub::{HubConfig, StatusHub, Subscription};
pub use queue::{AdmissionQueue, CancelOutcome, QueueConfig, QueueError};
pub use stages::StageFailure;
pub use toolchain::{CompileOutput, ShellCommands, ShellToolchain, ToolError, Toolchain};
pub use workspace::{sweep_stale, Workspace};

#[cfg(any(test, feature = "test-support"))]
pub use toolchain::FakeToolchain;
