// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! forge-core: domain types for the Forge white-label build service

pub mod clock;
pub mod event;
pub mod id;
pub mod job;
pub mod request;
pub mod stage;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use clock::{Clock, FakeClock, SystemClock};
pub use event::{Event, JobUpdate};
pub use id::{ArtifactId, IdGen, JobId, PartnerId, SequentialIdGen, ShortId, SinkId, UuidIdGen};
pub use job::{
    ArtifactKind, ArtifactMeta, BuildError, BuildJob, BuildResult, BuildStatus, FailureCause,
    LogEntry, Severity, ToolchainInfo,
};
pub use request::{
    AppConfig, BrandingConfig, BuildRequest, FeatureToggles, OutputKind, SigningConfig,
};
pub use stage::Stage;
