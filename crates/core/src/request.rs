// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Build request and partner app configuration.
//!
//! A [`BuildRequest`] is the immutable input to admission: the partner's
//! white-label configuration snapshot plus build options. Validation happens
//! upstream (in the partner-facing API); by the time a request reaches the
//! admission queue it is taken at face value.

use crate::id::PartnerId;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Requested output of a build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputKind {
    /// Installable binary only, unsigned.
    Binary,
    /// Signed and unsigned distribution bundle.
    SignedBundle,
}

impl OutputKind {
    /// Whether the sign stage does real work for this output.
    pub fn wants_signing(&self) -> bool {
        matches!(self, OutputKind::SignedBundle)
    }
}

/// Branding applied during template substitution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrandingConfig {
    pub primary_color: String,
    pub secondary_color: String,
    #[serde(default)]
    pub accent_color: Option<String>,
    #[serde(default)]
    pub font_family: Option<String>,
}

/// Signing material for `OutputKind::SignedBundle` builds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigningConfig {
    pub keystore: PathBuf,
    pub key_alias: String,
}

/// Feature toggles baked into the generated app.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureToggles {
    #[serde(default)]
    pub remittance: bool,
    #[serde(default)]
    pub bill_payment: bool,
    #[serde(default)]
    pub biometric_auth: bool,
    #[serde(default)]
    pub push_notifications: bool,
}

/// Full white-label app configuration snapshot.
///
/// Captured once at admission; the executor only ever reads this copy, so a
/// partner editing their configuration mid-build cannot change a running job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    pub app_name: String,
    pub package_name: String,
    pub version: String,
    pub version_code: u32,
    pub branding: BrandingConfig,
    #[serde(default)]
    pub signing: Option<SigningConfig>,
    #[serde(default)]
    pub features: FeatureToggles,
    pub api_base_url: String,
}

/// Immutable input to admission. Created once, never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildRequest {
    pub partner_id: PartnerId,
    pub app: AppConfig,
    pub output: OutputKind,
    /// Higher runs first; ties broken by submission time.
    #[serde(default)]
    pub priority: u8,
    pub requested_by: String,
    pub submitted_at_ms: u64,
}

#[cfg(test)]
#[path = "request_tests.rs"]
mod tests;
