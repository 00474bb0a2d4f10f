// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Builders and fixtures shared by tests across the workspace.

use crate::id::{JobId, PartnerId};
use crate::job::BuildJob;
use crate::request::{
    AppConfig, BrandingConfig, BuildRequest, FeatureToggles, OutputKind, SigningConfig,
};

/// Minimal valid app configuration.
pub fn app_config(name: &str) -> AppConfig {
    AppConfig {
        app_name: name.to_string(),
        package_name: format!("com.example.{}", name.to_lowercase()),
        version: "1.0.0".to_string(),
        version_code: 1,
        branding: BrandingConfig {
            primary_color: "#004C8C".to_string(),
            secondary_color: "#FFB300".to_string(),
            accent_color: None,
            font_family: None,
        },
        signing: None,
        features: FeatureToggles::default(),
        api_base_url: "https://api.example.test".to_string(),
    }
}

/// Build request with the given partner and priority, unsigned output.
pub fn build_request(partner: &str, priority: u8, submitted_at_ms: u64) -> BuildRequest {
    BuildRequest {
        partner_id: PartnerId::new(partner),
        app: app_config("TestPay"),
        output: OutputKind::Binary,
        priority,
        requested_by: "tester@example.test".to_string(),
        submitted_at_ms,
    }
}

/// Build request for a signed bundle (exercises the sign stage).
pub fn signed_request(partner: &str, submitted_at_ms: u64) -> BuildRequest {
    let mut request = build_request(partner, 0, submitted_at_ms);
    request.output = OutputKind::SignedBundle;
    request.app.signing = Some(SigningConfig {
        keystore: "/keys/partner.jks".into(),
        key_alias: "release".into(),
    });
    request
}

/// Freshly queued job for the given partner.
pub fn queued_job(id: &str, partner: &str) -> BuildJob {
    BuildJob::new_with_epoch_ms(JobId::new(id), build_request(partner, 0, 1_000), 1_000)
}
