// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::test_support::{build_request, signed_request};

#[test]
fn output_kind_signing() {
    assert!(!OutputKind::Binary.wants_signing());
    assert!(OutputKind::SignedBundle.wants_signing());
}

#[test]
fn request_serde_round_trip() {
    let request = signed_request("acme", 1_000);
    let json = serde_json::to_string(&request).unwrap();
    let parsed: BuildRequest = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, request);
}

#[test]
fn optional_fields_default() {
    // A minimal payload from the partner console omits toggles and priority
    let json = r##"{
        "partner_id": "acme",
        "app": {
            "app_name": "AcmePay",
            "package_name": "com.acme.pay",
            "version": "2.1.0",
            "version_code": 21,
            "branding": {"primary_color": "#111111", "secondary_color": "#222222"},
            "api_base_url": "https://api.acme.test"
        },
        "output": "binary",
        "requested_by": "ops@acme.test",
        "submitted_at_ms": 5
    }"##;

    let request: BuildRequest = serde_json::from_str(json).unwrap();
    assert_eq!(request.priority, 0);
    assert!(request.app.signing.is_none());
    assert!(!request.app.features.biometric_auth);
}

#[test]
fn requests_compare_by_value() {
    let a = build_request("acme", 1, 10);
    let b = build_request("acme", 1, 10);
    assert_eq!(a, b);
}
