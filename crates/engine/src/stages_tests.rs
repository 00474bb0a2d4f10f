// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use forge_core::test_support::build_request;
use forge_core::{FakeClock, SequentialIdGen};
use std::fs;

fn prepared(dir: &Path) -> (Workspace, BuildRequest) {
    let ws = Workspace::create(dir, &JobId::new("job-1")).unwrap();
    let request = build_request("acme", 0, 1);
    init_workspace(&ws, &request).unwrap();
    (ws, request)
}

#[test]
fn init_snapshots_config_and_lays_down_templates() {
    let dir = tempfile::tempdir().unwrap();
    let (ws, request) = prepared(dir.path());

    let config: AppConfig =
        serde_json::from_slice(&fs::read(ws.root().join("app-config.json")).unwrap()).unwrap();
    assert_eq!(config, request.app);
    assert!(ws.src_dir().join("AppInfo.kt.tmpl").exists());
    assert!(ws.src_dir().join("theme.xml.tmpl").exists());
}

#[test]
fn branding_substitutes_and_strips_templates() {
    let dir = tempfile::tempdir().unwrap();
    let (ws, request) = prepared(dir.path());

    apply_branding(&ws, &request.app).unwrap();

    let source = fs::read_to_string(ws.src_dir().join("AppInfo.kt")).unwrap();
    assert!(source.contains(&request.app.package_name));
    assert!(source.contains("\"TestPay\""));
    assert!(!source.contains("{{"));

    let theme = fs::read_to_string(ws.src_dir().join("theme.xml")).unwrap();
    assert!(theme.contains(&request.app.branding.primary_color));
    // accent falls back to the secondary color when unset
    assert!(theme.contains(&request.app.branding.secondary_color));

    // No template files survive branding
    let leftovers = fs::read_dir(ws.src_dir())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().is_some_and(|x| x == "tmpl"))
        .count();
    assert_eq!(leftovers, 0);
}

#[test]
fn branding_rejects_unresolved_tokens() {
    let dir = tempfile::tempdir().unwrap();
    let (ws, request) = prepared(dir.path());
    fs::write(ws.src_dir().join("broken.xml.tmpl"), "<x>{{no_such_token}}</x>").unwrap();

    let err = apply_branding(&ws, &request.app).unwrap_err();
    assert_eq!(err.cause, FailureCause::Tool);
    assert!(err.message.contains("no_such_token"));
}

#[test]
fn resources_reflect_branding_and_features() {
    let dir = tempfile::tempdir().unwrap();
    let (ws, mut request) = prepared(dir.path());
    request.app.features.remittance = true;

    generate_resources(&ws, &request.app).unwrap();

    let colors = fs::read_to_string(ws.res_dir().join("colors.xml")).unwrap();
    assert!(colors.contains(&request.app.branding.primary_color));

    let features: serde_json::Value =
        serde_json::from_slice(&fs::read(ws.res_dir().join("features.json")).unwrap()).unwrap();
    assert_eq!(features["remittance"], true);
    assert_eq!(features["bill_payment"], false);
}

#[test]
fn package_names_outputs_and_writes_a_report() {
    let dir = tempfile::tempdir().unwrap();
    let (ws, request) = prepared(dir.path());

    let binary = ws.build_dir().join("output.bin");
    fs::write(&binary, b"binary bytes").unwrap();

    let files = package(&ws, &request, &binary, None, None).unwrap();
    let names: Vec<&str> = files.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(
        names,
        vec!["com.example.testpay-1.0.0.apk", "build-report.json"]
    );

    let report: serde_json::Value =
        serde_json::from_slice(&fs::read(ws.out_dir().join("build-report.json")).unwrap()).unwrap();
    assert_eq!(report["package_name"], "com.example.testpay");
    assert_eq!(report["files"][0], "com.example.testpay-1.0.0.apk");
}

#[test]
fn package_includes_mapping_and_bundle_when_present() {
    let dir = tempfile::tempdir().unwrap();
    let (ws, request) = prepared(dir.path());

    let binary = ws.build_dir().join("output.bin");
    let mapping = ws.build_dir().join("mapping.txt");
    let bundle = ws.build_dir().join("output-signed.bundle");
    fs::write(&binary, b"bin").unwrap();
    fs::write(&mapping, b"map").unwrap();
    fs::write(&bundle, b"aab").unwrap();

    let files = package(&ws, &request, &binary, Some(&mapping), Some(&bundle)).unwrap();
    let kinds: Vec<ArtifactKind> = files.iter().map(|f| f.kind).collect();
    assert_eq!(
        kinds,
        vec![
            ArtifactKind::Binary,
            ArtifactKind::Mapping,
            ArtifactKind::Bundle,
            ArtifactKind::Report,
        ]
    );
}

#[test]
fn verify_registers_every_packaged_file() {
    let dir = tempfile::tempdir().unwrap();
    let (ws, request) = prepared(dir.path());

    let binary = ws.build_dir().join("output.bin");
    fs::write(&binary, b"binary bytes").unwrap();
    let files = package(&ws, &request, &binary, None, None).unwrap();

    let store_dir = tempfile::tempdir().unwrap();
    let store = ArtifactStore::with_parts(
        store_dir.path(),
        None,
        FakeClock::new(),
        SequentialIdGen::new("ref"),
    );

    let metas = verify(&store, &JobId::new("job-1"), &files).unwrap();
    assert_eq!(metas.len(), 2);
    for meta in &metas {
        let bytes = store.get(&meta.reference).unwrap();
        assert_eq!(bytes.len() as u64, meta.size);
    }
}

#[test]
fn verify_rejects_empty_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let (ws, _) = prepared(dir.path());

    let empty = ws.out_dir().join("empty.apk");
    fs::write(&empty, b"").unwrap();
    let files = vec![PackagedFile {
        name: "empty.apk".to_string(),
        kind: ArtifactKind::Binary,
        path: empty,
    }];

    let store_dir = tempfile::tempdir().unwrap();
    let store = ArtifactStore::with_parts(
        store_dir.path(),
        None,
        FakeClock::new(),
        SequentialIdGen::new("ref"),
    );

    let err = verify(&store, &JobId::new("job-1"), &files).unwrap_err();
    assert_eq!(err.cause, FailureCause::Tool);
}
