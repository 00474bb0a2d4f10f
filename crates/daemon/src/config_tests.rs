// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::fs;

#[test]
fn defaults_apply_without_a_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config::for_root(dir.path().to_path_buf()).unwrap();

    assert_eq!(config.max_concurrent_builds, 3);
    assert_eq!(config.build_timeout, Duration::from_secs(1800));
    assert!(config.artifact_ttl.is_none());
    assert_eq!(config.socket_path, dir.path().join("forged.sock"));
    assert_eq!(config.jobs_dir, dir.path().join("jobs"));
}

#[test]
fn config_file_overrides_defaults() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("config.toml"),
        r#"
max_concurrent_builds = 8
build_timeout_secs = 600
artifact_ttl_secs = 86400
compile_command = "./gradlew assembleRelease"
"#,
    )
    .unwrap();

    let config = Config::for_root(dir.path().to_path_buf()).unwrap();
    assert_eq!(config.max_concurrent_builds, 8);
    assert_eq!(config.build_timeout, Duration::from_secs(600));
    assert_eq!(config.artifact_ttl, Some(Duration::from_secs(86400)));
    assert_eq!(config.toolchain_commands.compile, "./gradlew assembleRelease");
    // Untouched fields keep their defaults
    assert_eq!(config.subscriber_queue_depth, 64);
}

#[test]
fn unknown_keys_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("config.toml"), "max_concurent_builds = 2\n").unwrap();

    assert!(matches!(
        Config::for_root(dir.path().to_path_buf()),
        Err(ConfigError::Parse { .. })
    ));
}

#[test]
fn malformed_toml_is_a_parse_error() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("config.toml"), "max_concurrent_builds = [").unwrap();

    assert!(matches!(
        Config::for_root(dir.path().to_path_buf()),
        Err(ConfigError::Parse { .. })
    ));
}
