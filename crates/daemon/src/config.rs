// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon configuration.
//!
//! Paths derive from a single state root (`$FORGE_STATE_DIR`, else
//! `$XDG_STATE_HOME/forge`, else `~/.local/state/forge`); tunables come from
//! an optional `config.toml` inside it. Every field has a default, so a
//! missing file means a default daemon.

use forge_core::ToolchainInfo;
use forge_engine::ShellCommands;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot determine state directory (set FORGE_STATE_DIR or HOME)")]
    NoStateDir,
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Raw `config.toml` shape. Everything optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    max_concurrent_builds: Option<usize>,
    build_timeout_secs: Option<u64>,
    compile_checkpoint_ms: Option<u64>,
    subscriber_queue_depth: Option<usize>,
    teardown_grace_ms: Option<u64>,
    checkpoint_interval_secs: Option<u64>,
    /// Artifact reference time-to-live; absent means references never expire.
    artifact_ttl_secs: Option<u64>,
    compile_command: Option<String>,
    sign_command: Option<String>,
    toolchain_name: Option<String>,
    toolchain_version: Option<String>,
}

/// Resolved daemon configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub state_dir: PathBuf,
    pub socket_path: PathBuf,
    pub lock_path: PathBuf,
    pub log_path: PathBuf,
    /// WAL and snapshot live here.
    pub jobs_dir: PathBuf,
    pub builds_dir: PathBuf,
    pub artifacts_dir: PathBuf,

    pub max_concurrent_builds: usize,
    pub build_timeout: Duration,
    pub compile_checkpoint: Duration,
    pub subscriber_queue_depth: usize,
    pub teardown_grace: Duration,
    pub checkpoint_interval: Duration,
    pub artifact_ttl: Option<Duration>,

    /// Commands for the shell toolchain; must honor the workspace output
    /// contract (`build/output.bin`, `build/output-signed.bundle`).
    pub toolchain_commands: ShellCommands,
    pub toolchain_info: ToolchainInfo,
}

impl Config {
    /// Resolve the state root from the environment and load `config.toml`
    /// inside it if present.
    pub fn load() -> Result<Self, ConfigError> {
        Self::for_root(state_dir()?)
    }

    /// Load configuration rooted at an explicit directory.
    pub fn for_root(state_dir: PathBuf) -> Result<Self, ConfigError> {
        let config_path = state_dir.join("config.toml");
        let file = if config_path.exists() {
            let text = std::fs::read_to_string(&config_path).map_err(|source| {
                ConfigError::Read {
                    path: config_path.clone(),
                    source,
                }
            })?;
            toml::from_str(&text).map_err(|source| ConfigError::Parse {
                path: config_path,
                source,
            })?
        } else {
            ConfigFile::default()
        };

        Ok(Self {
            socket_path: state_dir.join("forged.sock"),
            lock_path: state_dir.join("forged.pid"),
            log_path: state_dir.join("forged.log"),
            jobs_dir: state_dir.join("jobs"),
            builds_dir: state_dir.join("builds"),
            artifacts_dir: state_dir.join("artifacts"),
            state_dir,

            max_concurrent_builds: file.max_concurrent_builds.unwrap_or(3),
            build_timeout: Duration::from_secs(file.build_timeout_secs.unwrap_or(30 * 60)),
            compile_checkpoint: Duration::from_millis(file.compile_checkpoint_ms.unwrap_or(500)),
            subscriber_queue_depth: file.subscriber_queue_depth.unwrap_or(64),
            teardown_grace: Duration::from_millis(file.teardown_grace_ms.unwrap_or(500)),
            checkpoint_interval: Duration::from_secs(file.checkpoint_interval_secs.unwrap_or(300)),
            artifact_ttl: file.artifact_ttl_secs.map(Duration::from_secs),

            toolchain_commands: ShellCommands {
                compile: file
                    .compile_command
                    .unwrap_or_else(|| "./tools/compile.sh".to_string()),
                sign: file
                    .sign_command
                    .unwrap_or_else(|| "./tools/sign.sh".to_string()),
            },
            toolchain_info: ToolchainInfo {
                name: file
                    .toolchain_name
                    .unwrap_or_else(|| "gradle".to_string()),
                version: file.toolchain_version.unwrap_or_else(|| "8.7".to_string()),
                sdk: None,
            },
        })
    }
}

fn state_dir() -> Result<PathBuf, ConfigError> {
    if let Ok(dir) = std::env::var("FORGE_STATE_DIR") {
        return Ok(PathBuf::from(dir));
    }
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return Ok(PathBuf::from(xdg).join("forge"));
    }
    match std::env::var("HOME") {
        Ok(home) => Ok(PathBuf::from(home).join(".local/state/forge")),
        Err(_) => Err(ConfigError::NoStateDir),
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
