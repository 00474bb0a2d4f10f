// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Toolchain adapter seam.
//!
//! Compile and sign are the two stages that shell out to external tooling;
//! everything else the executor does itself. [`ShellToolchain`] runs
//! configured commands inside the workspace. Tests substitute
//! [`FakeToolchain`].

use async_trait::async_trait;
use forge_core::{AppConfig, FailureCause, SigningConfig, ToolchainInfo};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

/// Workspace-relative path the compile step must produce.
pub const COMPILE_OUTPUT: &str = "build/output.bin";
/// Workspace-relative path for the optional obfuscation mapping.
pub const MAPPING_OUTPUT: &str = "build/mapping.txt";
/// Workspace-relative path the sign step must produce.
pub const SIGNED_OUTPUT: &str = "build/output-signed.bundle";

const STDERR_TAIL_LINES: usize = 20;

/// Errors from toolchain invocations.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("{tool} exited with status {status}: {stderr_tail}")]
    CommandFailed {
        tool: String,
        status: i32,
        stderr_tail: String,
    },
    #[error("{tool} succeeded but produced no {path}")]
    MissingOutput { tool: String, path: String },
    #[error("failed to launch {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: io::Error,
    },
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

impl ToolError {
    /// Map onto the failure taxonomy: the tool rejecting the input is a tool
    /// failure, not being able to run it at all is ours.
    pub fn cause(&self) -> FailureCause {
        match self {
            ToolError::CommandFailed { .. } | ToolError::MissingOutput { .. } => FailureCause::Tool,
            ToolError::Spawn { .. } | ToolError::Io(_) => FailureCause::Infra,
        }
    }
}

/// What a successful compile hands back.
#[derive(Debug, Clone)]
pub struct CompileOutput {
    pub binary: PathBuf,
    pub mapping: Option<PathBuf>,
}

/// External build tooling used by the compile and sign stages.
#[async_trait]
pub trait Toolchain: Send + Sync + 'static {
    /// Name and versions recorded in the build result.
    fn info(&self) -> ToolchainInfo;

    /// Compile the prepared workspace into an unsigned binary.
    async fn compile(&self, workspace: &Path, app: &AppConfig) -> Result<CompileOutput, ToolError>;

    /// Sign a compiled binary, producing the distribution bundle.
    async fn sign(
        &self,
        workspace: &Path,
        binary: &Path,
        signing: &SigningConfig,
    ) -> Result<PathBuf, ToolError>;
}

/// Shell command lines for [`ShellToolchain`].
#[derive(Debug, Clone)]
pub struct ShellCommands {
    /// Run in the workspace root; must write [`COMPILE_OUTPUT`].
    pub compile: String,
    /// Run in the workspace root; must write [`SIGNED_OUTPUT`].
    pub sign: String,
}

/// Toolchain that shells out to configured commands.
///
/// Commands run with the workspace as working directory and receive the job
/// context through `FORGE_*` environment variables.
pub struct ShellToolchain {
    commands: ShellCommands,
    info: ToolchainInfo,
}

impl ShellToolchain {
    pub fn new(commands: ShellCommands, info: ToolchainInfo) -> Self {
        Self { commands, info }
    }

    async fn run(
        &self,
        tool: &str,
        command: &str,
        workspace: &Path,
        env: &[(&str, String)],
    ) -> Result<(), ToolError> {
        info!(tool, "running toolchain command");
        let mut cmd = tokio::process::Command::new("sh");
        cmd.arg("-c")
            .arg(command)
            .current_dir(workspace)
            .env("FORGE_WORKSPACE", workspace);
        for (key, value) in env {
            cmd.env(key, value);
        }

        let output = cmd.output().await.map_err(|source| ToolError::Spawn {
            tool: tool.to_string(),
            source,
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let tail: Vec<&str> = stderr.lines().rev().take(STDERR_TAIL_LINES).collect();
            let stderr_tail = tail.into_iter().rev().collect::<Vec<_>>().join("\n");
            return Err(ToolError::CommandFailed {
                tool: tool.to_string(),
                status: output.status.code().unwrap_or(-1),
                stderr_tail,
            });
        }
        Ok(())
    }

    fn require(tool: &str, path: PathBuf) -> Result<PathBuf, ToolError> {
        if path.is_file() {
            Ok(path)
        } else {
            Err(ToolError::MissingOutput {
                tool: tool.to_string(),
                path: path.display().to_string(),
            })
        }
    }
}

#[async_trait]
impl Toolchain for ShellToolchain {
    fn info(&self) -> ToolchainInfo {
        self.info.clone()
    }

    async fn compile(&self, workspace: &Path, app: &AppConfig) -> Result<CompileOutput, ToolError> {
        let env = [
            ("FORGE_PACKAGE", app.package_name.clone()),
            ("FORGE_VERSION", app.version.clone()),
            ("FORGE_VERSION_CODE", app.version_code.to_string()),
        ];
        self.run("compile", &self.commands.compile, workspace, &env)
            .await?;

        let binary = Self::require("compile", workspace.join(COMPILE_OUTPUT))?;
        let mapping = workspace.join(MAPPING_OUTPUT);
        Ok(CompileOutput {
            binary,
            mapping: mapping.is_file().then_some(mapping),
        })
    }

    async fn sign(
        &self,
        workspace: &Path,
        binary: &Path,
        signing: &SigningConfig,
    ) -> Result<PathBuf, ToolError> {
        let env = [
            ("FORGE_UNSIGNED", binary.display().to_string()),
            ("FORGE_KEYSTORE", signing.keystore.display().to_string()),
            ("FORGE_KEY_ALIAS", signing.key_alias.clone()),
        ];
        self.run("sign", &self.commands.sign, workspace, &env)
            .await?;
        Self::require("sign", workspace.join(SIGNED_OUTPUT))
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeToolchain;

#[cfg(any(test, feature = "test-support"))]
mod fake {
    use super::*;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    /// In-process toolchain for tests: no external commands, configurable
    /// latency and failure injection, and counters for concurrency checks.
    #[derive(Clone)]
    pub struct FakeToolchain {
        compile_delay: Duration,
        fail_compile: bool,
        fail_sign: bool,
        running: Arc<AtomicUsize>,
        max_running: Arc<AtomicUsize>,
        compiles: Arc<parking_lot::Mutex<Vec<String>>>,
    }

    impl FakeToolchain {
        pub fn new() -> Self {
            Self::with_delay(Duration::ZERO)
        }

        /// Compile takes `delay` before finishing.
        pub fn with_delay(delay: Duration) -> Self {
            Self {
                compile_delay: delay,
                fail_compile: false,
                fail_sign: false,
                running: Arc::new(AtomicUsize::new(0)),
                max_running: Arc::new(AtomicUsize::new(0)),
                compiles: Arc::new(parking_lot::Mutex::new(Vec::new())),
            }
        }

        pub fn failing_compile() -> Self {
            Self {
                fail_compile: true,
                ..Self::new()
            }
        }

        pub fn failing_sign() -> Self {
            Self {
                fail_sign: true,
                ..Self::new()
            }
        }

        /// Workspace names (job ids) whose compile was entered, in order.
        pub fn compiles_started(&self) -> Vec<String> {
            self.compiles.lock().clone()
        }

        /// High-water mark of concurrently running compiles.
        pub fn max_concurrent(&self) -> usize {
            self.max_running.load(Ordering::SeqCst)
        }

        fn enter(&self, workspace: &Path) {
            let name = workspace
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            self.compiles.lock().push(name);
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_running.fetch_max(now, Ordering::SeqCst);
        }

        fn exit(&self) {
            self.running.fetch_sub(1, Ordering::SeqCst);
        }
    }

    impl Default for FakeToolchain {
        fn default() -> Self {
            Self::new()
        }
    }

    struct ExitGuard<'a>(&'a FakeToolchain);

    impl Drop for ExitGuard<'_> {
        fn drop(&mut self) {
            self.0.exit();
        }
    }

    #[async_trait]
    impl Toolchain for FakeToolchain {
        fn info(&self) -> ToolchainInfo {
            ToolchainInfo {
                name: "fakec".to_string(),
                version: "0.0.1".to_string(),
                sdk: None,
            }
        }

        async fn compile(
            &self,
            workspace: &Path,
            app: &AppConfig,
        ) -> Result<CompileOutput, ToolError> {
            self.enter(workspace);
            let _guard = ExitGuard(self);

            if !self.compile_delay.is_zero() {
                tokio::time::sleep(self.compile_delay).await;
            }
            if self.fail_compile {
                return Err(ToolError::CommandFailed {
                    tool: "fakec".to_string(),
                    status: 1,
                    stderr_tail: format!("synthetic compile failure for {}", app.package_name),
                });
            }

            let binary = workspace.join(COMPILE_OUTPUT);
            fs::write(&binary, format!("binary for {}", app.package_name))?;
            Ok(CompileOutput {
                binary,
                mapping: None,
            })
        }

        async fn sign(
            &self,
            workspace: &Path,
            binary: &Path,
            signing: &SigningConfig,
        ) -> Result<PathBuf, ToolError> {
            if self.fail_sign {
                return Err(ToolError::CommandFailed {
                    tool: "fakesign".to_string(),
                    status: 1,
                    stderr_tail: format!("keystore {} rejected", signing.keystore.display()),
                });
            }
            let unsigned = fs::read(binary)?;
            let signed = workspace.join(SIGNED_OUTPUT);
            fs::write(&signed, [b"signed:".as_slice(), &unsigned].concat())?;
            Ok(signed)
        }
    }
}

#[cfg(test)]
#[path = "toolchain_tests.rs"]
mod tests;
