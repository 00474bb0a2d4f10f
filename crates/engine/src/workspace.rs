// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Isolated per-job build workspace.
//!
//! Each run gets a fresh directory under the builds root, named by job id.
//! Nothing is shared between jobs; teardown removes the whole tree on every
//! exit path, success or not.

use forge_core::JobId;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Directory layout for one build run.
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    /// Create a fresh workspace for a job, clobbering any stale leftover
    /// from a previous run of the same id.
    pub fn create(builds_dir: &Path, job_id: &JobId) -> io::Result<Self> {
        let root = builds_dir.join(job_id.as_str());
        if root.exists() {
            fs::remove_dir_all(&root)?;
        }
        for sub in ["src", "res", "build", "out"] {
            fs::create_dir_all(root.join(sub))?;
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Template sources, substituted in place during branding.
    pub fn src_dir(&self) -> PathBuf {
        self.root.join("src")
    }

    /// Generated resources (colors, strings, feature flags).
    pub fn res_dir(&self) -> PathBuf {
        self.root.join("res")
    }

    /// Toolchain outputs.
    pub fn build_dir(&self) -> PathBuf {
        self.root.join("build")
    }

    /// Packaged artifacts awaiting verification.
    pub fn out_dir(&self) -> PathBuf {
        self.root.join("out")
    }

    /// Remove the workspace tree.
    pub fn teardown(self) -> io::Result<()> {
        fs::remove_dir_all(&self.root)
    }
}

/// Remove every leftover workspace under the builds root.
///
/// Run at daemon startup: any directory present then belongs to a build that
/// died with the previous process.
pub fn sweep_stale(builds_dir: &Path) -> io::Result<usize> {
    if !builds_dir.exists() {
        return Ok(0);
    }
    let mut removed = 0;
    for entry in fs::read_dir(builds_dir)? {
        let path = entry?.path();
        if path.is_dir() {
            fs::remove_dir_all(&path)?;
            removed += 1;
        }
    }
    Ok(removed)
}

#[cfg(test)]
#[path = "workspace_tests.rs"]
mod tests;
