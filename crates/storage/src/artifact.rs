// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Content-addressed artifact storage.
//!
//! Artifact bytes live under `objects/<sha256>`; identical content is stored
//! once. Each `put` issues a retrieval reference (a record under `refs/`)
//! that may carry an expiry. Reads re-verify the checksum: a mismatch is a
//! hard error, never silently served. Expired references are reported
//! distinctly from missing ones so callers can prompt a rebuild rather than
//! assume permanent deletion.

use forge_core::{ArtifactKind, Clock, IdGen, JobId, SystemClock, UuidIdGen};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt::Write as _;
use std::fs::{self, File};
use std::io::Write as _;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors from artifact store operations
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("artifact not found")]
    NotFound,
    #[error("artifact reference expired")]
    Expired,
    #[error("checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result of storing an artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredArtifact {
    /// Hex sha-256 of the content.
    pub checksum: String,
    /// Opaque retrieval reference (valid until its expiry, if any).
    pub reference: String,
    pub size: u64,
}

/// Public view of a reference record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactRecord {
    pub name: String,
    pub kind: ArtifactKind,
    pub job_id: JobId,
    pub size: u64,
    pub checksum: String,
}

/// On-disk reference record.
#[derive(Debug, Serialize, Deserialize)]
struct RefRecord {
    checksum: String,
    name: String,
    kind: ArtifactKind,
    job_id: JobId,
    size: u64,
    created_at_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expires_at_ms: Option<u64>,
}

/// Content-addressed artifact store rooted at a directory.
pub struct ArtifactStore<C: Clock = SystemClock, G: IdGen = UuidIdGen> {
    root: PathBuf,
    /// Reference time-to-live; `None` means references never expire.
    ttl_ms: Option<u64>,
    clock: C,
    ids: G,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>, ttl_ms: Option<u64>) -> Self {
        Self::with_parts(root, ttl_ms, SystemClock, UuidIdGen)
    }
}

impl<C: Clock, G: IdGen> ArtifactStore<C, G> {
    /// Construct with explicit clock and id generator (for tests).
    pub fn with_parts(root: impl Into<PathBuf>, ttl_ms: Option<u64>, clock: C, ids: G) -> Self {
        Self {
            root: root.into(),
            ttl_ms,
            clock,
            ids,
        }
    }

    fn object_path(&self, checksum: &str) -> PathBuf {
        self.root.join("objects").join(checksum)
    }

    fn ref_path(&self, reference: &str) -> PathBuf {
        self.root.join("refs").join(format!("{reference}.json"))
    }

    /// Store artifact bytes and issue a retrieval reference.
    ///
    /// Content is deduplicated by checksum; the reference record is written
    /// atomically (tmp + rename) so a crash never leaves a dangling ref.
    pub fn put(
        &self,
        job_id: &JobId,
        name: &str,
        kind: ArtifactKind,
        bytes: &[u8],
    ) -> Result<StoredArtifact, ArtifactError> {
        let checksum = sha256_hex(bytes);

        let object_path = self.object_path(&checksum);
        if !object_path.exists() {
            if let Some(parent) = object_path.parent() {
                fs::create_dir_all(parent)?;
            }
            let tmp_path = object_path.with_extension("tmp");
            {
                let mut file = File::create(&tmp_path)?;
                file.write_all(bytes)?;
                file.sync_all()?;
            }
            fs::rename(&tmp_path, &object_path)?;
        }

        let now = self.clock.epoch_ms();
        let record = RefRecord {
            checksum: checksum.clone(),
            name: name.to_string(),
            kind,
            job_id: job_id.clone(),
            size: bytes.len() as u64,
            created_at_ms: now,
            expires_at_ms: self.ttl_ms.map(|ttl| now + ttl),
        };

        let reference = self.ids.next();
        let ref_path = self.ref_path(&reference);
        if let Some(parent) = ref_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp_path = ref_path.with_extension("tmp");
        {
            let mut file = File::create(&tmp_path)?;
            file.write_all(&serde_json::to_vec(&record)?)?;
            file.sync_all()?;
        }
        fs::rename(&tmp_path, &ref_path)?;

        Ok(StoredArtifact {
            checksum,
            reference,
            size: bytes.len() as u64,
        })
    }

    /// Metadata for a live reference, without reading the content.
    pub fn stat(&self, reference: &str) -> Result<ArtifactRecord, ArtifactError> {
        let record = self.load_ref(reference)?;
        if let Some(expires_at_ms) = record.expires_at_ms {
            if self.clock.epoch_ms() >= expires_at_ms {
                return Err(ArtifactError::Expired);
            }
        }
        Ok(ArtifactRecord {
            name: record.name,
            kind: record.kind,
            job_id: record.job_id,
            size: record.size,
            checksum: record.checksum,
        })
    }

    /// Resolve a reference to artifact bytes, re-verifying the checksum.
    pub fn get(&self, reference: &str) -> Result<Vec<u8>, ArtifactError> {
        let record = self.load_ref(reference)?;

        if let Some(expires_at_ms) = record.expires_at_ms {
            if self.clock.epoch_ms() >= expires_at_ms {
                return Err(ArtifactError::Expired);
            }
        }

        let object_path = self.object_path(&record.checksum);
        let bytes = match fs::read(&object_path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ArtifactError::NotFound)
            }
            Err(e) => return Err(e.into()),
        };

        let actual = sha256_hex(&bytes);
        if actual != record.checksum {
            return Err(ArtifactError::ChecksumMismatch {
                expected: record.checksum,
                actual,
            });
        }

        Ok(bytes)
    }

    /// Remove expired references and any objects no live reference points to.
    pub fn sweep_expired(&self) -> Result<usize, ArtifactError> {
        let refs_dir = self.root.join("refs");
        if !refs_dir.exists() {
            return Ok(0);
        }

        let now = self.clock.epoch_ms();
        let mut removed = 0;
        let mut live_checksums = std::collections::HashSet::new();

        for dir_entry in fs::read_dir(&refs_dir)? {
            let path = dir_entry?.path();
            let record: RefRecord = match File::open(&path)
                .map_err(ArtifactError::from)
                .and_then(|f| serde_json::from_reader(f).map_err(ArtifactError::from))
            {
                Ok(r) => r,
                Err(_) => continue,
            };

            match record.expires_at_ms {
                Some(expires_at_ms) if now >= expires_at_ms => {
                    fs::remove_file(&path)?;
                    removed += 1;
                }
                _ => {
                    live_checksums.insert(record.checksum);
                }
            }
        }

        let objects_dir = self.root.join("objects");
        if objects_dir.exists() {
            for dir_entry in fs::read_dir(&objects_dir)? {
                let path = dir_entry?.path();
                let name = path.file_name().and_then(|n| n.to_str());
                if let Some(checksum) = name {
                    if !live_checksums.contains(checksum) && path.extension().is_none() {
                        fs::remove_file(&path)?;
                    }
                }
            }
        }

        Ok(removed)
    }

    fn load_ref(&self, reference: &str) -> Result<RefRecord, ArtifactError> {
        let path = self.ref_path(reference);
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ArtifactError::NotFound)
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_reader(file)?)
    }
}

/// Hex-encoded sha-256 digest.
pub(crate) fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut out = String::with_capacity(64);
    for byte in digest {
        let _ = write!(out, "{byte:02x}");
    }
    out
}

#[cfg(test)]
#[path = "artifact_tests.rs"]
mod tests;
