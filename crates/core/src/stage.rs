// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fixed build stage sequence and progress weighting.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One ordered phase of the build pipeline.
///
/// The sequence is fixed; stages are never skipped or reordered. A stage may
/// be a no-op for a given configuration (signing for unsigned outputs), but
/// it still runs and still emits its progress event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Set up the isolated build workspace.
    Init,
    /// Apply partner branding via template substitution.
    Branding,
    /// Generate resource sets (colors, strings, feature flags).
    Resources,
    /// Compile the app. The longest stage; carries the largest weight.
    Compile,
    /// Sign outputs (no-op for unsigned builds).
    Sign,
    /// Package artifacts for storage.
    Package,
    /// Verify outputs and register artifacts.
    Verify,
}

impl Stage {
    /// The full stage sequence in execution order.
    pub const SEQUENCE: [Stage; 7] = [
        Stage::Init,
        Stage::Branding,
        Stage::Resources,
        Stage::Compile,
        Stage::Sign,
        Stage::Package,
        Stage::Verify,
    ];

    /// Progress weight of this stage. Weights sum to exactly 100.
    pub fn weight(&self) -> u8 {
        match self {
            Stage::Init => 5,
            Stage::Branding => 10,
            Stage::Resources => 10,
            Stage::Compile => 50,
            Stage::Sign => 5,
            Stage::Package => 10,
            Stage::Verify => 10,
        }
    }

    /// Sum of the weights of all stages before this one.
    pub fn offset(&self) -> u8 {
        Stage::SEQUENCE
            .iter()
            .take_while(|s| **s != *self)
            .map(|s| s.weight())
            .sum()
    }

    /// Overall job progress at `fraction` (0.0–1.0) through this stage.
    ///
    /// Clamped so a stage can never report past its own weight band; the
    /// result is monotone across the sequence.
    pub fn progress_at(&self, fraction: f32) -> u8 {
        let fraction = fraction.clamp(0.0, 1.0);
        let within = (f32::from(self.weight()) * fraction).floor() as u8;
        self.offset().saturating_add(within).min(100)
    }

    /// Progress after this stage has fully completed.
    pub fn progress_done(&self) -> u8 {
        self.offset().saturating_add(self.weight()).min(100)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Stage::Init => "init",
            Stage::Branding => "branding",
            Stage::Resources => "resources",
            Stage::Compile => "compile",
            Stage::Sign => "sign",
            Stage::Package => "package",
            Stage::Verify => "verify",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
#[path = "stage_tests.rs"]
mod tests;
