// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[test]
fn weights_sum_to_100() {
    let total: u32 = Stage::SEQUENCE.iter().map(|s| u32::from(s.weight())).sum();
    assert_eq!(total, 100);
}

#[test]
fn compile_carries_largest_weight() {
    for stage in Stage::SEQUENCE {
        if stage != Stage::Compile {
            assert!(stage.weight() < Stage::Compile.weight(), "{stage}");
        }
    }
}

#[test]
fn offsets_are_cumulative() {
    assert_eq!(Stage::Init.offset(), 0);
    assert_eq!(Stage::Branding.offset(), 5);
    assert_eq!(Stage::Compile.offset(), 25);
    assert_eq!(Stage::Verify.progress_done(), 100);
}

#[parameterized(
    start = { 0.0, 25 },
    midway = { 0.5, 50 },
    done = { 1.0, 75 },
    over = { 1.5, 75 },
    negative = { -1.0, 25 },
)]
fn compile_progress_within_band(fraction: f32, expected: u8) {
    assert_eq!(Stage::Compile.progress_at(fraction), expected);
}

#[test]
fn progress_is_monotone_across_sequence() {
    let mut last = 0;
    for stage in Stage::SEQUENCE {
        assert!(stage.progress_at(0.0) >= last);
        assert!(stage.progress_done() >= stage.progress_at(0.0));
        last = stage.progress_done();
    }
    assert_eq!(last, 100);
}

#[test]
fn stage_serde_snake_case() {
    let json = serde_json::to_string(&Stage::Compile).unwrap();
    assert_eq!(json, "\"compile\"");
    let parsed: Stage = serde_json::from_str("\"sign\"").unwrap();
    assert_eq!(parsed, Stage::Sign);
}
