// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn job_id_display() {
    let id = JobId::new("test-job");
    assert_eq!(id.to_string(), "test-job");
}

#[test]
fn job_id_equality() {
    let id1 = JobId::new("job-1");
    let id2 = JobId::new("job-1");
    let id3 = JobId::new("job-2");

    assert_eq!(id1, id2);
    assert_ne!(id1, id3);
}

#[test]
fn job_id_from_str() {
    let id: JobId = "test".into();
    assert_eq!(id.as_str(), "test");
}

#[test]
fn job_id_serde() {
    let id = JobId::new("my-job");
    let json = serde_json::to_string(&id).unwrap();
    assert_eq!(json, "\"my-job\"");

    let parsed: JobId = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, id);
}

#[test]
fn short_truncates() {
    let id = JobId::new("abcdef-123456");
    assert_eq!(id.short(6), "abcdef");
    assert_eq!(id.short(100), "abcdef-123456");
}

#[test]
fn short_never_splits_a_multibyte_character() {
    // 'ä' is two bytes; a cut at 1 lands mid-character
    let id = JobId::new("äbc");
    assert_eq!(id.short(1), "äbc");
    assert_eq!(id.short(2), "ä");
    assert_eq!("äbc".short(1), "äbc");
}

#[test]
fn uuid_gen_unique() {
    let gen = UuidIdGen;
    assert_ne!(gen.next(), gen.next());
}

#[test]
fn sequential_gen_counts() {
    let gen = SequentialIdGen::new("job");
    assert_eq!(gen.next(), "job-1");
    assert_eq!(gen.next(), "job-2");

    // Clones share the counter
    let clone = gen.clone();
    assert_eq!(clone.next(), "job-3");
    assert_eq!(gen.next(), "job-4");
}
