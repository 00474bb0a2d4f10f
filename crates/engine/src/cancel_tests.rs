// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::time::Duration;

#[tokio::test]
async fn token_starts_uncancelled() {
    let (handle, token) = cancel_pair();
    assert!(!token.is_cancelled());
    assert!(!handle.is_cancelled());
}

#[tokio::test]
async fn cancel_flips_the_token() {
    let (handle, token) = cancel_pair();
    handle.cancel();
    assert!(token.is_cancelled());
    // Idempotent
    handle.cancel();
    assert!(token.is_cancelled());
}

#[tokio::test]
async fn cancelled_resolves_after_signal() {
    let (handle, mut token) = cancel_pair();

    let waiter = tokio::spawn(async move {
        token.cancelled().await;
    });
    handle.cancel();

    tokio::time::timeout(Duration::from_secs(1), waiter)
        .await
        .expect("cancelled() should resolve")
        .unwrap();
}

#[tokio::test]
async fn cancelled_resolves_immediately_when_already_set() {
    let (handle, mut token) = cancel_pair();
    handle.cancel();
    tokio::time::timeout(Duration::from_millis(50), token.cancelled())
        .await
        .expect("already-cancelled token should resolve at once");
}

#[tokio::test]
async fn cloned_tokens_observe_the_same_signal() {
    let (handle, token) = cancel_pair();
    let clone = token.clone();
    handle.cancel();
    assert!(token.is_cancelled());
    assert!(clone.is_cancelled());
}

#[tokio::test]
async fn dropped_handle_never_resolves() {
    let (handle, mut token) = cancel_pair();
    drop(handle);

    let result = tokio::time::timeout(Duration::from_millis(50), token.cancelled()).await;
    assert!(result.is_err(), "token must pend forever without a signal");
    assert!(!token.is_cancelled());
}
