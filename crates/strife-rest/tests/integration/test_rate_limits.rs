//! Rate-limit and ordering semantics, driven through a scripted transport.
//!
//! These tests run with `start_paused = true`: every delay measured here is
//! paused-clock time, so five-second windows execute instantly while the
//! recorded timestamps still prove the engine waited.

use std::time::Duration;

use serde_json::json;
use strife_rest::{Method, RequestOptions, RestError};
use tokio::time::Instant;

use crate::common::{
    ok, ok_with, rate_limited, respond, scripted_manager, until, Script, ScriptedTransport,
};

const MESSAGES: &str = "/channels/123/messages";

// ============================================================================
// Ordering
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_same_bucket_executes_in_enqueue_order() {
    let transport = ScriptedTransport::new();
    let rest = scripted_manager(&transport);

    let (a, b, c) = tokio::join!(
        rest.post(MESSAGES, Some(json!({ "n": 1 }))),
        rest.post(MESSAGES, Some(json!({ "n": 2 }))),
        rest.post(MESSAGES, Some(json!({ "n": 3 }))),
    );
    a.unwrap();
    b.unwrap();
    c.unwrap();

    let calls = transport.calls();
    assert!(calls.iter().all(|call| call.method == Method::POST));

    let sent: Vec<i64> = calls
        .iter()
        .map(|call| call.body.as_ref().unwrap()["n"].as_i64().unwrap())
        .collect();
    assert_eq!(sent, vec![1, 2, 3]);
}

#[tokio::test(start_paused = true)]
async fn test_different_buckets_run_concurrently() {
    let transport = ScriptedTransport::new();
    let rest = scripted_manager(&transport);

    // Exhaust bucket 123 up front; bucket 456 must not be affected.
    transport.script(
        MESSAGES,
        [respond(200)
            .header("x-ratelimit-remaining", "0")
            .header("x-ratelimit-reset-after", "60")
            .into()],
    );
    rest.get(MESSAGES).await.unwrap();

    let start = Instant::now();
    rest.get("/channels/456/messages").await.unwrap();
    assert!(start.elapsed() < Duration::from_secs(1));
}

// ============================================================================
// Window exhaustion
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_exhausted_window_delays_next_dispatch() {
    let transport = ScriptedTransport::new();
    let rest = scripted_manager(&transport);

    transport.script(
        MESSAGES,
        [
            respond(200)
                .header("x-ratelimit-limit", "2")
                .header("x-ratelimit-remaining", "1")
                .into(),
            respond(200)
                .header("x-ratelimit-limit", "2")
                .header("x-ratelimit-remaining", "0")
                .header("x-ratelimit-reset-after", "5")
                .into(),
            ok(),
        ],
    );

    let start = Instant::now();
    let (a, b, c) = tokio::join!(
        rest.post(MESSAGES, Some(json!({ "n": 1 }))),
        rest.post(MESSAGES, Some(json!({ "n": 2 }))),
        rest.post(MESSAGES, Some(json!({ "n": 3 }))),
    );
    a.unwrap();
    b.unwrap();
    c.unwrap();

    let calls = transport.calls();
    assert_eq!(calls.len(), 3);

    // First two go out back-to-back; the third waits out the window.
    assert!(calls[1].at.duration_since(start) < Duration::from_secs(1));
    assert!(calls[2].at.duration_since(start) >= Duration::from_secs(5));
}

// ============================================================================
// 429 handling
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_bucket_429_is_resent_after_delay_and_succeeds() {
    let transport = ScriptedTransport::new();
    let rest = scripted_manager(&transport);

    transport.script(
        MESSAGES,
        [
            rate_limited(2.0, false),
            ok_with(json!({ "id": "first" })),
            ok_with(json!({ "id": "second" })),
        ],
    );

    let start = Instant::now();
    let (a, b) = tokio::join!(
        rest.post(MESSAGES, Some(json!({ "n": 1 }))),
        rest.post(MESSAGES, Some(json!({ "n": 2 }))),
    );

    // The rate-limited call resolves with the eventual success value.
    assert_eq!(a.unwrap()["id"], "first");
    assert_eq!(b.unwrap()["id"], "second");

    let calls = transport.calls();
    let sent: Vec<i64> = calls
        .iter()
        .map(|call| call.body.as_ref().unwrap()["n"].as_i64().unwrap())
        .collect();

    // The retried envelope runs again *before* the later enqueue.
    assert_eq!(sent, vec![1, 1, 2]);
    assert!(calls[1].at.duration_since(start) >= Duration::from_secs(2));
}

#[tokio::test(start_paused = true)]
async fn test_global_429_delays_unrelated_bucket() {
    let transport = ScriptedTransport::new();
    let rest = scripted_manager(&transport);

    transport.script(MESSAGES, [rate_limited(1.0, true), ok()]);

    let start = Instant::now();
    let first = tokio::spawn({
        let rest = rest.clone();
        async move { rest.post(MESSAGES, Some(json!({ "n": 1 }))).await }
    });

    until("global throttle tripped", || {
        rest.global_throttle().is_tripped()
    })
    .await;

    // This bucket has never seen a response and would otherwise send
    // immediately.
    rest.get("/channels/456/messages").await.unwrap();

    let other = transport.calls_for("/channels/456/messages");
    assert_eq!(other.len(), 1);
    assert!(other[0].at.duration_since(start) >= Duration::from_secs(1));

    first.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_repeated_429_exhausts_retry_budget() {
    let transport = ScriptedTransport::new();
    let rest = scripted_manager(&transport);

    transport.script(
        MESSAGES,
        [rate_limited(0.01, false), rate_limited(0.01, false)],
    );

    let error = rest.post(MESSAGES, None).await.unwrap_err();
    match error {
        RestError::RateLimitExhausted { global, .. } => assert!(!global),
        other => panic!("expected RateLimitExhausted, got {other:?}"),
    }

    // Default budget of 1: the original attempt plus one retry.
    assert_eq!(transport.calls().len(), 2);
}

// ============================================================================
// Client and server errors
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_client_error_resolves_immediately_without_retry() {
    let transport = ScriptedTransport::new();
    let rest = scripted_manager(&transport);

    transport.script(
        "/channels/999",
        [respond(404)
            .body(json!({ "message": "Unknown Channel", "code": 10003 }))
            .into()],
    );

    let error = rest.get("/channels/999").await.unwrap_err();
    match &error {
        RestError::Client { status, error, .. } => {
            assert_eq!(*status, 404);
            assert_eq!(error.as_ref().unwrap().code, Some(10003));
        }
        other => panic!("expected Client, got {other:?}"),
    }
    assert_eq!(transport.calls().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_server_error_retries_with_backoff_then_succeeds() {
    let transport = ScriptedTransport::new();
    let rest = scripted_manager(&transport);

    transport.script(
        MESSAGES,
        [
            Script::Respond(respond(500).body(json!({ "message": "upstream died" }))),
            ok_with(json!({ "id": "ok" })),
        ],
    );

    let start = Instant::now();
    let value = rest.post(MESSAGES, None).await.unwrap();
    assert_eq!(value["id"], "ok");

    let calls = transport.calls();
    assert_eq!(calls.len(), 2);
    // First backoff step is one second.
    assert!(calls[1].at.duration_since(start) >= Duration::from_secs(1));
}

#[tokio::test(start_paused = true)]
async fn test_server_error_exhausts_retry_budget() {
    let transport = ScriptedTransport::new();
    let rest = scripted_manager(&transport);

    transport.script(
        MESSAGES,
        [
            Script::Respond(respond(500)),
            Script::Respond(respond(502)),
        ],
    );

    let error = rest.post(MESSAGES, None).await.unwrap_err();
    match error {
        RestError::ServerExhausted { status, .. } => assert_eq!(status, 502),
        other => panic!("expected ServerExhausted, got {other:?}"),
    }
    assert_eq!(transport.calls().len(), 2);
}

// ============================================================================
// Transport failures and timeouts
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_network_error_is_retried_then_succeeds() {
    let transport = ScriptedTransport::new();
    let rest = scripted_manager(&transport);

    transport.script(MESSAGES, [Script::NetworkError, ok_with(json!({ "id": "ok" }))]);

    let value = rest.post(MESSAGES, None).await.unwrap();
    assert_eq!(value["id"], "ok");
    assert_eq!(transport.calls().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_timeout_is_terminal_with_zero_budget() {
    let transport = ScriptedTransport::new();
    let rest = scripted_manager(&transport);

    transport.script(MESSAGES, [Script::Timeout]);

    let error = rest
        .request(
            Method::POST,
            MESSAGES,
            RequestOptions::new().retry_limit(0),
        )
        .await
        .unwrap_err();
    assert!(matches!(error, RestError::Timeout { .. }));
    assert_eq!(transport.calls().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_queued_request_past_its_deadline_is_abandoned() {
    let transport = ScriptedTransport::new();
    let rest = scripted_manager(&transport);

    transport.script(
        MESSAGES,
        [respond(200)
            .header("x-ratelimit-remaining", "0")
            .header("x-ratelimit-reset-after", "5")
            .into()],
    );

    // Exhaust the window, then queue a call that times out before the
    // window reopens.
    rest.get(MESSAGES).await.unwrap();
    let error = rest
        .request(
            Method::GET,
            MESSAGES,
            RequestOptions::new().timeout(Duration::from_secs(1)),
        )
        .await
        .unwrap_err();

    assert!(matches!(error, RestError::Timeout { .. }));
    // The expired envelope was never sent.
    assert_eq!(transport.calls().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_abandoned_caller_does_not_stall_the_queue() {
    let transport = ScriptedTransport::new();
    let rest = scripted_manager(&transport);

    transport.script(
        MESSAGES,
        [
            respond(200)
                .header("x-ratelimit-remaining", "0")
                .header("x-ratelimit-reset-after", "2")
                .into(),
            ok_with(json!({ "id": "after" })),
        ],
    );

    rest.get(MESSAGES).await.unwrap();

    // Enqueue and walk away before the window reopens.
    let abandoned =
        tokio::time::timeout(Duration::from_millis(10), rest.get(MESSAGES)).await;
    assert!(abandoned.is_err());

    // The next caller still gets served once the window resets.
    let value = rest.get(MESSAGES).await.unwrap();
    assert_eq!(value["id"], "after");

    // The abandoned envelope was dropped, not sent.
    assert_eq!(transport.calls().len(), 2);
}

// ============================================================================
// Bucket discovery
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_discovered_bucket_serializes_routes_sharing_it() {
    let transport = ScriptedTransport::new();
    let rest = scripted_manager(&transport);

    let messages = "/channels/111/messages";
    let invites = "/channels/111/invites";

    // Both routes report the same server-assigned bucket hash.
    transport.script(
        messages,
        [
            Script::Respond(respond(200).header("x-ratelimit-bucket", "a1b2c3")),
            respond(200)
                .header("x-ratelimit-bucket", "a1b2c3")
                .header("x-ratelimit-remaining", "0")
                .header("x-ratelimit-reset-after", "5")
                .into(),
        ],
    );
    transport.script(
        invites,
        [Script::Respond(respond(200).header("x-ratelimit-bucket", "a1b2c3"))],
    );

    // Prime both routes so the shared bucket is discovered.
    rest.get(messages).await.unwrap();
    rest.get(invites).await.unwrap();

    // Exhaust the shared bucket through the messages route...
    let exhausted_at = Instant::now();
    rest.get(messages).await.unwrap();

    // ...and the invites route must now wait for the same window.
    rest.get(invites).await.unwrap();

    let invite_calls = transport.calls_for(invites);
    assert_eq!(invite_calls.len(), 2);
    assert!(invite_calls[1].at.duration_since(exhausted_at) >= Duration::from_secs(5));
}

// ============================================================================
// Shutdown
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_shutdown_resolves_queued_requests() {
    let transport = ScriptedTransport::new();
    let rest = scripted_manager(&transport);

    transport.script(
        MESSAGES,
        [respond(200)
            .header("x-ratelimit-remaining", "0")
            .header("x-ratelimit-reset-after", "3600")
            .into()],
    );

    rest.get(MESSAGES).await.unwrap();

    // This one is stuck behind an hour-long window.
    let queued = tokio::spawn({
        let rest = rest.clone();
        async move { rest.get(MESSAGES).await }
    });

    // Let the queued request reach its drain loop, without touching the
    // clock (a sleep here would let the paused clock auto-advance through
    // the whole window).
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }

    rest.shutdown();

    let result = queued.await.unwrap();
    assert!(matches!(result, Err(RestError::Shutdown)));

    // Only the priming request ever reached the transport.
    assert_eq!(transport.calls().len(), 1);

    // New work is refused outright.
    let refused = rest.get(MESSAGES).await;
    assert!(matches!(refused, Err(RestError::Shutdown)));
}

#[tokio::test(start_paused = true)]
async fn test_explicit_bucket_hint_serializes_unrelated_paths() {
    let transport = ScriptedTransport::new();
    let rest = scripted_manager(&transport);

    transport.script(
        "/channels/1/messages",
        [respond(200)
            .header("x-ratelimit-remaining", "0")
            .header("x-ratelimit-reset-after", "3")
            .into()],
    );

    let hint = "interactions/shared";
    rest.request(
        Method::GET,
        "/channels/1/messages",
        RequestOptions::new().bucket(hint),
    )
    .await
    .unwrap();

    // A different path forced onto the same bucket inherits its window.
    let start = Instant::now();
    rest.request(
        Method::GET,
        "/channels/2/messages",
        RequestOptions::new().bucket(hint),
    )
    .await
    .unwrap();

    let calls = transport.calls();
    assert!(calls[1].at.duration_since(start) >= Duration::from_secs(3));
}
