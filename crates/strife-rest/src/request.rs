//! Per-call options and the internal request envelope.

use std::time::Duration;

use reqwest::{header::HeaderMap, Method};
use serde_json::Value;
use tokio::{sync::oneshot, time::Instant};
use tracing::debug;

use crate::{error::RestError, route::Route, transport::HttpResponse};

/// Per-call options accepted by the dispatcher.
///
/// Everything is optional; unset fields fall back to the dispatcher's
/// configured defaults.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// JSON body to send
    pub body: Option<Value>,
    /// Header overrides for this call only
    pub headers: HeaderMap,
    /// Retry budget override (default: the configured retry limit)
    pub retry_limit: Option<u32>,
    /// Explicit bucket key, taking precedence over the computed route key
    pub bucket: Option<String>,
    /// Resolve with the raw transport response instead of a parsed body
    pub raw_response: bool,
    /// Timeout override for this call only
    pub timeout: Option<Duration>,
}

impl RequestOptions {
    /// Creates empty options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the JSON body.
    pub fn body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Adds a header override for this call.
    pub fn header(mut self, name: reqwest::header::HeaderName, value: reqwest::header::HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Overrides the retry budget for this call.
    pub fn retry_limit(mut self, retry_limit: u32) -> Self {
        self.retry_limit = Some(retry_limit);
        self
    }

    /// Forces this call onto an explicit bucket key.
    pub fn bucket(mut self, bucket: impl Into<String>) -> Self {
        self.bucket = Some(bucket.into());
        self
    }

    /// Resolves with the raw transport response instead of a parsed body.
    pub fn raw_response(mut self, raw: bool) -> Self {
        self.raw_response = raw;
        self
    }

    /// Overrides the timeout for this call.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// What a resolved envelope hands back to the dispatcher.
#[derive(Debug)]
pub(crate) enum Reply {
    /// Parsed JSON body (`Value::Null` for empty/204 responses)
    Json(Value),
    /// The raw transport response, when `raw_response` was requested
    Response(HttpResponse),
}

/// One pending call: the immutable request description, its remaining retry
/// budget, and the completion slot through which the result reaches the
/// original caller.
pub(crate) struct RequestEnvelope {
    pub(crate) method: Method,
    pub(crate) url: String,
    /// Logical path, kept for error reporting
    pub(crate) path: String,
    /// Resolved route, kept so bucket discovery can re-key future calls
    pub(crate) route: Route,
    pub(crate) body: Option<Value>,
    pub(crate) headers: HeaderMap,
    pub(crate) raw: bool,
    /// Per-attempt transport timeout
    pub(crate) timeout: Duration,
    /// Initial retry budget
    pub(crate) budget: u32,
    pub(crate) retries_left: u32,
    /// Queued envelopes past this deadline are abandoned without sending
    pub(crate) deadline: Instant,
    tx: oneshot::Sender<Result<Reply, RestError>>,
}

impl RequestEnvelope {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        method: Method,
        url: String,
        path: String,
        route: Route,
        options: RequestOptions,
        timeout: Duration,
        budget: u32,
        tx: oneshot::Sender<Result<Reply, RestError>>,
    ) -> Self {
        Self {
            method,
            url,
            path,
            route,
            body: options.body,
            headers: options.headers,
            raw: options.raw_response,
            timeout,
            budget,
            retries_left: budget,
            deadline: Instant::now() + timeout,
            tx,
        }
    }

    /// Number of attempts already made (0 before the first send).
    pub(crate) fn attempts(&self) -> u32 {
        self.budget - self.retries_left
    }

    /// True when the caller stopped waiting for the result.
    pub(crate) fn abandoned(&self) -> bool {
        self.tx.is_closed()
    }

    /// Delivers the final result to the caller. Every envelope ends here
    /// exactly once; a dropped receiver is logged, not an error.
    pub(crate) fn resolve(self, result: Result<Reply, RestError>) {
        let path = self.path;
        if self.tx.send(result).is_err() {
            debug!(path = %path, "caller dropped before result was delivered");
        }
    }
}
