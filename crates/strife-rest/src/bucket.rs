//! Per-bucket request queue and limit-state machine.
//!
//! One [`BucketHandler`] exists per bucket key, created lazily on first use
//! and kept for the process lifetime. It owns a strict FIFO queue of pending
//! envelopes and the limit state the server has reported for the bucket so
//! far. A single drain loop per bucket pops and executes envelopes; the
//! `draining` guard ensures at most one loop runs no matter how many callers
//! race to enqueue.
//!
//! Limit state is advisory and best-effort: it is never used to reject a
//! call locally, only to *delay* one the server has already said it would
//! reject. `limit`/`remaining`/`reset_at` are written exclusively from
//! response headers; until the first response arrives the bucket is treated
//! as unbounded.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
    time::Duration,
};

use reqwest::{header::HeaderMap, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use tokio::time::{sleep, sleep_until, Instant};
use tracing::{debug, info, warn};

use crate::{
    error::{ApiError, RestError},
    manager::Shared,
    request::{Reply, RequestEnvelope},
    transport::{HttpRequest, HttpResponse, TransportError},
};

/// Fallback when a 429 carries no usable retry-after information
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(30);

/// Base delay for exponential backoff on transport/5xx retries (1 second)
const BASE_BACKOFF: Duration = Duration::from_secs(1);

/// Upper bound for a single backoff delay
const MAX_BACKOFF: Duration = Duration::from_secs(16);

/// Pending queue plus the guard that keeps drain loops singular.
struct QueueState {
    queue: VecDeque<RequestEnvelope>,
    draining: bool,
}

/// Limit state as last reported by the server for this bucket.
#[derive(Debug, Clone, Copy, Default)]
struct LimitState {
    /// Max requests per window; unknown (unbounded) until first response
    limit: Option<u32>,
    /// Requests left in the current window; never decremented locally
    remaining: Option<u32>,
    /// When the current window resets
    reset_at: Option<Instant>,
}

/// FIFO queue and limit-state record for one bucket key.
pub(crate) struct BucketHandler {
    key: String,
    state: Mutex<QueueState>,
    limits: Mutex<LimitState>,
}

/// Body of a 429 response.
#[derive(Debug, Deserialize)]
struct RateLimitBody {
    /// Seconds to wait, fractional
    #[serde(default)]
    retry_after: Option<f64>,
    /// Whether the account-wide limit was hit rather than this bucket's
    #[serde(default)]
    global: bool,
}

impl BucketHandler {
    pub(crate) fn new(key: String) -> Self {
        Self {
            key,
            state: Mutex::new(QueueState {
                queue: VecDeque::new(),
                draining: false,
            }),
            limits: Mutex::new(LimitState::default()),
        }
    }

    /// Appends an envelope and starts the drain loop if none is running.
    pub(crate) fn enqueue(self: &Arc<Self>, envelope: RequestEnvelope, shared: &Arc<Shared>) {
        let start_drain = {
            let mut state = self.state.lock().unwrap();
            state.queue.push_back(envelope);
            if state.draining {
                false
            } else {
                state.draining = true;
                true
            }
        };

        if start_drain {
            debug!(bucket = %self.key, "starting drain loop");
            tokio::spawn(Self::drain(Arc::clone(self), Arc::clone(shared)));
        }
    }

    /// Resolves every queued envelope with [`RestError::Shutdown`] and marks
    /// the queue idle. Called on shutdown; an envelope currently in flight
    /// is allowed to complete.
    pub(crate) fn fail_pending(&self) {
        let drained: VecDeque<RequestEnvelope> = {
            let mut state = self.state.lock().unwrap();
            state.draining = false;
            std::mem::take(&mut state.queue)
        };
        if !drained.is_empty() {
            debug!(bucket = %self.key, count = drained.len(), "failing queued requests on shutdown");
        }
        for envelope in drained {
            envelope.resolve(Err(RestError::Shutdown));
        }
    }

    /// The sequential executor for this bucket. Exactly one instance runs at
    /// a time; it exits when the queue is observed empty (the idle flag is
    /// flipped under the same lock, so no enqueue can slip past unserved).
    async fn drain(self: Arc<Self>, shared: Arc<Shared>) {
        loop {
            if shared.shutdown.is_cancelled() {
                self.fail_pending();
                return;
            }

            // Idle out as soon as there is nothing queued; the flag flips
            // under the queue lock so a racing enqueue cannot be missed.
            {
                let mut state = self.state.lock().unwrap();
                if state.queue.is_empty() {
                    state.draining = false;
                    return;
                }
            }

            // Account-wide gate first; it outranks this bucket's own window.
            if shared.global.is_tripped() {
                debug!(bucket = %self.key, "waiting for global rate limit");
                tokio::select! {
                    _ = shared.shutdown.cancelled() => {}
                    _ = shared.global.wait_until_clear() => {}
                }
                continue;
            }

            if let Some(reset_at) = self.next_window() {
                debug!(
                    bucket = %self.key,
                    wait_ms = reset_at.saturating_duration_since(Instant::now()).as_millis() as u64,
                    "bucket exhausted, waiting for window reset"
                );
                tokio::select! {
                    _ = shared.shutdown.cancelled() => {}
                    _ = sleep_until(reset_at) => {}
                }
                continue;
            }

            let envelope = {
                let mut state = self.state.lock().unwrap();
                match state.queue.pop_front() {
                    Some(envelope) => envelope,
                    None => {
                        state.draining = false;
                        return;
                    }
                }
            };

            if envelope.abandoned() {
                debug!(bucket = %self.key, path = %envelope.path, "dropping abandoned request");
                continue;
            }
            if Instant::now() >= envelope.deadline {
                let path = envelope.path.clone();
                warn!(bucket = %self.key, path = %path, "queued request passed its deadline");
                envelope.resolve(Err(RestError::Timeout { path }));
                continue;
            }

            self.execute(envelope, &shared).await;
        }
    }

    /// Returns the reset deadline when this bucket's window is exhausted,
    /// or `None` when a request may be sent now. A window whose reset has
    /// already passed is rolled over.
    fn next_window(&self) -> Option<Instant> {
        let mut limits = self.limits.lock().unwrap();
        match (limits.remaining, limits.reset_at) {
            (Some(0), Some(reset_at)) if reset_at > Instant::now() => Some(reset_at),
            (Some(0), _) => {
                limits.remaining = limits.limit;
                limits.reset_at = None;
                None
            }
            _ => None,
        }
    }

    async fn execute(&self, envelope: RequestEnvelope, shared: &Arc<Shared>) {
        let request = HttpRequest {
            method: envelope.method.clone(),
            url: envelope.url.clone(),
            headers: envelope.headers.clone(),
            body: envelope.body.clone(),
            timeout: envelope.timeout,
        };

        debug!(
            bucket = %self.key,
            method = %request.method,
            path = %envelope.path,
            attempt = envelope.attempts(),
            "dispatching request"
        );

        match shared.transport.send(request).await {
            Ok(response) => self.handle_response(envelope, response, shared).await,
            Err(error) => self.handle_transport_error(envelope, error, shared).await,
        }
    }

    /// Transport-level failures (connect, DNS, timeout) retry with
    /// exponential backoff and never touch bucket state.
    async fn handle_transport_error(
        &self,
        mut envelope: RequestEnvelope,
        error: TransportError,
        shared: &Arc<Shared>,
    ) {
        let path = envelope.path.clone();

        if envelope.retries_left == 0 {
            warn!(
                bucket = %self.key,
                path = %path,
                error = %error,
                attempts = envelope.attempts() + 1,
                "transport failure, retry budget exhausted"
            );
            let terminal = match error {
                TransportError::Timeout { .. } => RestError::Timeout { path },
                other => RestError::Transport {
                    path,
                    source: other,
                },
            };
            envelope.resolve(Err(terminal));
            return;
        }

        let delay = retry_backoff(envelope.attempts());
        envelope.retries_left -= 1;
        warn!(
            bucket = %self.key,
            path = %path,
            error = %error,
            retry_in_ms = delay.as_millis() as u64,
            "transport failure, retrying"
        );
        tokio::select! {
            _ = shared.shutdown.cancelled() => {}
            _ = sleep(delay) => {}
        }
        self.requeue_front(envelope);
    }

    async fn handle_response(
        &self,
        mut envelope: RequestEnvelope,
        response: HttpResponse,
        shared: &Arc<Shared>,
    ) {
        let path = envelope.path.clone();

        // Server-assigned bucket discovery: future calls on this route are
        // re-keyed by the dispatcher.
        if let Some(hash) = header_str(&response.headers, "x-ratelimit-bucket") {
            shared.record_bucket(&envelope.route, hash);
        }

        self.apply_headers(&response.headers);

        let status = response.status;

        if status == StatusCode::TOO_MANY_REQUESTS {
            self.handle_rate_limited(envelope, response, shared);
            return;
        }

        if status.is_server_error() {
            if envelope.retries_left == 0 {
                warn!(
                    bucket = %self.key,
                    path = %path,
                    status = status.as_u16(),
                    "server error, retry budget exhausted"
                );
                envelope.resolve(Err(RestError::ServerExhausted {
                    status: status.as_u16(),
                    path,
                    body: response.text(),
                }));
                return;
            }
            let delay = retry_backoff(envelope.attempts());
            envelope.retries_left -= 1;
            warn!(
                bucket = %self.key,
                path = %path,
                status = status.as_u16(),
                retry_in_ms = delay.as_millis() as u64,
                "server error, retrying"
            );
            tokio::select! {
                _ = shared.shutdown.cancelled() => {}
                _ = sleep(delay) => {}
            }
            self.requeue_front(envelope);
            return;
        }

        if status.is_client_error() {
            debug!(bucket = %self.key, path = %path, status = status.as_u16(), "client error");
            let error = response.json::<ApiError>().ok();
            envelope.resolve(Err(RestError::Client {
                status: status.as_u16(),
                path,
                error,
                body: response.text(),
            }));
            return;
        }

        // Success.
        if envelope.attempts() > 0 {
            info!(
                bucket = %self.key,
                path = %path,
                attempts = envelope.attempts() + 1,
                "request succeeded after retry"
            );
        }

        if envelope.raw {
            envelope.resolve(Ok(Reply::Response(response)));
            return;
        }

        if response.body.is_empty() || status == StatusCode::NO_CONTENT {
            envelope.resolve(Ok(Reply::Json(Value::Null)));
            return;
        }

        match response.json::<Value>() {
            Ok(value) => envelope.resolve(Ok(Reply::Json(value))),
            Err(e) => envelope.resolve(Err(RestError::InvalidResponse(e.to_string()))),
        }
    }

    /// 429 handling. The envelope is re-queued at the *head* so a retried
    /// request runs before anything enqueued after it, or resolved with
    /// [`RestError::RateLimitExhausted`] once its budget is spent.
    fn handle_rate_limited(
        &self,
        mut envelope: RequestEnvelope,
        response: HttpResponse,
        shared: &Arc<Shared>,
    ) {
        let path = envelope.path.clone();
        let body: Option<RateLimitBody> = response.json().ok();

        // The body carries fractional seconds; the header is whole seconds
        // or an HTTP-date. Prefer the more precise body value.
        let retry_after = body
            .as_ref()
            .and_then(|b| b.retry_after)
            .map(Duration::from_secs_f64)
            .or_else(|| {
                header_str(&response.headers, "retry-after")
                    .map(|v| parse_retry_after(v, DEFAULT_RETRY_AFTER))
            })
            .unwrap_or(DEFAULT_RETRY_AFTER);

        let global = body.as_ref().map(|b| b.global).unwrap_or(false)
            || header_flag(&response.headers, "x-ratelimit-global");

        let reset_at = Instant::now() + retry_after;

        if global {
            warn!(
                bucket = %self.key,
                path = %path,
                retry_after_ms = retry_after.as_millis() as u64,
                "globally rate limited"
            );
            shared.global.trip(reset_at, Duration::ZERO);
        } else {
            warn!(
                bucket = %self.key,
                path = %path,
                retry_after_ms = retry_after.as_millis() as u64,
                "bucket rate limited"
            );
            let mut limits = self.limits.lock().unwrap();
            limits.remaining = Some(0);
            limits.reset_at = Some(reset_at);
        }

        if envelope.retries_left == 0 {
            warn!(
                bucket = %self.key,
                path = %path,
                attempts = envelope.attempts() + 1,
                "rate limited, retry budget exhausted"
            );
            envelope.resolve(Err(RestError::RateLimitExhausted {
                path,
                global,
                retry_after,
            }));
            return;
        }

        envelope.retries_left -= 1;
        self.requeue_front(envelope);
    }

    /// Puts a retried envelope back at the head of the queue, ahead of
    /// everything enqueued after it.
    fn requeue_front(&self, envelope: RequestEnvelope) {
        self.state.lock().unwrap().queue.push_front(envelope);
    }

    /// Folds `X-RateLimit-*` headers into this bucket's limit state. Absent
    /// headers leave the corresponding fields untouched; state is never
    /// reset to unknown once learned.
    fn apply_headers(&self, headers: &HeaderMap) {
        let limit = header_parse::<u32>(headers, "x-ratelimit-limit");
        let remaining = header_parse::<u32>(headers, "x-ratelimit-remaining");
        // Prefer the relative form; the absolute epoch variant is exposed to
        // clock skew between us and the server.
        let reset_after = header_parse::<f64>(headers, "x-ratelimit-reset-after").or_else(|| {
            header_parse::<f64>(headers, "x-ratelimit-reset")
                .map(|epoch| epoch - chrono::Utc::now().timestamp_millis() as f64 / 1000.0)
        });

        if limit.is_none() && remaining.is_none() && reset_after.is_none() {
            return;
        }

        let mut limits = self.limits.lock().unwrap();
        if let Some(limit) = limit {
            limits.limit = Some(limit);
        }
        if let Some(remaining) = remaining {
            limits.remaining = Some(remaining);
        }
        if let Some(seconds) = reset_after {
            limits.reset_at = Some(Instant::now() + Duration::from_secs_f64(seconds.max(0.0)));
        }

        debug!(
            bucket = %self.key,
            limit = ?limits.limit,
            remaining = ?limits.remaining,
            "updated bucket limits"
        );
    }
}

/// Exponential backoff for transport/5xx retries: 1s, 2s, 4s, ... capped.
fn retry_backoff(attempt: u32) -> Duration {
    let exp = attempt.min(31);
    BASE_BACKOFF
        .saturating_mul(2u32.saturating_pow(exp))
        .min(MAX_BACKOFF)
}

/// Returns a header value as a string, if present and valid UTF-8.
fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Parses a header value, treating malformed values as absent.
fn header_parse<T: std::str::FromStr>(headers: &HeaderMap, name: &str) -> Option<T> {
    header_str(headers, name).and_then(|v| v.trim().parse().ok())
}

/// True when a boolean-ish header is present and set.
fn header_flag(headers: &HeaderMap, name: &str) -> bool {
    header_str(headers, name).is_some_and(|v| v.eq_ignore_ascii_case("true"))
}

/// Parses a `Retry-After` header value into a duration.
///
/// The header can be either an integer number of seconds (e.g. `"30"`) or an
/// HTTP-date, parsed as seconds from now. Falls back to the default when
/// parsing fails.
pub(crate) fn parse_retry_after(value: &str, default: Duration) -> Duration {
    let value = value.trim();

    if let Ok(seconds) = value.parse::<u64>() {
        return Duration::from_secs(seconds);
    }
    if let Ok(seconds) = value.parse::<f64>() {
        if seconds >= 0.0 {
            return Duration::from_secs_f64(seconds);
        }
    }

    if let Ok(date) = chrono::DateTime::parse_from_rfc2822(value) {
        let now = chrono::Utc::now();
        let target = date.with_timezone(&chrono::Utc);
        if target > now {
            let diff = target - now;
            if let Some(secs) = diff
                .num_seconds()
                .try_into()
                .ok()
                .filter(|&s: &u64| s <= 3600)
            {
                return Duration::from_secs(secs);
            }
        }
    }

    warn!(value, "could not parse retry-after header, using default");
    default
}
