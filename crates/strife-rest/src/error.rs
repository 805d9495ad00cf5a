//! Error types surfaced to callers of the dispatch engine
//!
//! All retry decisions happen inside the engine; a caller only ever sees a
//! final success or one of the terminal variants below. Intermediate 429s,
//! transient network failures, and 5xx responses that were retried away are
//! never visible at this level.

use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::transport::TransportError;

/// Error payload the API attaches to failed requests.
///
/// Carried verbatim inside [`RestError::Client`] so higher layers can make
/// their own fallback decisions (abandon an edit, notify a user) without the
/// engine guessing at policy.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiError {
    /// Machine-readable error code (e.g. `10003` for Unknown Channel)
    pub code: Option<i64>,
    /// Human-readable error message
    pub message: Option<String>,
    /// Per-field validation errors, structure varies per endpoint
    #[serde(default)]
    pub errors: Option<serde_json::Value>,
}

/// Terminal errors produced by the dispatch engine
#[derive(Debug, Error)]
pub enum RestError {
    /// A 4xx response other than 429; never retried
    #[error("client error {status} on {path}")]
    Client {
        /// HTTP status code as reported by the server
        status: u16,
        /// Request path the error occurred on
        path: String,
        /// Parsed API error body, if the server sent one
        error: Option<ApiError>,
        /// Raw response body for callers that need the full payload
        body: String,
    },

    /// The retry budget was spent entirely on 429 responses
    #[error("rate limited on {path} (global: {global}), retry budget exhausted")]
    RateLimitExhausted {
        /// Request path the rate limit was hit on
        path: String,
        /// Whether the final 429 was account-wide rather than per-bucket
        global: bool,
        /// The last `retry_after` the server reported
        retry_after: Duration,
    },

    /// The retry budget was spent entirely on 5xx responses
    #[error("server error {status} on {path}, retry budget exhausted")]
    ServerExhausted {
        /// HTTP status code of the final attempt
        status: u16,
        /// Request path the error occurred on
        path: String,
        /// Raw response body of the final attempt
        body: String,
    },

    /// A network-level failure that survived all retries
    #[error("transport failure on {path}")]
    Transport {
        /// Request path the failure occurred on
        path: String,
        /// The underlying transport error
        #[source]
        source: TransportError,
    },

    /// The request timed out, either in flight or while still queued
    #[error("request to {path} timed out")]
    Timeout {
        /// Request path the timeout occurred on
        path: String,
    },

    /// The response body could not be parsed as JSON
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// The dispatcher was shut down while this request was pending
    #[error("dispatcher is shut down")]
    Shutdown,
}

impl RestError {
    /// Returns the HTTP status code associated with this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            RestError::Client { status, .. } | RestError::ServerExhausted { status, .. } => {
                Some(*status)
            }
            RestError::RateLimitExhausted { .. } => Some(429),
            _ => None,
        }
    }

    /// Returns the parsed API error body, if the server sent one.
    pub fn api_error(&self) -> Option<&ApiError> {
        match self {
            RestError::Client { error, .. } => error.as_ref(),
            _ => None,
        }
    }
}
