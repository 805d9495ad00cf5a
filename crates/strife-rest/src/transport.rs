//! Transport port and its HTTP implementation.
//!
//! The dispatch engine never talks to the network directly; it hands fully
//! described requests to a [`Transport`] and gets back status, headers, and
//! body. The production implementation, [`HttpTransport`], wraps
//! `reqwest::Client` and owns the concerns the engine should not care about:
//! authorization and `User-Agent` headers, JSON body encoding, and the
//! per-request timeout.
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Error` for the network-failure source because errors at
//!   port boundaries are adapter-specific and don't need engine-level
//!   classification; timeouts are the one case the engine must distinguish
//!   and get their own variant.
//! - Uses `#[async_trait]` for async trait methods.

use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use reqwest::{
    header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE, USER_AGENT},
    Client, Method, StatusCode,
};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::debug;

use crate::config::RestOptions;

/// A fully described outbound request, ready to send.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// HTTP method
    pub method: Method,
    /// Absolute URL
    pub url: String,
    /// Per-request header overrides (win over transport-level headers)
    pub headers: HeaderMap,
    /// JSON body, encoded by the transport
    pub body: Option<serde_json::Value>,
    /// Timeout for this attempt
    pub timeout: Duration,
}

/// Status, headers, and body of a completed exchange.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// HTTP status code
    pub status: StatusCode,
    /// Response headers
    pub headers: HeaderMap,
    /// Raw response body
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Deserializes the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }

    /// Returns the body as text, replacing invalid UTF-8.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Errors a transport can produce.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The attempt did not complete within its timeout
    #[error("request timed out after {timeout:?}")]
    Timeout {
        /// The timeout that elapsed
        timeout: Duration,
    },

    /// A network-level failure (connection, DNS, TLS, body read)
    #[error("network error: {source}")]
    Network {
        /// The adapter-specific failure
        #[source]
        source: anyhow::Error,
    },
}

/// Performs the actual network exchange for one request attempt.
///
/// Implementations must apply the request's timeout and surface it as
/// [`TransportError::Timeout`] so the engine can classify it separately
/// from other network failures.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends one request and returns the server's response.
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}

// ---------------------------------------------------------------------------
// HttpTransport
// ---------------------------------------------------------------------------

/// Production [`Transport`] over `reqwest`.
pub struct HttpTransport {
    client: Client,
    options: RestOptions,
}

impl HttpTransport {
    /// Creates a transport using the credential, user agent, and static
    /// headers from the given options.
    pub fn new(options: RestOptions) -> Self {
        Self {
            client: Client::new(),
            options,
        }
    }

    /// Assembles the headers attached to every request: static overrides
    /// from the options, `User-Agent`, and `Authorization`.
    ///
    /// The token source is consulted here, once per request, so rotated
    /// credentials take effect without rebuilding anything.
    fn base_headers(&self) -> Result<HeaderMap, TransportError> {
        let mut headers = self.options.headers.clone();

        let user_agent = HeaderValue::from_str(&self.options.user_agent)
            .map_err(|e| TransportError::Network {
                source: anyhow!("invalid user agent: {e}"),
            })?;
        headers.insert(USER_AGENT, user_agent);

        if let Some(token) = self.options.token.as_ref().and_then(|source| source.resolve()) {
            let prefix = self.options.token_type.prefix();
            let value = if prefix.is_empty() {
                token
            } else {
                format!("{prefix} {token}")
            };
            let value = HeaderValue::from_str(&value).map_err(|e| TransportError::Network {
                source: anyhow!("invalid authorization header: {e}"),
            })?;
            headers.insert(AUTHORIZATION, value);
        }

        Ok(headers)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let mut headers = self.base_headers()?;
        headers.extend(request.headers);

        let mut builder = self
            .client
            .request(request.method, &request.url)
            .headers(headers)
            .timeout(request.timeout);

        if let Some(body) = &request.body {
            let encoded = serde_json::to_vec(body).map_err(|e| TransportError::Network {
                source: anyhow!("failed to encode request body: {e}"),
            })?;
            builder = builder
                .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
                .body(encoded);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout {
                    timeout: request.timeout,
                }
            } else {
                TransportError::Network { source: anyhow!(e) }
            }
        })?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TransportError::Timeout {
                        timeout: request.timeout,
                    }
                } else {
                    TransportError::Network { source: anyhow!(e) }
                }
            })?
            .to_vec();

        debug!(status = status.as_u16(), bytes = body.len(), "received response");

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}
