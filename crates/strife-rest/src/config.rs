//! Configuration for the REST dispatcher.
//!
//! Provides [`RestOptions`], the construction-time configuration surface of
//! [`RestManager`](crate::manager::RestManager), with defaults and consuming
//! builder-style setters for programmatic use.

use std::{fmt, sync::Arc, time::Duration};

use reqwest::header::HeaderMap;

/// Base URL of the production API
pub const API_URL: &str = "https://discord.com/api";

/// Base URL of the canary API instance
pub const CANARY_API_URL: &str = "https://canary.discord.com/api";

/// Default API version requests are issued against
pub const DEFAULT_API_VERSION: u8 = 8;

/// Default per-request timeout (30 seconds)
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default retry budget per request
pub const DEFAULT_RETRY_LIMIT: u32 = 1;

// ---------------------------------------------------------------------------
// Token handling
// ---------------------------------------------------------------------------

/// Prefix applied to the token in the `Authorization` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenType {
    /// Bot user token (`Authorization: Bot <token>`)
    Bot,
    /// OAuth2 bearer token (`Authorization: Bearer <token>`)
    Bearer,
    /// No prefix; the raw token is sent as-is
    None,
}

impl TokenType {
    /// Returns the header prefix for this token type, without trailing space.
    pub fn prefix(&self) -> &'static str {
        match self {
            TokenType::Bot => "Bot",
            TokenType::Bearer => "Bearer",
            TokenType::None => "",
        }
    }
}

/// Source of the credential attached to outgoing requests.
///
/// A supplier closure is invoked once per request, which supports token
/// rotation without rebuilding the dispatcher.
#[derive(Clone)]
pub enum TokenSource {
    /// A fixed token value
    Static(String),
    /// A closure consulted on every request; returning `None` sends the
    /// request unauthenticated
    Supplier(Arc<dyn Fn() -> Option<String> + Send + Sync>),
}

impl TokenSource {
    /// Resolves the current token value.
    pub fn resolve(&self) -> Option<String> {
        match self {
            TokenSource::Static(token) => Some(token.clone()),
            TokenSource::Supplier(supplier) => supplier(),
        }
    }
}

impl fmt::Debug for TokenSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // Never print the token itself
            TokenSource::Static(_) => f.write_str("TokenSource::Static(<redacted>)"),
            TokenSource::Supplier(_) => f.write_str("TokenSource::Supplier(..)"),
        }
    }
}

impl From<String> for TokenSource {
    fn from(token: String) -> Self {
        TokenSource::Static(token)
    }
}

impl From<&str> for TokenSource {
    fn from(token: &str) -> Self {
        TokenSource::Static(token.to_string())
    }
}

// ---------------------------------------------------------------------------
// RestOptions
// ---------------------------------------------------------------------------

/// Construction-time configuration for the REST dispatcher.
#[derive(Debug, Clone)]
pub struct RestOptions {
    /// Explicit base URL override (used verbatim, no version suffix is
    /// appended); useful for tests against a local mock server
    pub base_url: Option<String>,
    /// API version appended to the default base URL
    pub version: u8,
    /// Whether to target the canary API instance
    pub canary: bool,
    /// Credential attached to requests; `None` sends unauthenticated
    pub token: Option<TokenSource>,
    /// Prefix for the `Authorization` header
    pub token_type: TokenType,
    /// Value of the `User-Agent` header
    pub user_agent: String,
    /// Default per-request timeout
    pub timeout: Duration,
    /// Default retry budget for transient failures and 429s
    pub retry_limit: u32,
    /// Static headers merged into every request
    pub headers: HeaderMap,
}

impl Default for RestOptions {
    fn default() -> Self {
        Self {
            base_url: None,
            version: DEFAULT_API_VERSION,
            canary: false,
            token: None,
            token_type: TokenType::Bot,
            user_agent: format!(
                "DiscordBot (https://github.com/strife-rs/strife, {})",
                env!("CARGO_PKG_VERSION")
            ),
            timeout: DEFAULT_TIMEOUT,
            retry_limit: DEFAULT_RETRY_LIMIT,
            headers: HeaderMap::new(),
        }
    }
}

impl RestOptions {
    /// Creates options with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the credential attached to requests.
    pub fn token(mut self, token: impl Into<TokenSource>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Sets the `Authorization` header prefix.
    pub fn token_type(mut self, token_type: TokenType) -> Self {
        self.token_type = token_type;
        self
    }

    /// Sets the API version appended to the default base URL.
    pub fn version(mut self, version: u8) -> Self {
        self.version = version;
        self
    }

    /// Targets the canary API instance.
    pub fn canary(mut self, canary: bool) -> Self {
        self.canary = canary;
        self
    }

    /// Overrides the base URL entirely (no version suffix is appended).
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Sets the `User-Agent` header value.
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Sets the default per-request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the default retry budget.
    pub fn retry_limit(mut self, retry_limit: u32) -> Self {
        self.retry_limit = retry_limit;
        self
    }

    /// Merges static headers into every request.
    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.headers.extend(headers);
        self
    }

    /// Returns the root URL requests are issued against, including the
    /// version segment unless an explicit base URL override is set.
    pub fn api_root(&self) -> String {
        match &self.base_url {
            Some(base) => base.trim_end_matches('/').to_string(),
            None => {
                let host = if self.canary { CANARY_API_URL } else { API_URL };
                format!("{}/v{}", host, self.version)
            }
        }
    }
}
