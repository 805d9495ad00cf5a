//! strife-rest - Rate-limited dispatch engine for the Discord REST API
//!
//! Provides an async client layer that:
//! - Serializes requests sharing a server-side rate-limit bucket and runs
//!   unrelated buckets in parallel
//! - Honors `X-RateLimit-*` headers, `Retry-After`, and the account-wide
//!   global limit
//! - Retries transient failures (429, 5xx, network) with backoff, without
//!   reordering requests within a bucket
//! - Discovers server-assigned buckets at runtime and re-keys future calls
//!
//! ## Modules
//!
//! - [`manager`] - the dispatcher and public entry point ([`RestManager`])
//! - [`global`] - the account-wide throttle
//! - [`route`] - route-to-bucket-key resolution
//! - [`transport`] - the network port and its `reqwest` implementation
//! - [`endpoints`] - typed path builders for common resources
//!
//! The per-bucket FIFO queues and limit-state machine live in a private
//! module; they are driven entirely through [`RestManager`].
//!
//! ## Usage
//!
//! ```rust,no_run
//! use strife_rest::{endpoints, RestManager, RestOptions};
//!
//! # async fn example() -> Result<(), strife_rest::RestError> {
//! let rest = RestManager::new(RestOptions::new().token("bot-token"));
//!
//! let message = rest
//!     .post(
//!         &endpoints::channel_messages(123456789012345678),
//!         Some(serde_json::json!({ "content": "hello" })),
//!     )
//!     .await?;
//! println!("sent message {}", message["id"]);
//! # Ok(())
//! # }
//! ```

mod bucket;
pub mod config;
pub mod endpoints;
pub mod error;
pub mod global;
pub mod manager;
mod request;
pub mod route;
pub mod transport;

pub use config::{RestOptions, TokenSource, TokenType};
pub use error::{ApiError, RestError};
pub use global::GlobalThrottle;
pub use manager::RestManager;
pub use request::RequestOptions;
pub use route::Route;
pub use transport::{HttpRequest, HttpResponse, HttpTransport, Transport, TransportError};

// Re-exported so callers don't need a direct `reqwest` dependency for the
// method argument of `RestManager::request`.
pub use reqwest::Method;
