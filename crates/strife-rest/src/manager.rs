//! The REST dispatcher: the single public entry point for issuing calls.
//!
//! [`RestManager`] owns the bucket-key → queue table. Each incoming call is
//! resolved to a bucket key (explicit hint > server-discovered bucket >
//! computed route key), enqueued on that bucket's FIFO queue, and awaited
//! through a completion slot. Requests on different buckets run in
//! parallel; requests sharing a bucket run strictly in order.
//!
//! The manager is cheap to clone (everything lives behind an `Arc`) and is
//! shared across however many concurrent callers need it.

use std::sync::Arc;

use dashmap::DashMap;
use reqwest::Method;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::{
    bucket::BucketHandler,
    config::RestOptions,
    error::RestError,
    global::GlobalThrottle,
    request::{Reply, RequestEnvelope, RequestOptions},
    route::Route,
    transport::{HttpResponse, HttpTransport, Transport},
};

/// State shared between the manager and every bucket's drain loop.
pub(crate) struct Shared {
    pub(crate) options: RestOptions,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) global: GlobalThrottle,
    /// Bucket key → queue; entries are created lazily and never removed
    pub(crate) buckets: DashMap<String, Arc<BucketHandler>>,
    /// Route key → server-assigned bucket hash, learned from responses
    pub(crate) bucket_hashes: DashMap<String, String>,
    pub(crate) shutdown: CancellationToken,
}

impl Shared {
    /// Records a server-assigned bucket hash for a route. Future calls on
    /// the route are enqueued under the discovered key; envelopes already
    /// queued under the computed key are not migrated.
    pub(crate) fn record_bucket(&self, route: &Route, hash: &str) {
        let previous = self
            .bucket_hashes
            .insert(route.key.clone(), hash.to_string());
        if previous.as_deref() != Some(hash) {
            debug!(route = %route.key, hash, "discovered server-assigned bucket");
        }
    }

    /// Returns the queue key for a route: the discovered bucket hash scoped
    /// by the route's major parameter when known, the computed key otherwise.
    pub(crate) fn queue_key(&self, route: &Route) -> String {
        match self.bucket_hashes.get(&route.key) {
            Some(hash) => format!("{}:{}", hash.value(), route.major),
            None => route.key.clone(),
        }
    }
}

/// Rate-limit-aware dispatcher for the REST API.
///
/// ## Usage
///
/// ```rust,no_run
/// use strife_rest::{RestManager, RestOptions};
///
/// # async fn example() -> Result<(), strife_rest::RestError> {
/// let rest = RestManager::new(RestOptions::new().token("bot-token"));
/// let me = rest.get("/users/@me").await?;
/// println!("logged in as {}", me["username"]);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct RestManager {
    shared: Arc<Shared>,
}

impl RestManager {
    /// Creates a dispatcher using the HTTP transport.
    pub fn new(options: RestOptions) -> Self {
        let transport = Arc::new(HttpTransport::new(options.clone()));
        Self::with_transport(options, transport)
    }

    /// Creates a dispatcher over a custom transport. The transport is then
    /// responsible for credentials and user-agent headers.
    pub fn with_transport(options: RestOptions, transport: Arc<dyn Transport>) -> Self {
        Self {
            shared: Arc::new(Shared {
                options,
                transport,
                global: GlobalThrottle::new(),
                buckets: DashMap::new(),
                bucket_hashes: DashMap::new(),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// The configuration this dispatcher was built with.
    pub fn options(&self) -> &RestOptions {
        &self.shared.options
    }

    /// The account-wide throttle shared by all buckets.
    pub fn global_throttle(&self) -> &GlobalThrottle {
        &self.shared.global
    }

    /// Issues a request and resolves with the parsed JSON body
    /// (`Value::Null` for empty and 204 responses).
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        options: RequestOptions,
    ) -> Result<Value, RestError> {
        match self.dispatch(method, path, options).await? {
            Reply::Json(value) => Ok(value),
            // Raw was requested through the options; parse best-effort so
            // the caller still gets a value out of this entry point.
            Reply::Response(response) => Ok(response.json().unwrap_or(Value::Null)),
        }
    }

    /// Issues a request and resolves with the raw transport response,
    /// leaving status, headers, and body untouched.
    pub async fn request_raw(
        &self,
        method: Method,
        path: &str,
        options: RequestOptions,
    ) -> Result<HttpResponse, RestError> {
        match self
            .dispatch(method, path, options.raw_response(true))
            .await?
        {
            Reply::Response(response) => Ok(response),
            Reply::Json(value) => Err(RestError::InvalidResponse(format!(
                "expected raw response, got parsed body: {value}"
            ))),
        }
    }

    /// Makes a GET request.
    pub async fn get(&self, path: &str) -> Result<Value, RestError> {
        self.request(Method::GET, path, RequestOptions::new()).await
    }

    /// Makes a POST request.
    pub async fn post(&self, path: &str, body: Option<Value>) -> Result<Value, RestError> {
        self.request(Method::POST, path, body_options(body)).await
    }

    /// Makes a PATCH request.
    pub async fn patch(&self, path: &str, body: Option<Value>) -> Result<Value, RestError> {
        self.request(Method::PATCH, path, body_options(body)).await
    }

    /// Makes a PUT request.
    pub async fn put(&self, path: &str, body: Option<Value>) -> Result<Value, RestError> {
        self.request(Method::PUT, path, body_options(body)).await
    }

    /// Makes a DELETE request.
    pub async fn delete(&self, path: &str) -> Result<Value, RestError> {
        self.request(Method::DELETE, path, RequestOptions::new())
            .await
    }

    /// Stops accepting new requests, wakes every waiting drain loop, and
    /// resolves all still-queued envelopes with [`RestError::Shutdown`].
    /// Requests already in flight are allowed to complete.
    pub fn shutdown(&self) {
        info!("shutting down rest dispatcher");
        self.shared.shutdown.cancel();
        for entry in self.shared.buckets.iter() {
            entry.value().fail_pending();
        }
    }

    /// True once [`shutdown`](Self::shutdown) has been called.
    pub fn is_shutdown(&self) -> bool {
        self.shared.shutdown.is_cancelled()
    }

    async fn dispatch(
        &self,
        method: Method,
        path: &str,
        options: RequestOptions,
    ) -> Result<Reply, RestError> {
        if self.shared.shutdown.is_cancelled() {
            return Err(RestError::Shutdown);
        }

        let route = Route::resolve(&method, path);
        let key = match &options.bucket {
            Some(explicit) => explicit.clone(),
            None => self.shared.queue_key(&route),
        };

        let url = self.resolve_url(path);
        let timeout = options.timeout.unwrap_or(self.shared.options.timeout);
        let budget = options
            .retry_limit
            .unwrap_or(self.shared.options.retry_limit);

        let (tx, rx) = oneshot::channel();
        let envelope = RequestEnvelope::new(
            method,
            url,
            path.to_string(),
            route,
            options,
            timeout,
            budget,
            tx,
        );

        let handler = self
            .shared
            .buckets
            .entry(key.clone())
            .or_insert_with(|| {
                debug!(bucket = %key, "creating bucket queue");
                Arc::new(BucketHandler::new(key.clone()))
            })
            .clone();
        handler.enqueue(envelope, &self.shared);

        // The sender is only ever dropped without a result when the process
        // is tearing the runtime down around us.
        rx.await.map_err(|_| RestError::Shutdown)?
    }

    /// Prepends the configured API root unless the caller already passed an
    /// absolute URL.
    fn resolve_url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        let root = self.shared.options.api_root();
        if path.starts_with('/') {
            format!("{root}{path}")
        } else {
            format!("{root}/{path}")
        }
    }
}

fn body_options(body: Option<Value>) -> RequestOptions {
    match body {
        Some(body) => RequestOptions::new().body(body),
        None => RequestOptions::new(),
    }
}
