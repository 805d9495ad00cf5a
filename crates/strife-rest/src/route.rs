//! Route-to-bucket-key resolution.
//!
//! The server partitions rate limits by route *shape*, not by exact path:
//! two messages in the same channel share a quota window, while the same
//! operation in a different channel does not. [`Route::resolve`] collapses
//! the volatile path segments (message IDs, user IDs, emoji) while keeping
//! the resource-scoping ones (channel, guild, and webhook identifiers), so
//! that requests the server limits together end up in the same local queue.

use reqwest::Method;

/// Resolved routing information for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    /// Stable queue key computed from the path shape. Two requests share a
    /// key iff the server would rate-limit them together.
    pub key: String,
    /// Resource-scoping prefix (e.g. `channels/123`), used to scope a
    /// server-assigned bucket hash once one is discovered. `global` when the
    /// path has no scoping resource.
    pub major: String,
}

impl Route {
    /// Derives the bucket key and scoping prefix for a method and path.
    ///
    /// Deterministic and pure; never fails. Query strings are ignored, and
    /// absolute URLs are reduced to their path component first. The method
    /// only matters for message deletion, which the server buckets
    /// separately from other message operations.
    pub fn resolve(method: &Method, path: &str) -> Route {
        let segments = significant_segments(path);

        let mut parts = Vec::with_capacity(segments.len());
        for (i, segment) in segments.iter().enumerate() {
            let previous = if i > 0 { segments[i - 1] } else { "" };
            let part = if is_id(segment) {
                if matches!(previous, "channels" | "guilds" | "webhooks") {
                    (*segment).to_string()
                } else {
                    ":id".to_string()
                }
            } else if previous == "reactions" {
                ":emoji".to_string()
            } else {
                (*segment).to_string()
            };
            parts.push(part);
        }

        let mut key = parts.join("/");

        // Message deletion has its own server-side bucket.
        if *method == Method::DELETE
            && segments.len() >= 2
            && segments[segments.len() - 2] == "messages"
            && is_id(segments[segments.len() - 1])
        {
            key = format!("delete:{key}");
        }

        Route {
            key,
            major: major_parameter(&segments),
        }
    }
}

/// Splits a path into its meaningful segments, dropping the scheme/host of
/// absolute URLs, query strings, and any leading `api`/`v{N}` prefix so that
/// relative and absolute forms of the same route resolve identically.
fn significant_segments(path: &str) -> Vec<&str> {
    let path = match path.find("://") {
        Some(scheme_end) => {
            let after_scheme = &path[scheme_end + 3..];
            match after_scheme.find('/') {
                Some(host_end) => &after_scheme[host_end..],
                None => "",
            }
        }
        None => path,
    };
    let path = path.split('?').next().unwrap_or(path);

    let mut segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    if segments.first() == Some(&"api") {
        segments.remove(0);
        if segments
            .first()
            .is_some_and(|s| s.len() > 1 && s.starts_with('v') && s[1..].bytes().all(|b| b.is_ascii_digit()))
        {
            segments.remove(0);
        }
    }

    segments
}

/// Returns the resource-scoping prefix of a segmented path.
fn major_parameter(segments: &[&str]) -> String {
    match segments {
        ["webhooks", id, token, ..] if is_id(id) && !is_id(token) => {
            format!("webhooks/{id}/{token}")
        }
        ["channels" | "guilds" | "webhooks", id, ..] if is_id(id) => {
            format!("{}/{id}", segments[0])
        }
        _ => "global".to_string(),
    }
}

/// A path segment counts as an identifier when it is entirely numeric.
fn is_id(segment: &str) -> bool {
    !segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit())
}
