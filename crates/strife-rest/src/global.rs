//! Account-wide rate-limit gate.
//!
//! A single [`GlobalThrottle`] is shared by every bucket queue. Any drain
//! loop that observes a globally scoped 429 trips it; every drain loop
//! checks it before sending. Tripping blocks *sends* across all buckets
//! until the deadline passes; enqueueing is never blocked.
//!
//! The client never counts down a global quota itself; the throttle is
//! purely a reaction to server-reported exhaustion, and clearing is purely
//! time-based.

use std::{
    sync::Mutex,
    time::Duration,
};

use tokio::time::{sleep_until, Instant};
use tracing::{debug, warn};

/// Process-wide gate suspending dispatch across all buckets.
#[derive(Debug, Default)]
pub struct GlobalThrottle {
    blocked_until: Mutex<Option<Instant>>,
}

impl GlobalThrottle {
    /// Creates an untripped throttle.
    pub fn new() -> Self {
        Self::default()
    }

    /// True while sends are suspended.
    pub fn is_tripped(&self) -> bool {
        self.blocked_until().is_some()
    }

    /// Returns the deadline sends are suspended until, or `None` when clear.
    /// Stale deadlines are cleared as a side effect.
    pub fn blocked_until(&self) -> Option<Instant> {
        let mut blocked = self.blocked_until.lock().unwrap();
        match *blocked {
            Some(until) if until <= Instant::now() => {
                debug!("global rate limit cleared");
                *blocked = None;
                None
            }
            other => other,
        }
    }

    /// Suspends all sends until `reset_at + delay`.
    ///
    /// An earlier trip already in effect is only ever extended, never
    /// shortened.
    pub fn trip(&self, reset_at: Instant, delay: Duration) {
        let until = reset_at + delay;
        let mut blocked = self.blocked_until.lock().unwrap();
        match *blocked {
            Some(current) if current >= until => {}
            _ => {
                warn!(
                    blocked_ms = until.saturating_duration_since(Instant::now()).as_millis() as u64,
                    "global rate limit tripped"
                );
                *blocked = Some(until);
            }
        }
    }

    /// Suspends the caller until the throttle clears. Returns immediately
    /// when it is not tripped. Re-checks after waking, since the deadline
    /// can be extended while waiting.
    pub async fn wait_until_clear(&self) {
        loop {
            match self.blocked_until() {
                None => return,
                Some(until) => sleep_until(until).await,
            }
        }
    }
}
