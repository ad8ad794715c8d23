//! Per-client fixed-window rate limiting

use crate::config::RateLimitConfig;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Identifier used when a request carries no forwarding header
pub const ANONYMOUS_CLIENT: &str = "anonymous";

/// Result of a rate limit check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    /// Request admitted
    Allowed {
        /// Requests left in the current window
        remaining: u32,
    },
    /// Request rejected
    Limited {
        /// Time until the window resets
        retry_after: Duration,
    },
}

impl RateDecision {
    /// Whether the request may proceed
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateDecision::Allowed { .. })
    }
}

#[derive(Debug, Clone, Copy)]
struct ClientWindow {
    count: u32,
    window_start: Instant,
}

/// Counts requests per client within fixed windows
///
/// The limiter is owned by the router state; stale entries are removed by
/// [`ClientRateLimiter::sweep`], which [`ClientRateLimiter::spawn_sweeper`]
/// runs periodically.
#[derive(Debug)]
pub struct ClientRateLimiter {
    max_requests: u32,
    window: Duration,
    stale_after: Duration,
    clients: Mutex<HashMap<String, ClientWindow>>,
}

impl ClientRateLimiter {
    /// Create a limiter admitting `max_requests` per `window`; entries idle
    /// for `stale_windows` windows are swept
    pub fn new(max_requests: u32, window: Duration, stale_windows: u32) -> Self {
        Self {
            max_requests,
            window,
            stale_after: window * stale_windows.max(1),
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// Create a limiter from configuration
    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(
            config.max_requests,
            Duration::from_secs(config.window_secs),
            config.stale_windows,
        )
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, ClientWindow>> {
        self.clients.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Check and record one request from `client_id`
    pub fn check(&self, client_id: &str) -> RateDecision {
        self.check_at(client_id, Instant::now())
    }

    /// Check and record one request at `now`
    pub fn check_at(&self, client_id: &str, now: Instant) -> RateDecision {
        let mut clients = self.lock();
        let entry = clients
            .entry(client_id.to_string())
            .or_insert(ClientWindow {
                count: 0,
                window_start: now,
            });

        let elapsed = now.saturating_duration_since(entry.window_start);
        if elapsed >= self.window {
            entry.count = 0;
            entry.window_start = now;
        }

        if entry.count >= self.max_requests {
            let retry_after = self
                .window
                .saturating_sub(now.saturating_duration_since(entry.window_start));
            tracing::debug!(client_id, count = entry.count, "Rate limit exceeded");
            return RateDecision::Limited { retry_after };
        }

        entry.count += 1;
        RateDecision::Allowed {
            remaining: self.max_requests - entry.count,
        }
    }

    /// Drop entries whose window started too long ago
    ///
    /// # Returns
    ///
    /// Number of entries removed
    pub fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }

    /// Drop entries stale at `now`
    pub fn sweep_at(&self, now: Instant) -> usize {
        let mut clients = self.lock();
        let before = clients.len();
        clients.retain(|_, w| now.saturating_duration_since(w.window_start) <= self.stale_after);
        let removed = before - clients.len();
        if removed > 0 {
            tracing::debug!(removed, remaining = clients.len(), "Swept rate limit entries");
        }
        removed
    }

    /// Number of tracked clients
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether no clients are tracked
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Sweep every `interval` until `shutdown` is cancelled
    pub fn spawn_sweeper(
        self: Arc<Self>,
        interval: Duration,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        tracing::debug!("Rate limit sweeper stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        self.sweep();
                    }
                }
            }
        })
    }
}

/// Client identifier from the first `x-forwarded-for` entry
///
/// # Examples
///
/// ```
/// use tutorchat::proxy::rate_limit::client_id;
///
/// assert_eq!(client_id(Some(" 10.0.0.1 , 10.0.0.2")), "10.0.0.1");
/// assert_eq!(client_id(None), "anonymous");
/// ```
pub fn client_id(forwarded_for: Option<&str>) -> String {
    forwarded_for
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(ANONYMOUS_CLIENT)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter() -> ClientRateLimiter {
        ClientRateLimiter::new(5, Duration::from_secs(60), 5)
    }

    #[test]
    fn test_sixth_request_in_window_is_limited() {
        let limiter = limiter();
        let start = Instant::now();
        for i in 0..5 {
            let decision = limiter.check_at("a", start + Duration::from_secs(i));
            assert_eq!(decision, RateDecision::Allowed { remaining: 4 - i as u32 });
        }
        let decision = limiter.check_at("a", start + Duration::from_secs(10));
        assert_eq!(
            decision,
            RateDecision::Limited {
                retry_after: Duration::from_secs(50)
            }
        );
    }

    #[test]
    fn test_clients_are_independent() {
        let limiter = limiter();
        let now = Instant::now();
        for _ in 0..5 {
            limiter.check_at("a", now);
        }
        assert!(!limiter.check_at("a", now).is_allowed());
        assert!(limiter.check_at("b", now).is_allowed());
    }

    #[test]
    fn test_window_resets() {
        let limiter = limiter();
        let start = Instant::now();
        for _ in 0..5 {
            limiter.check_at("a", start);
        }
        assert!(limiter
            .check_at("a", start + Duration::from_secs(60))
            .is_allowed());
    }

    #[test]
    fn test_sweep_drops_entries_older_than_five_windows() {
        let limiter = limiter();
        let start = Instant::now();
        limiter.check_at("old", start);
        limiter.check_at("recent", start + Duration::from_secs(200));

        assert_eq!(limiter.sweep_at(start + Duration::from_secs(300)), 0);
        assert_eq!(limiter.sweep_at(start + Duration::from_secs(301)), 1);
        assert_eq!(limiter.len(), 1);
    }

    #[test]
    fn test_client_id_fallbacks() {
        assert_eq!(client_id(Some("")), ANONYMOUS_CLIENT);
        assert_eq!(client_id(Some("  ,1.2.3.4")), ANONYMOUS_CLIENT);
        assert_eq!(client_id(Some("203.0.113.9")), "203.0.113.9");
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_runs_until_cancelled() {
        let limiter = Arc::new(limiter());
        limiter.check("idle");
        let token = CancellationToken::new();
        let handle = limiter
            .clone()
            .spawn_sweeper(Duration::from_secs(300), token.clone());

        tokio::time::sleep(Duration::from_secs(301)).await;
        assert_eq!(limiter.len(), 1);
        tokio::time::sleep(Duration::from_secs(300)).await;
        assert!(limiter.is_empty());

        token.cancel();
        handle.await.unwrap();
    }
}
