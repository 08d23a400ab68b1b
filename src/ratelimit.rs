//! Fixed-window rate limiting keyed by client identifier.
//!
//! Counters live behind the [`RateLimitStore`] trait so the window logic can
//! be exercised with a controlled clock and another store swapped in.

use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use axum::http::HeaderMap;
use dashmap::DashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowRecord {
    pub count: u32,
    pub reset_at: Instant,
}

pub trait RateLimitStore: Send + Sync {
    /// Count one hit for `key`, opening a fresh window when none is live.
    fn hit(&self, key: &str, now: Instant, window: Duration) -> WindowRecord;
    /// Drop windows that ended at or before `now`; returns how many went.
    fn purge_expired(&self, now: Instant) -> usize;
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Default)]
pub struct MemoryStore {
    windows: DashMap<String, WindowRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RateLimitStore for MemoryStore {
    fn hit(&self, key: &str, now: Instant, window: Duration) -> WindowRecord {
        let mut entry = self
            .windows
            .entry(key.to_string())
            .or_insert(WindowRecord {
                count: 0,
                reset_at: now + window,
            });
        if entry.count == 0 || now >= entry.reset_at {
            *entry = WindowRecord {
                count: 1,
                reset_at: now + window,
            };
        } else {
            entry.count = entry.count.saturating_add(1);
        }
        *entry
    }

    fn purge_expired(&self, now: Instant) -> usize {
        let before = self.windows.len();
        self.windows.retain(|_, record| record.reset_at > now);
        before.saturating_sub(self.windows.len())
    }

    fn len(&self) -> usize {
        self.windows.len()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    pub max_requests: u32,
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 100,
            window: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allowed { remaining: u32 },
    Limited { retry_after_secs: u64 },
}

#[derive(Clone)]
pub struct RateLimiter {
    config: RateLimitConfig,
    store: Arc<dyn RateLimitStore>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self::with_store(config, Arc::new(MemoryStore::new()))
    }

    pub fn with_store(config: RateLimitConfig, store: Arc<dyn RateLimitStore>) -> Self {
        Self { config, store }
    }

    pub fn config(&self) -> RateLimitConfig {
        self.config
    }

    pub fn check(&self, key: &str) -> Decision {
        self.check_at(key, Instant::now())
    }

    pub fn check_at(&self, key: &str, now: Instant) -> Decision {
        let record = self.store.hit(key, now, self.config.window);
        if record.count > self.config.max_requests {
            let remaining = record.reset_at.saturating_duration_since(now);
            Decision::Limited {
                retry_after_secs: retry_after_secs(remaining, self.config.window),
            }
        } else {
            Decision::Allowed {
                remaining: self.config.max_requests - record.count,
            }
        }
    }

    /// Periodically purge expired windows.  The task holds only a weak
    /// reference and exits once the store is gone.
    pub fn spawn_sweeper(&self, every: Duration) -> tokio::task::JoinHandle<()> {
        let weak: Weak<dyn RateLimitStore> = Arc::downgrade(&self.store);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(store) = weak.upgrade() else {
                    break;
                };
                let purged = store.purge_expired(Instant::now());
                if purged > 0 {
                    tracing::debug!(purged, live = store.len(), "rate limit windows purged");
                }
            }
        })
    }
}

/// Whole seconds until the window resets, at least 1 and never past the
/// window length.
fn retry_after_secs(remaining: Duration, window: Duration) -> u64 {
    let mut secs = remaining.as_secs();
    if remaining.subsec_nanos() > 0 {
        secs += 1;
    }
    let cap = window.as_secs().max(1);
    secs.clamp(1, cap)
}

/// Last `X-Forwarded-For` entry, else the peer address, else `"unknown"`.
///
/// Only one proxy hop is trusted: earlier entries are whatever the client
/// sent and never identify it.
pub fn client_key(headers: &HeaderMap, peer: Option<std::net::SocketAddr>) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|raw| raw.rsplit(',').next())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn limiter(max: u32, window_secs: u64) -> RateLimiter {
        RateLimiter::new(RateLimitConfig {
            max_requests: max,
            window: Duration::from_secs(window_secs),
        })
    }

    #[test]
    fn rejects_after_max_within_window() {
        let rl = limiter(3, 60);
        let t0 = Instant::now();
        assert_eq!(rl.check_at("a", t0), Decision::Allowed { remaining: 2 });
        assert_eq!(rl.check_at("a", t0), Decision::Allowed { remaining: 1 });
        assert_eq!(rl.check_at("a", t0), Decision::Allowed { remaining: 0 });
        let later = t0 + Duration::from_millis(20_500);
        assert_eq!(
            rl.check_at("a", later),
            Decision::Limited {
                retry_after_secs: 40
            }
        );
        // other clients are unaffected
        assert_eq!(rl.check_at("b", later), Decision::Allowed { remaining: 2 });
    }

    #[test]
    fn window_resets_after_expiry() {
        let rl = limiter(1, 10);
        let t0 = Instant::now();
        assert!(matches!(rl.check_at("a", t0), Decision::Allowed { .. }));
        assert!(matches!(rl.check_at("a", t0), Decision::Limited { .. }));
        let after = t0 + Duration::from_secs(10);
        assert_eq!(rl.check_at("a", after), Decision::Allowed { remaining: 0 });
    }

    #[test]
    fn retry_after_is_bounded() {
        let w = Duration::from_secs(60);
        assert_eq!(retry_after_secs(Duration::ZERO, w), 1);
        assert_eq!(retry_after_secs(Duration::from_millis(100), w), 1);
        assert_eq!(retry_after_secs(Duration::from_millis(59_001), w), 60);
        assert_eq!(retry_after_secs(Duration::from_secs(61), w), 60);
    }

    #[test]
    fn purge_drops_only_expired_windows() {
        let store = MemoryStore::new();
        let t0 = Instant::now();
        store.hit("old", t0, Duration::from_secs(1));
        store.hit("new", t0, Duration::from_secs(100));
        assert_eq!(store.purge_expired(t0 + Duration::from_secs(2)), 1);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn client_key_uses_the_proxy_appended_hop() {
        let mut headers = HeaderMap::new();
        let peer: std::net::SocketAddr = "10.0.0.9:4000".parse().unwrap();
        assert_eq!(client_key(&headers, Some(peer)), "10.0.0.9");
        assert_eq!(client_key(&headers, None), "unknown");
        headers.insert("x-forwarded-for", HeaderValue::from_static("198.51.100.7"));
        assert_eq!(client_key(&headers, Some(peer)), "198.51.100.7");
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.7, 198.51.100.7"),
        );
        assert_eq!(client_key(&headers, Some(peer)), "198.51.100.7");
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.7, "));
        assert_eq!(client_key(&headers, Some(peer)), "10.0.0.9");
    }

    #[test]
    fn rotating_spoofed_hops_share_one_window() {
        let rl = limiter(1, 60);
        let t0 = Instant::now();
        let mut decisions = Vec::new();
        for i in 0..5 {
            let mut headers = HeaderMap::new();
            let forwarded = format!("203.0.113.{}, 198.51.100.7", i);
            headers.insert("x-forwarded-for", HeaderValue::from_str(&forwarded).unwrap());
            let key = client_key(&headers, None);
            decisions.push(matches!(rl.check_at(&key, t0), Decision::Allowed { .. }));
        }
        assert_eq!(decisions, vec![true, false, false, false, false]);
    }

    #[tokio::test]
    async fn sweeper_stops_when_store_dropped() {
        let rl = limiter(5, 1);
        let handle = rl.spawn_sweeper(Duration::from_millis(10));
        drop(rl);
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("sweeper exits")
            .unwrap();
    }
}
