//! Per-device request throttling.
//!
//! Call sites only see [`RateLimitStore`], so the in-memory counter map can be
//! swapped for a shared cache when the backend runs on more than one node.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;

/// Fixed-window request counter.
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Count one request for `key` and report whether it is within `limit`
    /// requests for the current `window`.
    async fn increment_and_check(&self, key: &str, window: Duration, limit: u32) -> bool;
}

#[derive(Debug, Clone, Copy)]
struct WindowCounter {
    count: u32,
    reset_at: Instant,
}

/// Process-local store. Windows reset lazily on the next request after expiry.
#[derive(Default)]
pub struct InMemoryRateLimitStore {
    counters: Mutex<HashMap<String, WindowCounter>>,
}

impl InMemoryRateLimitStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn increment_at(&self, key: &str, window: Duration, limit: u32, now: Instant) -> bool {
        let mut counters = self.counters.lock().await;
        match counters.get_mut(key) {
            Some(counter) if now <= counter.reset_at => {
                counter.count = counter.count.saturating_add(1);
                counter.count <= limit
            }
            _ => {
                counters.insert(
                    key.to_string(),
                    WindowCounter {
                        count: 1,
                        reset_at: now + window,
                    },
                );
                limit >= 1
            }
        }
    }

    /// Drop counters whose window has ended. Returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut counters = self.counters.lock().await;
        let before = counters.len();
        counters.retain(|_, counter| now <= counter.reset_at);
        before - counters.len()
    }

    /// Periodically purge expired counters so idle devices don't accumulate.
    pub fn start_cleanup_task(self: Arc<Self>, interval: Duration) {
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                let removed = self.purge_expired().await;
                if removed > 0 {
                    tracing::debug!("Purged {} expired rate limit windows", removed);
                }
            }
        });
    }
}

#[async_trait]
impl RateLimitStore for InMemoryRateLimitStore {
    async fn increment_and_check(&self, key: &str, window: Duration, limit: u32) -> bool {
        self.increment_at(key, window, limit, Instant::now()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOUR: Duration = Duration::from_secs(3600);

    #[tokio::test]
    async fn allows_exactly_limit_requests() {
        let store = InMemoryRateLimitStore::new();
        for _ in 0..10 {
            assert!(store.increment_and_check("device-a", HOUR, 10).await);
        }
        assert!(!store.increment_and_check("device-a", HOUR, 10).await);
        assert!(!store.increment_and_check("device-a", HOUR, 10).await);
    }

    #[tokio::test]
    async fn keys_are_independent() {
        let store = InMemoryRateLimitStore::new();
        assert!(store.increment_and_check("a", HOUR, 1).await);
        assert!(!store.increment_and_check("a", HOUR, 1).await);
        assert!(store.increment_and_check("b", HOUR, 1).await);
    }

    #[tokio::test]
    async fn window_resets_after_expiry() {
        let store = InMemoryRateLimitStore::new();
        let start = Instant::now();
        let window = Duration::from_secs(60);
        assert!(store.increment_at("a", window, 1, start).await);
        assert!(!store.increment_at("a", window, 1, start + Duration::from_secs(30)).await);
        assert!(store.increment_at("a", window, 1, start + Duration::from_secs(61)).await);
    }

    #[tokio::test]
    async fn zero_limit_blocks_everything() {
        let store = InMemoryRateLimitStore::new();
        assert!(!store.increment_and_check("a", HOUR, 0).await);
    }

    #[tokio::test]
    async fn purge_removes_only_expired() {
        let store = InMemoryRateLimitStore::new();
        store.increment_and_check("short", Duration::ZERO, 5).await;
        store.increment_and_check("long", HOUR, 5).await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(store.purge_expired().await, 1);
        assert!(store.increment_and_check("long", HOUR, 2).await);
        assert!(!store.increment_and_check("long", HOUR, 2).await);
    }
}
