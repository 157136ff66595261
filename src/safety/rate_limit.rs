//! Token bucket rate limiting keyed by resource (usually a host name).
//!
//! Buckets refill in whole windows: each fully elapsed window adds
//! `max_tokens` permits, capped at `max_tokens`. Time is always passed in
//! by the caller.

use dashmap::DashMap;
use serde::Serialize;

use crate::safety::allowlist::DomainPattern;

/// Default permits per window.
pub const DEFAULT_MAX_REQUESTS: u64 = 100;

/// Default window length (one minute).
pub const DEFAULT_WINDOW_MS: u64 = 60_000;

/// Quota applied to one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateQuota {
    pub max_tokens: u64,
    pub window_ms: u64,
}

impl RateQuota {
    pub fn new(max_tokens: u64, window_ms: u64) -> Self {
        Self {
            max_tokens,
            window_ms,
        }
    }
}

impl Default for RateQuota {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_REQUESTS, DEFAULT_WINDOW_MS)
    }
}

/// Default quota plus per-host overrides.
#[derive(Debug, Clone, Default)]
pub struct QuotaTable {
    default: RateQuota,
    overrides: Vec<(DomainPattern, RateQuota)>,
}

impl QuotaTable {
    pub fn new(default: RateQuota) -> Self {
        Self {
            default,
            overrides: Vec::new(),
        }
    }

    /// Add an override for hosts matching `pattern` (exact or `*.domain`).
    pub fn with_override(mut self, pattern: &str, quota: RateQuota) -> Self {
        self.overrides.push((DomainPattern::new(pattern), quota));
        self
    }

    /// Quota for `host`; the first matching override wins.
    pub fn quota_for(&self, host: &str) -> RateQuota {
        self.overrides
            .iter()
            .find(|(pattern, _)| pattern.matches(host))
            .map(|(_, quota)| *quota)
            .unwrap_or(self.default)
    }

    pub fn default_quota(&self) -> RateQuota {
        self.default
    }

    pub fn overrides(&self) -> &[(DomainPattern, RateQuota)] {
        &self.overrides
    }
}

/// Bucket state for one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct RateLimitState {
    pub tokens: u64,
    pub last_refill: u64,
    pub request_count: u64,
}

/// Token bucket limiter.
///
/// The check-and-decrement for a key runs under that key's shard lock, so
/// concurrent callers can never consume more than `max_tokens` per window.
#[derive(Debug, Default)]
pub struct RateLimiter {
    buckets: DashMap<String, RateLimitState>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Try to take one permit for `key`.
    ///
    /// Denies outright when `max_tokens` is zero, and when `window_ms` is
    /// zero since such a window never refills meaningfully. A clock that
    /// moved backwards counts as no elapsed time.
    pub fn can_consume(&self, key: &str, max_tokens: u64, window_ms: u64, now_ms: u64) -> bool {
        if max_tokens == 0 {
            return false;
        }
        if window_ms == 0 {
            tracing::warn!(key, "Rate limit window of zero is invalid, denying request");
            return false;
        }

        let mut state = self
            .buckets
            .entry(key.to_string())
            .or_insert_with(|| RateLimitState {
                tokens: max_tokens,
                last_refill: now_ms,
                request_count: 0,
            });

        let elapsed = now_ms.saturating_sub(state.last_refill);
        let windows_elapsed = elapsed / window_ms;
        if windows_elapsed > 0 {
            state.tokens = state
                .tokens
                .saturating_add(windows_elapsed.saturating_mul(max_tokens))
                .min(max_tokens);
            state.last_refill = now_ms;
            state.request_count = 0;
        }

        // The quota for a key may shrink between calls.
        state.tokens = state.tokens.min(max_tokens);

        if state.tokens > 0 {
            state.tokens -= 1;
            state.request_count += 1;
            true
        } else {
            false
        }
    }

    /// [`can_consume`](Self::can_consume) with a [`RateQuota`].
    pub fn try_acquire(&self, key: &str, quota: RateQuota, now_ms: u64) -> bool {
        self.can_consume(key, quota.max_tokens, quota.window_ms, now_ms)
    }

    /// Snapshot of a key's state. Zeroed for unknown keys; never inserts.
    pub fn get_status(&self, key: &str) -> RateLimitState {
        self.buckets
            .get(key)
            .map(|state| *state)
            .unwrap_or_default()
    }

    /// Milliseconds until the next refill for `key`, zero if unknown.
    pub fn retry_after_ms(&self, key: &str, window_ms: u64, now_ms: u64) -> u64 {
        self.buckets
            .get(key)
            .map(|state| {
                state
                    .last_refill
                    .saturating_add(window_ms)
                    .saturating_sub(now_ms)
            })
            .unwrap_or(0)
    }

    /// Forget a key.
    pub fn reset(&self, key: &str) {
        self.buckets.remove(key);
    }

    /// Number of tracked keys.
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::thread;

    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_fresh_key_allows_exactly_max_tokens() {
        let limiter = RateLimiter::new();
        for _ in 0..5 {
            assert!(limiter.can_consume("api", 5, 1_000, 0));
        }
        assert!(!limiter.can_consume("api", 5, 1_000, 0));
        assert!(!limiter.can_consume("api", 5, 1_000, 999));
        assert!(limiter.can_consume("api", 5, 1_000, 1_000));
    }

    #[test]
    fn test_refill_resets_request_count() {
        let limiter = RateLimiter::new();
        assert!(limiter.can_consume("api", 3, 100, 0));
        assert!(limiter.can_consume("api", 3, 100, 10));
        assert_eq!(
            limiter.get_status("api"),
            RateLimitState {
                tokens: 1,
                last_refill: 0,
                request_count: 2
            }
        );

        assert!(limiter.can_consume("api", 3, 100, 250));
        assert_eq!(
            limiter.get_status("api"),
            RateLimitState {
                tokens: 2,
                last_refill: 250,
                request_count: 1
            }
        );
    }

    #[test]
    fn test_refill_caps_at_max() {
        let limiter = RateLimiter::new();
        for _ in 0..4 {
            limiter.can_consume("k", 4, 10, 0);
        }
        assert_eq!(limiter.get_status("k").tokens, 0);
        // Many windows later the bucket is full again, not overfull.
        assert!(limiter.can_consume("k", 4, 10, 10_000));
        assert_eq!(limiter.get_status("k").tokens, 3);
    }

    #[test]
    fn test_zero_max_tokens_always_denies() {
        let limiter = RateLimiter::new();
        assert!(!limiter.can_consume("k", 0, 1_000, 0));
        assert!(!limiter.can_consume("k", 0, 1_000, 1_000_000));
        assert!(limiter.is_empty());
    }

    #[test]
    fn test_zero_window_denies() {
        let limiter = RateLimiter::new();
        assert!(!limiter.can_consume("k", 10, 0, 0));
        assert!(limiter.is_empty());
    }

    #[test]
    fn test_clock_moving_backwards() {
        let limiter = RateLimiter::new();
        assert!(limiter.can_consume("k", 1, 100, 1_000));
        assert!(!limiter.can_consume("k", 1, 100, 500));
        let status = limiter.get_status("k");
        assert_eq!(status.tokens, 0);
        assert_eq!(status.last_refill, 1_000);
        assert!(limiter.can_consume("k", 1, 100, 1_100));
    }

    #[test]
    fn test_get_status_does_not_insert() {
        let limiter = RateLimiter::new();
        assert_eq!(limiter.get_status("nobody"), RateLimitState::default());
        assert!(limiter.is_empty());

        limiter.can_consume("k", 2, 100, 0);
        let first = limiter.get_status("k");
        let second = limiter.get_status("k");
        assert_eq!(first, second);
        assert_eq!(limiter.len(), 1);
    }

    #[test]
    fn test_shrinking_quota_clamps_tokens() {
        let limiter = RateLimiter::new();
        assert!(limiter.can_consume("k", 10, 1_000, 0));
        assert!(limiter.can_consume("k", 2, 1_000, 1));
        assert!(limiter.can_consume("k", 2, 1_000, 2));
        assert!(!limiter.can_consume("k", 2, 1_000, 3));
    }

    #[test]
    fn test_keys_are_independent() {
        let limiter = RateLimiter::new();
        assert!(limiter.can_consume("a", 1, 1_000, 0));
        assert!(!limiter.can_consume("a", 1, 1_000, 0));
        assert!(limiter.can_consume("b", 1, 1_000, 0));
        limiter.reset("a");
        assert!(limiter.can_consume("a", 1, 1_000, 0));
    }

    #[test]
    fn test_retry_after() {
        let limiter = RateLimiter::new();
        assert_eq!(limiter.retry_after_ms("k", 1_000, 0), 0);
        limiter.can_consume("k", 1, 1_000, 100);
        assert_eq!(limiter.retry_after_ms("k", 1_000, 400), 700);
        assert_eq!(limiter.retry_after_ms("k", 1_000, 5_000), 0);
    }

    #[test]
    fn test_concurrent_consumers_never_exceed_quota() {
        let limiter = Arc::new(RateLimiter::new());
        let granted = Arc::new(AtomicU64::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                let granted = Arc::clone(&granted);
                thread::spawn(move || {
                    for _ in 0..100 {
                        if limiter.can_consume("shared", 50, 60_000, 0) {
                            granted.fetch_add(1, Ordering::SeqCst);
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(granted.load(Ordering::SeqCst), 50);
    }

    #[test]
    fn test_quota_table_overrides() {
        let table = QuotaTable::new(RateQuota::new(100, 60_000))
            .with_override("catfact.ninja", RateQuota::new(100, 3_600_000))
            .with_override("*.dog.ceo", RateQuota::new(1_000, 3_600_000));

        assert_eq!(table.quota_for("catfact.ninja").window_ms, 3_600_000);
        assert_eq!(table.quota_for("api.dog.ceo").max_tokens, 1_000);
        assert_eq!(table.quota_for("example.com"), RateQuota::new(100, 60_000));
    }
}
