//! Token-bucket rate limiting over caller-owned counters.
//!
//! The limiter itself holds no balances: refill rate and burst ceiling are
//! fixed at construction and applied to a [`CounterStore`] owned by the
//! calling context (one per agent, keyed by caller id). Whatever lock the
//! caller holds around its store serializes concurrent checks for the same
//! caller.
//!
//! Admission is an outcome, not an error: [`RateLimiter::check_and_consume`]
//! answers with a `bool` and the caller decides what a rejection means.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use metrics::counter;
use tracing::debug;

/// Default refill rate: one token per second.
pub const DEFAULT_TOKENS_PER_MINUTE: f64 = 60.0;
/// Default bucket ceiling.
pub const DEFAULT_BURST_CAPACITY: f64 = 10.0;

/// Per-caller token balance.
///
/// Balances are fractional so refill accrues continuously between requests.
/// Invariant: `0.0 <= tokens <= burst_capacity` after every limiter call.
#[derive(Clone, Copy, Debug)]
pub struct TokenCounter {
    /// Current balance.
    pub tokens: f64,
    /// When the balance was last brought up to date.
    pub last_refill: Instant,
}

/// Keyed store of [`TokenCounter`]s, one entry per caller id.
#[derive(Debug, Default)]
pub struct CounterStore {
    counters: HashMap<String, TokenCounter>,
}

impl CounterStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up the counter for a caller, if one exists yet.
    #[must_use]
    pub fn get(&self, caller_id: &str) -> Option<&TokenCounter> {
        self.counters.get(caller_id)
    }

    /// Insert or replace the counter for a caller.
    pub fn insert(&mut self, caller_id: impl Into<String>, counter: TokenCounter) {
        let _ = self.counters.insert(caller_id.into(), counter);
    }

    /// Number of callers with a counter.
    #[must_use]
    pub fn len(&self) -> usize {
        self.counters.len()
    }

    /// Whether no caller has been seen yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }
}

/// Token-bucket admission control.
#[derive(Clone, Debug)]
pub struct RateLimiter {
    tokens_per_minute: f64,
    burst_capacity: f64,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_TOKENS_PER_MINUTE, DEFAULT_BURST_CAPACITY)
    }
}

impl RateLimiter {
    /// Create a limiter with the given refill rate and ceiling.
    #[must_use]
    pub fn new(tokens_per_minute: f64, burst_capacity: f64) -> Self {
        Self {
            tokens_per_minute,
            burst_capacity,
        }
    }

    /// The configured burst ceiling.
    #[must_use]
    pub fn burst_capacity(&self) -> f64 {
        self.burst_capacity
    }

    fn refill_per_sec(&self) -> f64 {
        self.tokens_per_minute / 60.0
    }

    /// Refill the caller's bucket for elapsed time, then try to spend one
    /// token. Returns whether the request is admitted.
    ///
    /// A caller with no counter yet gets a full bucket and is always
    /// admitted; the admission itself spends the first token.
    pub fn check_and_consume(&self, store: &mut CounterStore, caller_id: &str) -> bool {
        let now = Instant::now();
        let Some(counter) = store.counters.get_mut(caller_id) else {
            let counter = TokenCounter {
                tokens: (self.burst_capacity - 1.0).max(0.0),
                last_refill: now,
            };
            let _ = store.counters.insert(caller_id.to_string(), counter);
            return true;
        };

        let elapsed = now.duration_since(counter.last_refill).as_secs_f64();
        counter.tokens = (counter.tokens + elapsed * self.refill_per_sec()).min(self.burst_capacity);
        counter.last_refill = now;

        if counter.tokens >= 1.0 {
            counter.tokens -= 1.0;
            true
        } else {
            counter!("ratelimit_rejections_total").increment(1);
            debug!(caller_id, tokens = counter.tokens, "rate limit rejection");
            false
        }
    }

    /// How long until the caller's next whole token accrues.
    ///
    /// Reads the stored balance without refilling it, so call this right
    /// after a rejection to populate a retry-after hint. Returns zero for
    /// callers with no counter or with a token already available.
    #[must_use]
    pub fn time_until_next_token(&self, store: &CounterStore, caller_id: &str) -> Duration {
        let Some(counter) = store.counters.get(caller_id) else {
            return Duration::ZERO;
        };
        if counter.tokens >= 1.0 {
            return Duration::ZERO;
        }
        let secs = (1.0 - counter.tokens) / self.refill_per_sec();
        if secs.is_finite() {
            Duration::from_secs_f64(secs.max(0.0))
        } else {
            // Zero refill rate: the bucket will never recover.
            Duration::MAX
        }
    }
}
