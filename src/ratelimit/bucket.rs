//! Token bucket primitive.

use std::time::{Duration, Instant};

use parking_lot::Mutex;

use super::policy::Quota;

/// Mutable bucket state. Guarded as one unit so the refill-then-consume
/// sequence is atomic with respect to concurrent callers on the same key.
struct BucketState {
    /// Current token count, fractional because tokens accrue continuously.
    tokens: f64,
    /// When tokens were last refilled (updated on every consume attempt).
    last_refill: Instant,
}

/// A single token bucket with greedy refill.
///
/// Holds up to `capacity` tokens; the full capacity is restored
/// continuously over the quota's refill period rather than in one lump at
/// the period boundary. Each admitted operation consumes one token.
pub struct TokenBucket {
    /// Maximum tokens (burst size), fixed at creation.
    capacity: u64,
    /// Refill period over which the full capacity is restored.
    period: Duration,
    /// Token count and refill timestamp.
    state: Mutex<BucketState>,
}

impl TokenBucket {
    /// Create a full bucket for the given quota.
    pub fn new(quota: Quota) -> Self {
        Self {
            capacity: quota.capacity,
            period: quota.period,
            state: Mutex::new(BucketState {
                tokens: quota.capacity as f64,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Try to consume `n` tokens.
    ///
    /// Refills first, then consumes if `n` tokens are available. The
    /// refill timestamp advances regardless of the outcome. Returns
    /// `false` when denied; denial is immediate and final for this call.
    pub fn try_consume(&self, n: u64) -> bool {
        let mut state = self.state.lock();
        let now = Instant::now();
        state.tokens = self.refilled(state.tokens, now - state.last_refill);
        state.last_refill = now;

        if state.tokens >= n as f64 {
            state.tokens -= n as f64;
            true
        } else {
            false
        }
    }

    /// Current token count after applying the refill that elapsed time
    /// would grant. Never mutates the bucket; repeated calls reflect
    /// elapsed time only.
    pub fn available_tokens(&self) -> f64 {
        let state = self.state.lock();
        self.refilled(state.tokens, state.last_refill.elapsed())
    }

    /// Maximum tokens (burst size).
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Refill period for this bucket.
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Time since the last consume attempt touched this bucket.
    ///
    /// Read-only probes (`available_tokens`) do not reset this, so idle
    /// buckets stay eligible for eviction while being observed.
    pub fn idle_for(&self) -> Duration {
        self.state.lock().last_refill.elapsed()
    }

    fn refilled(&self, tokens: f64, elapsed: Duration) -> f64 {
        let rate = self.capacity as f64 / self.period.as_secs_f64();
        (tokens + elapsed.as_secs_f64() * rate).min(self.capacity as f64)
    }
}

impl std::fmt::Debug for TokenBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenBucket")
            .field("capacity", &self.capacity)
            .field("period", &self.period)
            .field("available", &self.available_tokens())
            .finish()
    }
}
