//! Continuous token bucket.

use tokio::time::Instant;

/// Burst size and refill rate used to mint a client's bucket.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LimitConfig {
    /// Bucket capacity
    pub burst: u32,
    /// Tokens added per second
    pub requests_per_second: f64,
}

impl LimitConfig {
    /// Create a limit. `burst` must be at least 1.
    pub fn new(burst: u32, requests_per_second: f64) -> Self {
        Self {
            burst,
            requests_per_second,
        }
    }

    /// Build a fresh bucket observed at `now`.
    pub fn bucket(&self, now: Instant) -> TokenBucket {
        TokenBucket::new_at(self.burst, self.requests_per_second, now)
    }
}

/// A token bucket that refills lazily from elapsed monotonic time.
///
/// The bucket starts full and gains `rate` tokens per second up to
/// `capacity`. No background tick is involved: the refill owed since the
/// last observation is settled on every [`allow_at`](TokenBucket::allow_at).
#[derive(Debug, Clone)]
pub struct TokenBucket {
    capacity: f64,
    rate: f64,
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    /// Create a bucket observed at `now`.
    ///
    /// A bucket with a zero rate never holds a token.
    pub fn new_at(capacity: u32, rate: f64, now: Instant) -> Self {
        let capacity = f64::from(capacity);
        let tokens = if rate > 0.0 { capacity } else { 0.0 };
        Self {
            capacity,
            rate,
            tokens,
            last_refill: now,
        }
    }

    /// Take one token at `now` if available.
    ///
    /// An instant earlier than the last refill counts as no elapsed time.
    pub fn allow_at(&mut self, now: Instant) -> bool {
        self.refill(now);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    fn refill(&mut self, now: Instant) {
        if now <= self.last_refill {
            return;
        }
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.rate).min(self.capacity);
        self.last_refill = now;
    }

    /// Tokens left as of the last observation.
    pub fn tokens(&self) -> f64 {
        self.tokens
    }
}
