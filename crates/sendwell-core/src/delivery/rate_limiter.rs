//! Rate limiting using the token bucket algorithm
//!
//! One limiter per capability class. Tokens refill at a constant rate up to
//! the burst capacity; each call consumes one. Waiters queue on a fair mutex
//! and are served in arrival order. An optional semaphore caps how many
//! calls of the class are in flight at once.
//!
//! ```text
//! Rate limit: 5 calls/sec, burst: 5
//! - Bucket starts with 5 tokens
//! - 5 callers proceed immediately
//! - Each further caller waits 200ms behind the one before it
//! ```

use sendwell_common::config::RateLimitClassConfig;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;
use tracing::debug;

/// Floating point slack when comparing token counts
const TOKEN_EPSILON: f64 = 1e-9;

/// Capability classes with their own budget
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LimiterClass {
    OutboundSend,
    AiGeneration,
}

impl LimiterClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            LimiterClass::OutboundSend => "outbound_send",
            LimiterClass::AiGeneration => "ai_generation",
        }
    }
}

impl std::fmt::Display for LimiterClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rate limiter errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RateLimitError {
    #[error("Rate limit timeout for {class} after {waited:?}")]
    Timeout { class: LimiterClass, waited: Duration },
}

/// Token bucket state
#[derive(Debug)]
struct TokenBucket {
    /// Current number of tokens
    tokens: f64,
    /// Maximum tokens (burst size)
    capacity: f64,
    /// Tokens added per second
    refill_rate: f64,
    /// Last time tokens were added
    last_refill: Instant,
}

impl TokenBucket {
    fn new(per_second: f64, burst: u32) -> Self {
        let capacity = f64::from(burst.max(1));
        Self {
            tokens: capacity,
            capacity,
            refill_rate: per_second.max(1e-6),
            last_refill: Instant::now(),
        }
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.capacity);
        self.last_refill = now;
    }

    /// Take a token, or report how long until one is available
    fn try_consume(&mut self) -> Result<(), Duration> {
        self.refill();

        if self.tokens + TOKEN_EPSILON >= 1.0 {
            self.tokens = (self.tokens - 1.0).max(0.0);
            Ok(())
        } else {
            let tokens_needed = 1.0 - self.tokens;
            Err(Duration::from_secs_f64(tokens_needed / self.refill_rate))
        }
    }
}

/// Held while a rate-limited call runs; releases the concurrency slot on drop
#[derive(Debug)]
pub struct RatePermit {
    _slot: Option<OwnedSemaphorePermit>,
}

/// Token bucket limiter for one capability class
#[derive(Debug)]
pub struct RateLimiter {
    class: LimiterClass,
    bucket: Mutex<TokenBucket>,
    concurrency: Option<Arc<Semaphore>>,
}

impl RateLimiter {
    pub fn new(class: LimiterClass, per_second: f64, burst: u32, max_concurrency: Option<usize>) -> Self {
        Self {
            class,
            bucket: Mutex::new(TokenBucket::new(per_second, burst)),
            concurrency: max_concurrency.map(|n| Arc::new(Semaphore::new(n.max(1)))),
        }
    }

    pub fn from_config(class: LimiterClass, config: &RateLimitClassConfig) -> Self {
        Self::new(class, config.per_second, config.burst, config.max_concurrency)
    }

    pub fn class(&self) -> LimiterClass {
        self.class
    }

    /// Wait for a token (and a concurrency slot, if capped) for at most
    /// `timeout`. Nothing is consumed when the wait times out.
    pub async fn acquire(&self, timeout: Duration) -> Result<RatePermit, RateLimitError> {
        let started = Instant::now();

        tokio::time::timeout(timeout, self.wait_for_token())
            .await
            .map_err(|_| {
                debug!(class = %self.class, "Rate limit acquire timed out");
                RateLimitError::Timeout {
                    class: self.class,
                    waited: started.elapsed(),
                }
            })
    }

    async fn wait_for_token(&self) -> RatePermit {
        let slot = match &self.concurrency {
            Some(semaphore) => semaphore.clone().acquire_owned().await.ok(),
            None => None,
        };

        let mut bucket = self.bucket.lock().await;
        while let Err(wait) = bucket.try_consume() {
            tokio::time::sleep(wait).await;
        }

        RatePermit { _slot: slot }
    }
}
