//! Token-bucket rate limiter shared across all ingestion endpoints.
//!
//! The token count is a single atomic integer: `allow()` decrements with a
//! compare-and-swap and never blocks. Refill is a background task that
//! adds `rate` tokens once per second, capped at `burst`. Coarse, but the
//! contract is deterministic: `burst` back-to-back requests are admitted,
//! the `burst + 1`th is rejected.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub struct RateLimiter {
    tokens: AtomicI64,
    /// Tokens added per refill tick.
    rate: i64,
    /// Bucket capacity.
    burst: i64,
}

impl RateLimiter {
    pub fn new(rate: i64, burst: i64) -> Arc<Self> {
        Arc::new(Self {
            tokens: AtomicI64::new(burst),
            rate,
            burst,
        })
    }

    /// Spawn the once-per-second refill loop. The task exits when `cancel`
    /// fires.
    pub fn start_refill(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let limiter = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(1));
            // The first tick completes immediately; skip it so the bucket
            // is not topped up before a full second has passed.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => limiter.refill(),
                }
            }
        })
    }

    /// Consume one token if any are available.
    pub fn allow(&self) -> bool {
        loop {
            let current = self.tokens.load(Ordering::Acquire);
            if current <= 0 {
                return false;
            }
            if self
                .tokens
                .compare_exchange(current, current - 1, Ordering::Release, Ordering::Acquire)
                .is_ok()
            {
                return true;
            }
        }
    }

    fn refill(&self) {
        loop {
            let current = self.tokens.load(Ordering::Acquire);
            let next = (current + self.rate).min(self.burst);
            if self
                .tokens
                .compare_exchange(current, next, Ordering::Release, Ordering::Acquire)
                .is_ok()
            {
                break;
            }
        }
    }

    #[cfg(test)]
    fn available(&self) -> i64 {
        self.tokens.load(Ordering::Acquire)
    }
}
