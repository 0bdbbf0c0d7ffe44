//! Retry with exponential backoff and jitter.
//!
//! Transient object-store failures (timeouts, 5xx) are re-attempted up to
//! `max_retries` times. Terminal errors (`NotFound`, `InvalidKey`) return
//! immediately, as does cancellation: the loop never sleeps once the token
//! is cancelled.
//!
//! Backoff schedule with the defaults (500 ms base, 2x multiplier):
//! 500 ms, 1 s, 2 s — each scaled by a uniform jitter in [0.5x, 1.5x) so
//! that concurrent uploads recovering from the same outage do not
//! synchronize their retries.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{Result, StorageError};

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the initial attempt.
    pub max_retries: usize,
    pub base_delay: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Backoff for a 0-indexed attempt, before jitter.
    pub fn backoff(&self, attempt: usize) -> Duration {
        let ms = self.base_delay.as_millis() as f64 * self.multiplier.powi(attempt as i32);
        Duration::from_millis(ms as u64)
    }

    /// Backoff scaled by a uniform factor in [0.5, 1.5).
    pub fn jittered_backoff(&self, attempt: usize) -> Duration {
        let base = self.backoff(attempt);
        let factor = rand::thread_rng().gen_range(0.5..1.5);
        Duration::from_millis((base.as_millis() as f64 * factor) as u64)
    }
}

/// Run `operation` until it succeeds, a terminal error occurs, retries are
/// exhausted, or `cancel` fires.
pub async fn retry_with_backoff<T, F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    operation: &str,
    mut f: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        match f().await {
            Ok(value) => {
                if attempt > 0 {
                    debug!(operation, attempt = attempt + 1, "succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) if err.is_terminal() => return Err(err),
            Err(err) => {
                if cancel.is_cancelled() {
                    return Err(err);
                }
                if attempt >= policy.max_retries {
                    return Err(StorageError::RetriesExhausted {
                        operation: operation.to_string(),
                        attempts: attempt + 1,
                        source: Box::new(err),
                    });
                }

                let delay = policy.jittered_backoff(attempt);
                warn!(
                    operation,
                    attempt = attempt + 1,
                    max_attempts = policy.max_retries + 1,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "transient failure, backing off"
                );

                tokio::select! {
                    _ = cancel.cancelled() => return Err(err),
                    _ = tokio::time::sleep(delay) => {}
                }
                attempt += 1;
            }
        }
    }
}
