//! Exponential Backoff for Read Requests
//!
//! Reads against the backend and the RPC node are retried with a
//! doubling delay capped at `max_delay`. Writes never go through here.
//! Errors carrying a `Permanent` marker (4xx, malformed bodies) stop the
//! loop immediately.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Marks an error that retrying cannot fix.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct Permanent(pub String);

/// Backoff schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
  /// Total attempts including the first.
  pub max_attempts: u32,
  pub base_delay: Duration,
  pub max_delay: Duration,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self {
      max_attempts: 3,
      base_delay: Duration::from_millis(500),
      max_delay: Duration::from_secs(30),
    }
  }
}

impl RetryPolicy {
  /// A single attempt, no retry.
  pub const fn once() -> Self {
    Self {
      max_attempts: 1,
      base_delay: Duration::ZERO,
      max_delay: Duration::ZERO,
    }
  }

  /// Delay before retry number `retry` (1-based).
  pub fn delay_for(&self, retry: u32) -> Duration {
    let factor = 2u32.saturating_pow(retry.saturating_sub(1));
    self.base_delay.saturating_mul(factor).min(self.max_delay)
  }

  /// Run `op` until it succeeds, fails permanently, or attempts run out.
  pub async fn run<T, F, Fut>(&self, operation: &str, mut op: F) -> anyhow::Result<T>
  where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
  {
    let attempts = self.max_attempts.max(1);
    let mut attempt = 0;
    loop {
      attempt += 1;
      match op().await {
        Ok(value) => return Ok(value),
        Err(e) if e.is::<Permanent>() || attempt >= attempts => {
          if attempt > 1 {
            warn!(operation, attempt, error = %e, "Giving up after retries");
          }
          return Err(e);
        }
        Err(e) => {
          let delay = self.delay_for(attempt);
          debug!(
            operation,
            attempt,
            delay_ms = delay.as_millis() as u64,
            error = %e,
            "Retrying request"
          );
          sleep(delay).await;
        }
      }
    }
  }
}
