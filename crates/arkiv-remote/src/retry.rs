//! Bounded fixed-delay retry for remote calls.

use std::future::Future;
use std::time::Duration;

use arkiv_core::constants::{REMOTE_RETRY_ATTEMPTS, REMOTE_RETRY_DELAY_SECS};
use arkiv_core::{Result, StorageError};

/// Fixed-delay retry policy applied to each network call site.
///
/// Only transient failures are retried; contention and 4xx responses
/// propagate on the first attempt.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub const fn new(max_attempts: u32, delay: Duration) -> Self {
        RetryPolicy {
            max_attempts,
            delay,
        }
    }

    /// The policy used for all site-to-site traffic.
    pub const fn remote() -> Self {
        RetryPolicy::new(
            REMOTE_RETRY_ATTEMPTS,
            Duration::from_secs(REMOTE_RETRY_DELAY_SECS),
        )
    }

    /// Run `op` until it succeeds, fails permanently, or the attempt budget
    /// runs out.
    pub async fn run<T, F, Fut>(&self, op: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < self.max_attempts => {
                    tracing::warn!(
                        attempt,
                        max_attempts = self.max_attempts,
                        error = %err,
                        "transient remote failure, retrying"
                    );
                    tokio::time::sleep(self.delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::remote()
    }
}

#[allow(dead_code)]
fn network_error(message: &str) -> StorageError {
    StorageError::Network {
        message: message.to_string(),
    }
}
