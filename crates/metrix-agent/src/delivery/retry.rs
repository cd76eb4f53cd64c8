//! Fixed-schedule retry.
//!
//! Only errors that report
//! [`is_retryable`](metrix_common::MetrixError::is_retryable) (a refused
//! connection) are retried. The default schedule waits 1s, 3s and 5s, so a
//! chunk gets at most four attempts.

use std::future::Future;
use std::time::Duration;
use tracing::warn;

use metrix_common::protocol::error::Result;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    delays: Vec<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(vec![
            Duration::from_secs(1),
            Duration::from_secs(3),
            Duration::from_secs(5),
        ])
    }
}

impl RetryPolicy {
    pub fn new(delays: Vec<Duration>) -> Self {
        Self { delays }
    }

    /// A single attempt, no retries.
    pub fn none() -> Self {
        Self::new(Vec::new())
    }

    pub fn delays(&self) -> &[Duration] {
        &self.delays
    }

    pub fn max_attempts(&self) -> usize {
        self.delays.len() + 1
    }

    /// Runs `op` until it succeeds, fails with a non-retryable error, or the
    /// schedule is exhausted. `op` receives the zero-based attempt number.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T>
    where
        F: FnMut(usize) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.delays.len() => {
                    let delay = self.delays[attempt];
                    warn!("Attempt {} failed: {}; retrying in {:?}", attempt + 1, e, delay);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
