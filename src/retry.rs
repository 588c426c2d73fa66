//! Bounded retry around provider calls.

use crate::error::FetchError;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::info;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 20,
            backoff_ms: 1000,
        }
    }
}

/// Max attempts, fixed backoff and a predicate deciding which errors are
/// worth another attempt. Anything the predicate rejects is returned on the
/// spot; once attempts run out the last error is returned.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
    pub retryable: fn(&FetchError) -> bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::from(RetryConfig::default())
    }
}

impl From<RetryConfig> for RetryPolicy {
    fn from(config: RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            backoff: Duration::from_millis(config.backoff_ms),
            retryable: FetchError::is_transient,
        }
    }
}

impl RetryPolicy {
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T, FetchError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.max_attempts && (self.retryable)(&e) => {
                    info!(call = label, error = %e, " -- retry {}/{}", attempt, self.max_attempts);
                    tokio::time::sleep(self.backoff).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
