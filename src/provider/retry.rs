//! Bounded retries for provider calls.
use crate::provider::ProviderError;
use std::future::Future;
use std::time::Duration;

/// How provider calls are bounded and retried.
///
/// Each attempt is limited to `timeout`; a timed-out attempt counts as
/// [`ProviderError::Timeout`], which is retryable. Only [retryable][ProviderError::is_retryable]
/// failures are retried, up to `attempts` tries in total, sleeping `backoff`, `2 * backoff`,
/// `4 * backoff`, ... between tries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub timeout: Duration,
    pub attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            attempts: 3,
            backoff: Duration::from_millis(200),
        }
    }
}

impl RetryPolicy {
    /// Run `op` until it succeeds, fails permanently, or runs out of attempts. The last error is
    /// returned.
    ///
    /// # Errors
    ///
    /// Returns the error of the final attempt.
    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T, ProviderError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let attempts = self.attempts.max(1);
        let mut delay = self.backoff;
        let mut attempt = 1;
        loop {
            let err = match tokio::time::timeout(self.timeout, op()).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(err)) => err,
                Err(_) => ProviderError::Timeout(self.timeout),
            };
            if !err.is_retryable() || attempt >= attempts {
                return Err(err);
            }
            tracing::debug!("{what} failed (attempt {attempt}/{attempts}), retrying: {err}");
            tokio::time::sleep(delay).await;
            delay = delay.saturating_mul(2);
            attempt += 1;
        }
    }
}
