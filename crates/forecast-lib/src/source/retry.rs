//! Exponential backoff for weather provider requests
//!
//! Retries timeouts, connection failures, 5xx, 408 and 429. Other 4xx
//! responses are returned to the caller on the first attempt.

use reqwest::{Response, StatusCode};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_INITIAL_DELAY_MS: u64 = 500;
pub const DEFAULT_MAX_DELAY_MS: u64 = 8000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Attempts after the first one
    pub max_retries: u32,
    /// Delay before the first retry; doubles per attempt
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            initial_delay: Duration::from_millis(DEFAULT_INITIAL_DELAY_MS),
            max_delay: Duration::from_millis(DEFAULT_MAX_DELAY_MS),
        }
    }
}

impl RetryConfig {
    pub fn new(max_retries: u32, initial_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self {
            max_retries,
            initial_delay: Duration::from_millis(initial_delay_ms),
            max_delay: Duration::from_millis(max_delay_ms),
        }
    }

    /// Backoff before retry number `attempt + 1`
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt);
        let delay_ms = (self.initial_delay.as_millis() as u64).saturating_mul(factor);
        Duration::from_millis(delay_ms.min(self.max_delay.as_millis() as u64))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry,
    NoRetry,
}

pub fn is_retryable_error(error: &reqwest::Error) -> RetryDecision {
    if error.is_timeout() || error.is_connect() {
        return RetryDecision::Retry;
    }
    match error.status() {
        Some(status) => is_retryable_status(status),
        None => RetryDecision::NoRetry,
    }
}

pub fn is_retryable_status(status: StatusCode) -> RetryDecision {
    if status.is_server_error()
        || status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
    {
        RetryDecision::Retry
    } else {
        RetryDecision::NoRetry
    }
}

/// Run `operation` until it yields a non-retryable outcome or the retry
/// budget is spent. The last response or error is returned as is.
pub async fn with_retry<F, Fut>(config: &RetryConfig, operation: F) -> Result<Response, reqwest::Error>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<Response, reqwest::Error>>,
{
    let mut attempt = 0;
    loop {
        let exhausted = attempt >= config.max_retries;
        match operation().await {
            Ok(response) => {
                let status = response.status();
                if exhausted || is_retryable_status(status) == RetryDecision::NoRetry {
                    if attempt > 0 {
                        info!(attempt, status = %status, "Request finished after retries");
                    }
                    return Ok(response);
                }
                warn!(
                    attempt = attempt + 1,
                    max_attempts = config.max_retries + 1,
                    status = %status,
                    "Retryable status from weather provider"
                );
            }
            Err(e) => {
                if exhausted || is_retryable_error(&e) == RetryDecision::NoRetry {
                    debug!(attempt, error = %e, "Giving up on request");
                    return Err(e);
                }
                warn!(
                    attempt = attempt + 1,
                    max_attempts = config.max_retries + 1,
                    error = %e,
                    "Retryable error from weather provider"
                );
            }
        }

        let delay = config.delay_for_attempt(attempt);
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}
