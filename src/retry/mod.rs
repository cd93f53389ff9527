/// Retry and pacing primitives shared by the external-service adapters
///
/// Retries use exponential backoff with jitter and are gated on the
/// error's transience class: only rate-limit and connection class
/// failures are re-attempted, everything else surfaces immediately.

pub mod pacing;

pub use pacing::Pacer;

use crate::error::{ApiError, ApiResult};
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Retry configuration
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts after the first call
    pub max_retries: u32,
    /// Base delay for exponential backoff
    pub base_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Jitter factor (0.0 to 1.0) to add randomness
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500), // 500ms, 1s, 2s
            max_delay: Duration::from_millis(4000),
            jitter_factor: 0.1,
        }
    }
}

/// Retry executor applying exponential backoff to transient failures
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    config: RetryConfig,
}

impl RetryExecutor {
    /// Create a retry executor with the given configuration
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Create a retry executor with the default backoff schedule
    pub fn with_defaults() -> Self {
        Self::new(RetryConfig::default())
    }

    /// Execute an operation with retry logic
    pub async fn execute<F, Fut, T>(&self, operation: F) -> ApiResult<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = ApiResult<T>>,
    {
        self.execute_observed(operation, |_| {}).await
    }

    /// Execute an operation with retry logic, invoking `on_error` for
    /// every failed attempt (retried or not). Adapters use the hook to
    /// feed rate-limit classifications back into their pacer.
    pub async fn execute_observed<F, Fut, T, O>(
        &self,
        operation: F,
        mut on_error: O,
    ) -> ApiResult<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = ApiResult<T>>,
        O: FnMut(&ApiError),
    {
        let mut last_error = None;

        for attempt in 0..=self.config.max_retries {
            match operation().await {
                Ok(result) => {
                    if attempt > 0 {
                        debug!("Operation succeeded after {} retries", attempt);
                    }
                    return Ok(result);
                }
                Err(error) => {
                    on_error(&error);

                    if !error.is_transient() {
                        debug!("Not retrying error: {}", error);
                        return Err(error);
                    }

                    last_error = Some(error.clone());

                    if attempt < self.config.max_retries {
                        let delay = self.backoff_delay(attempt);
                        warn!(
                            "Operation failed (attempt {}/{}), retrying in {:?}: {}",
                            attempt + 1,
                            self.config.max_retries + 1,
                            delay,
                            error
                        );
                        sleep(delay).await;
                    } else {
                        warn!(
                            "Operation failed after {} attempts: {}",
                            self.config.max_retries + 1,
                            error
                        );
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            ApiError::Internal("Retry logic error: no attempts made".to_string())
        }))
    }

    /// Calculate exponential backoff delay with jitter
    fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponential = self.config.base_delay.as_millis() as u64 * (1u64 << attempt.min(16));
        let capped = std::cmp::min(Duration::from_millis(exponential), self.config.max_delay);

        if self.config.jitter_factor > 0.0 {
            let jitter_range = (capped.as_millis() as f64 * self.config.jitter_factor) as u64;
            let jitter = rand::thread_rng().gen_range(0..=jitter_range);
            capped + Duration::from_millis(jitter)
        } else {
            capped
        }
    }
}
