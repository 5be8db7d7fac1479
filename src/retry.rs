//! Retry logic with exponential backoff
//!
//! Translation requests fail transiently (timeouts, rate limits, overloaded
//! upstreams). This module retries such failures with exponential backoff and
//! reports how many retries were spent, which ends up on the translation result.
//!
//! # Example
//!
//! ```no_run
//! use biblio_translate::retry::{IsRetryable, with_retry};
//! use biblio_translate::config::RetryConfig;
//!
//! #[derive(Debug)]
//! enum MyError {
//!     Transient,
//!     Permanent,
//! }
//!
//! impl std::fmt::Display for MyError {
//!     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
//!         write!(f, "{:?}", self)
//!     }
//! }
//!
//! impl IsRetryable for MyError {
//!     fn is_retryable(&self) -> bool {
//!         matches!(self, MyError::Transient)
//!     }
//! }
//!
//! # async fn example() {
//! let config = RetryConfig::default();
//! let outcome = with_retry(&config, || async {
//!     Ok::<_, MyError>(())
//! }).await;
//! assert!(outcome.is_ok());
//! # }
//! ```

use crate::config::RetryConfig;
use crate::error::ProviderError;
use std::future::Future;
use std::time::Duration;

/// Trait for errors that can be classified as retryable or not
///
/// Transient failures (network errors, rate limiting, server errors) should return `true`.
/// Permanent failures (bad credentials, unknown model, malformed responses) should return `false`.
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for ProviderError {
    fn is_retryable(&self) -> bool {
        match self {
            // Any transport failure may succeed on the next attempt
            ProviderError::Network(_) => true,
            // Rate limiting and upstream failures are transient
            ProviderError::Http { status, .. } => *status == 429 || *status >= 500,
            // A structurally invalid answer will not fix itself
            ProviderError::MalformedResponse => false,
        }
    }
}

/// A value together with the number of retries spent producing it
#[derive(Debug, Clone, PartialEq)]
pub struct Retried<T> {
    /// The successful value, or the last error
    pub value: T,
    /// Retries performed after the first attempt
    pub retries: u32,
}

/// Delay before retry number `attempt` (0-based)
///
/// With the default configuration this yields 2s, 4s, 8s, ... capped at `max_delay`.
pub fn backoff_delay(config: &RetryConfig, attempt: u32) -> Duration {
    let factor = config.backoff_multiplier.powi(attempt as i32);
    let delay = Duration::from_secs_f64(config.initial_delay.as_secs_f64() * factor);
    delay.min(config.max_delay)
}

/// Execute an async operation with exponential backoff retry logic
///
/// The operation runs at most `max_retries + 1` times. Terminal errors
/// (per [`IsRetryable`]) are returned immediately without sleeping.
///
/// # Returns
///
/// `Ok` with the value and the retries spent, or `Err` with the last error and
/// the retries spent before giving up.
pub async fn with_retry<F, Fut, T, E>(
    config: &RetryConfig,
    mut operation: F,
) -> Result<Retried<T>, Retried<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
{
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(value) => {
                if attempt > 0 {
                    tracing::info!(attempts = attempt + 1, "Operation succeeded after retry");
                }
                return Ok(Retried {
                    value,
                    retries: attempt,
                });
            }
            Err(e) if e.is_retryable() && attempt < config.max_retries => {
                let delay = backoff_delay(config, attempt);

                tracing::warn!(
                    error = %e,
                    attempt = attempt + 1,
                    max_retries = config.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    "Operation failed, retrying"
                );

                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                if e.is_retryable() {
                    tracing::error!(
                        error = %e,
                        attempts = attempt + 1,
                        "Operation failed after all retry attempts exhausted"
                    );
                } else {
                    tracing::error!(
                        error = %e,
                        "Operation failed with non-retryable error"
                    );
                }
                return Err(Retried {
                    value: e,
                    retries: attempt,
                });
            }
        }
    }
}
