//! Retry with exponential backoff and jitter
//!
//! Wraps any async operation. Failures are classified as retryable when the
//! error message or code contains one of the configured transient patterns, or
//! the error carries HTTP status 429/503. Retryable failures are retried after
//! `min(initial * multiplier^(attempt-1), max)` with ±20% jitter; anything else
//! stops immediately.
//!
//! The helper never fails itself: it always returns a [`RetryOutcome`] and the
//! caller decides what a failed outcome means.

use rand::Rng;
use std::fmt;
use std::future::Future;
use std::time::{Duration, Instant};

/// Transient error codes/messages reported by storage and network layers
pub const DEFAULT_RETRYABLE_ERRORS: &[&str] = &[
    "ETIMEDOUT",
    "ECONNRESET",
    "ECONNREFUSED",
    "ENOTFOUND",
    "ServerBusy",
    "InternalError",
    "OperationTimedOut",
    "RequestTimeout",
];

/// Jitter fraction applied either side of the base delay
pub const JITTER_FRACTION: f64 = 0.2;

/// Classification hooks for errors passed through the retry helper
pub trait Retryable: fmt::Display {
    /// Machine-readable error code, if the source has one
    fn retry_code(&self) -> Option<&str> {
        None
    }

    /// HTTP status carried by the error, if any
    fn retry_status(&self) -> Option<u16> {
        None
    }
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt; total attempts are at most `max_retries + 1`
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    pub retryable_errors: Vec<String>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30_000),
            backoff_multiplier: 2.0,
            retryable_errors: DEFAULT_RETRYABLE_ERRORS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl RetryPolicy {
    /// Preset for blob storage calls: 3 retries, 1s initial, 10s cap
    pub fn blob() -> Self {
        Self {
            max_delay: Duration::from_millis(10_000),
            ..Self::default()
        }
    }

    /// Base delay (before jitter) after failed attempt number `attempt` (1-based)
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let millis = self.initial_delay.as_millis() as f64 * self.backoff_multiplier.powi(exponent);
        let capped = millis.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped.max(0.0) as u64)
    }

    pub fn is_retryable<E: Retryable + ?Sized>(&self, error: &E) -> bool {
        let message = error.to_string();
        let code = error.retry_code().unwrap_or("");

        let matches_pattern = self
            .retryable_errors
            .iter()
            .any(|p| message.contains(p.as_str()) || code.contains(p.as_str()));

        let retryable_status = matches!(error.retry_status(), Some(429) | Some(503));

        matches_pattern || retryable_status
    }
}

/// Spread `base` uniformly over ±20%
pub fn apply_jitter<R: Rng + ?Sized>(base: Duration, rng: &mut R) -> Duration {
    let base_ms = base.as_millis() as f64;
    let offset = base_ms * JITTER_FRACTION * rng.gen_range(-1.0..=1.0);
    Duration::from_millis((base_ms + offset).max(0.0).floor() as u64)
}

/// Result of a retried operation plus bookkeeping
#[derive(Debug)]
pub struct RetryOutcome<T, E> {
    pub result: Result<T, E>,
    pub attempts: u32,
    pub total_duration: Duration,
}

impl<T, E> RetryOutcome<T, E> {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Execute `operation`, retrying retryable failures per `policy`
pub async fn retry_with_backoff<F, Fut, T, E>(
    policy: &RetryPolicy,
    operation_name: &str,
    mut operation: F,
) -> RetryOutcome<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable,
{
    let start_time = Instant::now();
    let mut attempts = 0u32;

    loop {
        attempts += 1;

        let err = match operation().await {
            Ok(data) => {
                return RetryOutcome {
                    result: Ok(data),
                    attempts,
                    total_duration: start_time.elapsed(),
                };
            }
            Err(err) => err,
        };

        if attempts > policy.max_retries || !policy.is_retryable(&err) {
            return RetryOutcome {
                result: Err(err),
                attempts,
                total_duration: start_time.elapsed(),
            };
        }

        let delay = apply_jitter(policy.base_delay(attempts), &mut rand::thread_rng());

        tracing::warn!(
            operation = operation_name,
            attempt = attempts,
            max_retries = policy.max_retries,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "Retrying after transient failure"
        );

        tokio::time::sleep(delay).await;
    }
}
