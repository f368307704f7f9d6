//! Retry policies and the retry executor.
//!
//! [`with_retry`] re-invokes an asynchronous operation according to a
//! [`RetryPolicy`] and always returns the final failure as a classified
//! [`CanonicalError`] value instead of propagating a fault.

use crate::classifier::{classify, normalize};
use crate::context::ErrorContext;
use crate::error::{CanonicalError, RawError};
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Codes considered transient by the preset policies.
pub const DEFAULT_RETRYABLE_CODES: &[&str] = &[
    "NETWORK_ERROR",
    "TIMEOUT_ERROR",
    "CONNECTION_ERROR",
    "SERVICE_UNAVAILABLE_ERROR",
    "RATE_LIMIT_ERROR",
];

/// Function mapping attempt number to the delay before the next attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackoffStrategy {
    /// `base_delay * multiplier^(n-1)`
    #[default]
    Exponential,
    /// `base_delay * n`
    Linear,
    /// `base_delay`
    Fixed,
}

/// Decides whether a failure is worth another attempt.
#[derive(Clone)]
pub enum Retryable {
    /// Retry only errors whose code is in the list.
    Codes(Vec<String>),
    /// Caller-supplied predicate.
    Predicate(Arc<dyn Fn(&CanonicalError) -> bool + Send + Sync>),
}

impl Retryable {
    pub fn codes<I, S>(codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Codes(codes.into_iter().map(Into::into).collect())
    }

    pub fn predicate<F>(predicate: F) -> Self
    where
        F: Fn(&CanonicalError) -> bool + Send + Sync + 'static,
    {
        Self::Predicate(Arc::new(predicate))
    }

    /// Retry every failure.
    pub fn always() -> Self {
        Self::predicate(|_| true)
    }

    pub fn is_retryable(&self, error: &CanonicalError) -> bool {
        match self {
            Retryable::Codes(codes) => codes.iter().any(|code| code == error.code()),
            Retryable::Predicate(predicate) => predicate(error),
        }
    }
}

impl Default for Retryable {
    fn default() -> Self {
        Self::codes(DEFAULT_RETRYABLE_CODES.iter().copied())
    }
}

impl fmt::Debug for Retryable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Retryable::Codes(codes) => f.debug_tuple("Codes").field(codes).finish(),
            Retryable::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

/// Configurable retry policy for operations.
///
/// Policies are plain values: cloning one and overriding a field never affects
/// other callers.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first. `1` means never retry.
    pub max_attempts: usize,
    /// Base delay fed into the backoff strategy.
    pub base_delay: Duration,
    /// Cap applied to every computed delay.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff. Values below `1.0` are treated as
    /// `1.0`, which makes exponential backoff behave like fixed backoff.
    pub backoff_multiplier: f64,
    pub strategy: BackoffStrategy,
    pub retryable: Retryable,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::api_call()
    }
}

impl RetryPolicy {
    /// Create a new retry policy with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of attempts, including the first.
    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Set the base delay.
    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// Set the delay cap.
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Set the exponential backoff multiplier.
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Set the backoff strategy.
    pub fn with_strategy(mut self, strategy: BackoffStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Set which failures are retried.
    pub fn with_retryable(mut self, retryable: Retryable) -> Self {
        self.retryable = retryable;
        self
    }

    /// Calculate the delay that follows a failed attempt.
    ///
    /// # Arguments
    /// * `attempt` - The attempt number that just failed (1-based)
    ///
    /// # Returns
    /// The delay, never above `max_delay`, at nanosecond resolution.
    /// Attempt `0` yields zero.
    pub fn calculate_delay(&self, attempt: usize) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let factor = match self.strategy {
            BackoffStrategy::Exponential => {
                let exponent = i32::try_from(attempt - 1).unwrap_or(i32::MAX);
                self.backoff_multiplier.max(1.0).powi(exponent)
            }
            BackoffStrategy::Linear => attempt as f64,
            BackoffStrategy::Fixed => 1.0,
        };

        let nanos = self.base_delay.as_nanos() as f64 * factor;
        let cap = self.max_delay.as_nanos() as f64;
        if !nanos.is_finite() || nanos >= cap {
            return self.max_delay;
        }
        Duration::from_nanos(nanos.round() as u64)
    }

    /// Check whether another attempt may follow the given one.
    pub fn should_retry(&self, attempt: usize, error: &CanonicalError) -> bool {
        attempt < self.max_attempts && self.retryable.is_retryable(error)
    }
}

/// Named presets per operation class. All fields remain overridable.
impl RetryPolicy {
    /// Remote API calls: 3 attempts, 1s base, 10s cap, x2.
    pub fn api_call() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            backoff_multiplier: 2.0,
            strategy: BackoffStrategy::Exponential,
            retryable: Retryable::default(),
        }
    }

    /// Local database operations: 2 attempts, 2s base, 8s cap, x2.
    pub fn database() -> Self {
        Self {
            max_attempts: 2,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(8),
            backoff_multiplier: 2.0,
            strategy: BackoffStrategy::Exponential,
            retryable: Retryable::codes(
                ["DATABASE_ERROR", "DATABASE_LOCKED", "TIMEOUT_ERROR"]
                    .into_iter()
                    .chain(DEFAULT_RETRYABLE_CODES.iter().copied()),
            ),
        }
    }

    /// Photo and meal uploads: 5 attempts, 0.5s base, 5s cap, x1.5.
    pub fn upload() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(5),
            backoff_multiplier: 1.5,
            strategy: BackoffStrategy::Exponential,
            retryable: Retryable::default(),
        }
    }

    /// Operations that must not be lost: 5 attempts, 2s base, 30s cap, x2.
    pub fn critical() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            strategy: BackoffStrategy::Exponential,
            retryable: Retryable::default(),
        }
    }
}

/// Run `operation` until it succeeds, fails with a non-retryable error, or
/// exhausts `policy.max_attempts`.
///
/// The final failure is classified with `context` and carries the number of
/// attempts made under the `attempts` detail. This function never panics on
/// operation failure and never sleeps after a success.
pub async fn with_retry<T, E, F, Fut>(
    mut operation: F,
    policy: &RetryPolicy,
    context: &ErrorContext,
) -> Result<T, CanonicalError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Into<RawError>,
{
    let mut attempt = 1;

    loop {
        let error = match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => normalize(err.into()),
        };

        if !policy.should_retry(attempt, &error) {
            tracing::debug!(
                operation = %context.operation,
                code = %error.code(),
                attempt,
                "giving up after failed attempt"
            );
            let error = error.with_detail("attempts", Value::from(attempt));
            return Err(classify(error, context));
        }

        let delay = policy.calculate_delay(attempt);
        tracing::debug!(
            operation = %context.operation,
            code = %error.code(),
            attempt,
            delay_ms = delay.as_millis() as u64,
            "attempt failed, retrying"
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}
