//! Retry logic with exponential backoff
//!
//! Wraps any idempotent remote call with bounded retry on rate-limit and
//! transient network signals. The control flow is an explicit per-call state
//! machine ([`RetryState`]) rather than nested error handlers, which keeps
//! attempt counting precise and makes fault injection in tests trivial.
//!
//! Backoff is local to each call: no rate-limit state is shared across
//! workers. Workers are few and bounded, so independent backoff keeps the
//! implementation simple at a negligible cost in coordination.

use crate::config::RetryConfig;
use crate::error::Error;
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Trait for errors that can be classified as retryable or not
///
/// Rate-limit signals and transient network failures should return `true`.
/// Permanent failures (authorization, not-found, malformed payloads) should
/// return `false`.
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;

    /// Server-supplied backoff hint, when the error carries one
    ///
    /// A hint takes precedence over the computed exponential delay.
    fn retry_after_hint(&self) -> Option<Duration> {
        None
    }
}

impl IsRetryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            // Rate-limit signals are the primary retry trigger
            Error::RateLimited { .. } => true,
            // Transport errors: retry timeouts and connection failures only
            Error::Network(e) => e.is_timeout() || e.is_connect(),
            // I/O errors can be transient in a handful of cases
            Error::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::Interrupted
            ),
            // Auth, not-found, malformed payloads, config and everything else
            // are permanent for the operation at hand
            _ => false,
        }
    }

    fn retry_after_hint(&self) -> Option<Duration> {
        match self {
            Error::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

/// Per-call retry state
///
/// Each invocation of [`execute_with_retry`] walks
/// `Attempting(1) -> BackingOff -> Attempting(2) -> ...` until the operation
/// succeeds or the retry budget is exhausted. The attempt number in the state
/// is the number of calls issued so far.
#[derive(Debug)]
enum RetryState {
    /// About to issue attempt `n` (1-based)
    Attempting(u32),
    /// Attempt `n` failed retryably; sleeping before attempt `n + 1`
    BackingOff {
        attempt: u32,
        delay: Duration,
    },
}

/// Execute an async operation with exponential backoff retry logic
///
/// Returns the final result together with the number of attempts made. Up to
/// `config.max_retries` retries are issued after the first attempt, so an
/// exhausted operation reports exactly `max_retries + 1` attempts.
/// Non-retryable errors propagate immediately with zero retries.
///
/// A `retry_after_hint` on the error takes precedence over the computed
/// exponential delay; computed delays grow by `backoff_multiplier` per
/// attempt, are capped at `max_delay`, and optionally carry jitter.
pub async fn execute_with_retry<F, Fut, T, E>(
    config: &RetryConfig,
    mut operation: F,
) -> (Result<T, E>, u32)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
{
    let mut state = RetryState::Attempting(1);

    loop {
        match state {
            RetryState::Attempting(attempt) => match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::info!(attempts = attempt, "operation succeeded after retry");
                    }
                    return (Ok(value), attempt);
                }
                Err(e) if e.is_retryable() && attempt <= config.max_retries => {
                    let delay = match e.retry_after_hint() {
                        // The server told us how long to wait; honor it verbatim
                        Some(hint) => hint,
                        None => computed_delay(config, attempt),
                    };
                    tracing::warn!(
                        error = %e,
                        attempt,
                        max_retries = config.max_retries,
                        delay_ms = delay.as_millis(),
                        "operation failed, retrying"
                    );
                    state = RetryState::BackingOff { attempt, delay };
                }
                Err(e) => {
                    if e.is_retryable() {
                        tracing::error!(
                            error = %e,
                            attempts = attempt,
                            "operation failed after all retry attempts exhausted"
                        );
                    } else {
                        tracing::error!(error = %e, "operation failed with non-retryable error");
                    }
                    return (Err(e), attempt);
                }
            },
            RetryState::BackingOff { attempt, delay } => {
                tokio::time::sleep(delay).await;
                state = RetryState::Attempting(attempt + 1);
            }
        }
    }
}

/// Execute a remote call with retry, mapping exhausted rate limits to the
/// terminal [`Error::RateLimitExhausted`] variant
///
/// This is the crate-internal entry point used for every network call in the
/// pipeline; [`execute_with_retry`] stays generic for testing with injected
/// error types.
pub async fn execute<F, Fut, T>(
    config: &RetryConfig,
    operation: F,
) -> (crate::error::Result<T>, u32)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = crate::error::Result<T>>,
{
    let (result, attempts) = execute_with_retry(config, operation).await;
    let result = result.map_err(|e| match e {
        // A rate-limit error can only surface here once the budget is spent
        Error::RateLimited { .. } => Error::RateLimitExhausted { attempts },
        other => other,
    });
    (result, attempts)
}

/// Exponential delay before the retry following attempt `attempt` (1-based),
/// capped at `max_delay`, with optional jitter
fn computed_delay(config: &RetryConfig, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1);
    let factor = config.backoff_multiplier.powi(exponent as i32);
    let delay = Duration::from_secs_f64(config.initial_delay.as_secs_f64() * factor)
        .min(config.max_delay);
    if config.jitter { add_jitter(delay) } else { delay }
}

/// Add random jitter uniformly distributed between 0% and 100% of the delay,
/// so the actual delay lands between `delay` and `2 * delay`
fn add_jitter(delay: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let jitter_factor: f64 = rng.gen_range(0.0..=1.0);
    Duration::from_secs_f64(delay.as_secs_f64() * (1.0 + jitter_factor))
}
