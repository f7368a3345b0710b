//! Bounded retry with exponential backoff, shared by every upstream call site.
//!
//! A policy is {max attempts, backoff unit}; the retryable predicate is supplied
//! per call. Attempt `k` (1-based) that fails retryably waits `unit * 2^(k-1)`
//! before attempt `k + 1`, so the default policy waits 1s then 2s.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tracing::warn;

use crate::errors::ServiceError;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_BACKOFF_UNIT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_unit: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff_unit: DEFAULT_BACKOFF_UNIT,
        }
    }
}

/// A successful result and the 1-based attempt that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Attempted<T> {
    pub value: T,
    pub attempt: u32,
}

#[derive(Debug, Error)]
pub enum RetryError<E> {
    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: E },

    #[error("non-retryable failure on attempt {attempt}: {error}")]
    Permanent { attempt: u32, error: E },
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff_unit: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff_unit,
        }
    }

    /// Delay after the given failed attempt (1-based).
    pub fn backoff(&self, failed_attempt: u32) -> Duration {
        let exponent = failed_attempt.saturating_sub(1).min(16);
        self.backoff_unit * 2u32.pow(exponent)
    }

    /// Runs `op` until it succeeds, fails with a non-retryable error, or the
    /// attempt budget runs out.
    pub async fn run<T, E, F, Fut, P>(
        &self,
        operation: &str,
        mut op: F,
        is_retryable: P,
    ) -> Result<Attempted<T>, RetryError<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
        E: std::fmt::Display,
    {
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(Attempted { value, attempt }),
                Err(error) if !is_retryable(&error) => {
                    return Err(RetryError::Permanent { attempt, error });
                }
                Err(error) if attempt >= self.max_attempts => {
                    warn!(operation, attempt, "Retries exhausted: {error}");
                    return Err(RetryError::Exhausted {
                        attempts: attempt,
                        last: error,
                    });
                }
                Err(error) => {
                    let delay = self.backoff(attempt);
                    warn!(
                        operation,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Transient failure, backing off: {error}"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// [`RetryPolicy::run`] with the upstream-service predicate
    /// ([`ServiceError::is_transient`]).
    pub async fn run_service<T, F, Fut>(
        &self,
        operation: &str,
        op: F,
    ) -> Result<Attempted<T>, RetryError<ServiceError>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, ServiceError>>,
    {
        self.run(operation, op, ServiceError::is_transient).await
    }
}
