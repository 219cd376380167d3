use crate::error::{DeviceError, StoreError};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::error;

/// Errors a [`RetryPolicy`] is allowed to retry.
pub trait Transient {
    fn is_transient(&self) -> bool;
}

impl Transient for DeviceError {
    fn is_transient(&self) -> bool {
        matches!(
            self,
            DeviceError::Timeout(_) | DeviceError::Connect(_) | DeviceError::Reset(_)
        )
    }
}

impl Transient for StoreError {
    fn is_transient(&self) -> bool {
        match self {
            StoreError::Db(sqlx::Error::Io(_)) | StoreError::Db(sqlx::Error::PoolTimedOut) => true,
            StoreError::Db(_) => false,
            StoreError::Http(e) => e.is_timeout() || e.is_connect(),
            StoreError::Rejected { .. } => false,
        }
    }
}

#[derive(Debug, Error)]
pub enum RetryError<E: std::error::Error + 'static> {
    #[error("failed after {attempts} attempts. Last error: {last}")]
    Exhausted {
        attempts: u32,
        #[source]
        last: E,
    },
    #[error(transparent)]
    Permanent(E),
}

impl<E: std::error::Error + 'static> RetryError<E> {
    pub fn into_inner(self) -> E {
        match self {
            RetryError::Exhausted { last, .. } => last,
            RetryError::Permanent(e) => e,
        }
    }
}

/// Bounded retry with linear backoff: after failed attempt `n` the caller
/// sleeps `n * backoff_unit` before attempt `n + 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_retries: u32,
    backoff_unit: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(5))
    }
}

impl RetryPolicy {
    /// `max_retries` counts total attempts and is clamped to at least one.
    pub fn new(max_retries: u32, backoff_unit: Duration) -> Self {
        Self {
            max_retries: max_retries.max(1),
            backoff_unit,
        }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Saturates at `Duration::MAX` instead of overflowing.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.backoff_unit.saturating_mul(attempt)
    }

    pub async fn run<T, E, F, Fut>(&self, operation: &str, mut op: F) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Transient + std::error::Error + 'static,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let err = match op().await {
                Ok(v) => return Ok(v),
                Err(e) => e,
            };
            if !err.is_transient() {
                return Err(RetryError::Permanent(err));
            }
            if attempt >= self.max_retries {
                error!(
                    operation = %operation,
                    "Attempt {}/{} failed: {}. Giving up",
                    attempt, self.max_retries, err
                );
                return Err(RetryError::Exhausted {
                    attempts: attempt,
                    last: err,
                });
            }
            let wait = self.delay_after(attempt);
            error!(
                operation = %operation,
                "Attempt {}/{} failed: {}. Retrying in {} seconds...",
                attempt,
                self.max_retries,
                err,
                wait.as_secs()
            );
            tokio::time::sleep(wait).await;
        }
    }
}
