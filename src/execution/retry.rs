// Resilient RPC execution - primary endpoint with fallback and exponential backoff
//
// The layer knows nothing about the operation it runs, only how to retry it.
// It holds no mutable state across calls, so one instance can be shared by
// any number of concurrent callers.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::RpcError;

/// Ordered endpoint pair; the fallback is optional
#[derive(Debug, Clone)]
pub struct Endpoints<E> {
    pub primary: E,
    pub fallback: Option<E>,
}

impl<E> Endpoints<E> {
    pub fn new(primary: E, fallback: Option<E>) -> Self {
        Self { primary, fallback }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub backoff_multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_secs(1),
            backoff_multiplier: 2,
        }
    }
}

/// Rate limiting (HTTP 429), timeouts and explicit rate-limit messages
/// are the only failures worth sending to the fallback endpoint.
pub fn is_retryable(message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    message.contains("429")
        || message.contains("timeout")
        || message.contains("timed out")
        || message.contains("rate limit")
}

pub struct ResilientRpc<E> {
    endpoints: Endpoints<E>,
    policy: RetryPolicy,
}

impl<E: Clone> ResilientRpc<E> {
    pub fn new(endpoints: Endpoints<E>, policy: RetryPolicy) -> Self {
        Self { endpoints, policy }
    }

    /// Run `op` against the primary endpoint, falling back on retryable
    /// failures and backing off between rounds.
    ///
    /// Every round tries the primary first. A retryable failure is retried
    /// immediately against the fallback (when configured); non-retryable
    /// failures skip the fallback but still consume the backoff schedule.
    /// No sleep follows the final round.
    pub async fn execute<T, Er, F, Fut>(&self, mut op: F) -> Result<T, RpcError>
    where
        F: FnMut(E) -> Fut,
        Fut: Future<Output = Result<T, Er>>,
        Er: Display,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut backoff = self.policy.initial_backoff;
        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            match op(self.endpoints.primary.clone()).await {
                Ok(value) => return Ok(value),
                Err(err) => last_error = err.to_string(),
            }

            if is_retryable(&last_error) {
                if let Some(fallback) = &self.endpoints.fallback {
                    warn!(
                        attempt,
                        error = %last_error,
                        "Primary RPC failed, trying fallback"
                    );
                    match op(fallback.clone()).await {
                        Ok(value) => return Ok(value),
                        Err(err) => last_error = err.to_string(),
                    }
                }
            } else {
                debug!(attempt, error = %last_error, "Non-retryable RPC error");
            }

            if attempt < max_attempts {
                tokio::time::sleep(backoff).await;
                backoff *= self.policy.backoff_multiplier;
            }
        }

        Err(RpcError::ExecutionExhausted {
            attempts: max_attempts,
            last_error,
        })
    }
}
