//! Call-site retry for provider requests

use std::future::Future;
use std::time::Duration;

use super::{LLMError, Result};
use crate::config::LLMConfig;

/// Bounded exponential backoff for transient provider failures
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &LLMConfig) -> Self {
        Self {
            max_attempts: config.provider_max_attempts.max(1),
            initial_backoff: Duration::from_millis(config.provider_backoff_ms),
        }
    }

    /// Delay after the given 1-based failed attempt
    fn backoff(&self, attempt: u32) -> Duration {
        self.initial_backoff
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&LLMConfig::default())
    }
}

/// Run `op` until it succeeds, fails permanently, or attempts run out.
///
/// Only transient errors (`ProviderUnavailable`, network failures, timeouts)
/// are retried. When attempts run out the last error is returned; callers
/// turn it into `AgentError::Transient` so the orchestrator can apply its own
/// policy.
pub async fn call_with_retry<T, F, Fut>(policy: &RetryPolicy, label: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < policy.max_attempts => {
                let delay = policy.backoff(attempt);
                tracing::warn!(
                    provider = label,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "Provider call failed, retrying: {}",
                    e
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                if e.is_transient() {
                    tracing::error!(provider = label, attempts = attempt, "Provider call exhausted retries: {}", e);
                    return Err(LLMError::ProviderUnavailable(format!(
                        "{} after {} attempts",
                        e, attempt
                    )));
                }
                return Err(e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_backoff: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn test_recovers_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result = call_with_retry(&fast_policy(3), "test", move || async move {
            if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(LLMError::ProviderUnavailable("down".into()))
            } else {
                Ok("done")
            }
        })
        .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: Result<()> = call_with_retry(&fast_policy(2), "test", move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(LLMError::Timeout)
        })
        .await;

        assert!(matches!(result, Err(LLMError::ProviderUnavailable(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_permanent_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: Result<()> = call_with_retry(&fast_policy(5), "test", move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(LLMError::AuthenticationFailed("bad key".into()))
        })
        .await;

        assert!(matches!(result, Err(LLMError::AuthenticationFailed(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy {
            max_attempts: 4,
            initial_backoff: Duration::from_millis(100),
        };
        assert_eq!(policy.backoff(1), Duration::from_millis(100));
        assert_eq!(policy.backoff(3), Duration::from_millis(400));
    }
}
