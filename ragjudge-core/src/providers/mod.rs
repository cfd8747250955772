//! Judge provider implementations.
//!
//! Only OpenAI-compatible chat completion endpoints are supported (OpenAI,
//! Azure OpenAI, vLLM, Ollama, LM Studio, ...). Use `create_provider()` to
//! instantiate one from configuration.

pub mod openai_compat;

use crate::brain::LlmProvider;
use crate::config::{LlmConfig, RetryConfig};
use crate::error::LlmError;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

pub use openai_compat::OpenAiCompatibleProvider;

/// Create a judge provider from configuration.
///
/// Fails with `LlmError::AuthFailed` when no API key can be resolved.
pub fn create_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    match config.provider.as_str() {
        "openai" | "openai-compatible" | "azure" | "vllm" | "ollama" | "local" => {
            Ok(Arc::new(OpenAiCompatibleProvider::new(config)?))
        }
        other => Err(LlmError::UnsupportedProvider {
            provider: other.to_string(),
        }),
    }
}

/// Execute an async operation with exponential backoff retry on transient errors.
///
/// Retries on `LlmError::RateLimited` (respects `retry_after_secs` up to
/// `max_backoff_ms`),
/// `LlmError::Connection` and `LlmError::Timeout`. Permanent errors return immediately.
pub async fn with_retry<F, Fut, T>(config: &RetryConfig, operation: F) -> Result<T, LlmError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, LlmError>>,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(val) => return Ok(val),
            Err(e) if !e.is_transient() || attempt >= config.max_retries => return Err(e),
            Err(e) => {
                let backoff_ms = compute_backoff(config, attempt, &e);
                tracing::warn!(
                    attempt = attempt + 1,
                    max = config.max_retries,
                    backoff_ms = backoff_ms,
                    error = %e,
                    "Retrying judge call after transient error"
                );
                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                attempt += 1;
            }
        }
    }
}

/// Delay before the next attempt, never above `max_backoff_ms`.
///
/// The retry-after hint comes from the server's error text, so it is
/// untrusted and clamped like the computed delay.
pub(crate) fn compute_backoff(config: &RetryConfig, attempt: u32, err: &LlmError) -> u64 {
    let base = config.initial_backoff_ms as f64 * config.backoff_multiplier.powi(attempt as i32);
    let computed = base.min(config.max_backoff_ms as f64) as u64;
    if let LlmError::RateLimited { retry_after_secs } = err {
        return retry_after_secs
            .saturating_mul(1000)
            .max(computed)
            .min(config.max_backoff_ms);
    }
    computed
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_retry(max_retries: u32) -> RetryConfig {
        RetryConfig {
            max_retries,
            initial_backoff_ms: 1,
            max_backoff_ms: 2,
            backoff_multiplier: 1.0,
        }
    }

    #[tokio::test]
    async fn test_with_retry_recovers_from_transient_error() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result = with_retry(&fast_retry(3), || async move {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(LlmError::Connection {
                    message: "reset".into(),
                })
            } else {
                Ok(42)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_with_retry_permanent_error_not_retried() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<(), _> = with_retry(&fast_retry(3), || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(LlmError::AuthFailed {
                reason: "test".into(),
            })
        })
        .await;
        assert!(matches!(result, Err(LlmError::AuthFailed { .. })));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_with_retry_gives_up() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<(), _> = with_retry(&fast_retry(2), || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(LlmError::Timeout { timeout_secs: 1 })
        })
        .await;
        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_backoff_respects_rate_limit() {
        let config = RetryConfig::default();
        let err = LlmError::RateLimited {
            retry_after_secs: 3,
        };
        assert_eq!(compute_backoff(&config, 0, &err), 3_000);
        let err = LlmError::Timeout { timeout_secs: 5 };
        assert_eq!(compute_backoff(&config, 1, &err), 1_000);
        assert_eq!(compute_backoff(&config, 10, &err), 8_000);
    }

    #[test]
    fn test_backoff_caps_server_retry_after() {
        let config = RetryConfig::default();
        let err = LlmError::RateLimited {
            retry_after_secs: 10,
        };
        assert_eq!(compute_backoff(&config, 0, &err), config.max_backoff_ms);
        let err = LlmError::RateLimited {
            retry_after_secs: u64::MAX,
        };
        assert_eq!(compute_backoff(&config, 0, &err), config.max_backoff_ms);
    }

    #[test]
    fn test_create_provider_unknown() {
        let config = LlmConfig {
            provider: "carrier-pigeon".into(),
            api_key: Some("k".into()),
            ..Default::default()
        };
        assert!(matches!(
            create_provider(&config),
            Err(LlmError::UnsupportedProvider { .. })
        ));
    }

    #[test]
    fn test_create_provider_with_literal_key() {
        let config = LlmConfig {
            api_key: Some("sk-test".into()),
            ..Default::default()
        };
        let provider = create_provider(&config).unwrap();
        assert_eq!(provider.model_name(), "gpt-4o-mini");
    }
}
