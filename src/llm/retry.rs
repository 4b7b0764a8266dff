//! Bounded retry for transient LLM failures.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;

use crate::error::LlmError;
use crate::llm::{CompletionRequest, CompletionResponse, LlmProvider};

/// Base delay between attempts; doubles each retry.
const BASE_DELAY_MS: u64 = 300;

/// Call `provider.complete`, retrying up to `max_retries` times on
/// transient errors (timeouts, rate limits, request failures).
/// Non-transient errors and exhausted bounds propagate.
pub(crate) async fn complete_with_retries(
    provider: &Arc<dyn LlmProvider>,
    request: CompletionRequest,
    max_retries: u32,
) -> Result<CompletionResponse, LlmError> {
    let mut attempt = 0;
    loop {
        match provider.complete(request.clone()).await {
            Ok(response) => return Ok(response),
            Err(e) if e.is_transient() && attempt < max_retries => {
                attempt += 1;
                let delay = retry_delay(&e, attempt);
                tracing::warn!(
                    attempt,
                    max_retries,
                    error = %e,
                    "Transient LLM error, retrying in {delay:?}"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Exponential backoff with jitter; rate limits honor the provider hint.
fn retry_delay(error: &LlmError, attempt: u32) -> Duration {
    if let LlmError::RateLimited {
        retry_after: Some(hint),
    } = error
    {
        return *hint;
    }
    let base = BASE_DELAY_MS * 2u64.pow(attempt.saturating_sub(1));
    let jitter = rand::thread_rng().gen_range(0..100);
    Duration::from_millis(base + jitter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyLlm {
        calls: AtomicU32,
        fail_first: u32,
    }

    #[async_trait]
    impl LlmProvider for FlakyLlm {
        fn model_name(&self) -> &str {
            "flaky"
        }

        async fn complete(
            &self,
            _request: CompletionRequest,
        ) -> Result<CompletionResponse, LlmError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_first {
                Err(LlmError::RequestFailed {
                    reason: "503".into(),
                })
            } else {
                Ok(CompletionResponse {
                    content: "ok".into(),
                    input_tokens: 1,
                    output_tokens: 1,
                })
            }
        }
    }

    fn request() -> CompletionRequest {
        CompletionRequest::new(vec![crate::llm::ChatMessage::user("hi")])
    }

    #[tokio::test]
    async fn retries_transient_then_succeeds() {
        let llm: Arc<dyn LlmProvider> = Arc::new(FlakyLlm {
            calls: AtomicU32::new(0),
            fail_first: 2,
        });
        let result = complete_with_retries(&llm, request(), 2).await;
        assert_eq!(result.unwrap().content, "ok");
    }

    #[tokio::test]
    async fn gives_up_after_bound() {
        let llm: Arc<dyn LlmProvider> = Arc::new(FlakyLlm {
            calls: AtomicU32::new(0),
            fail_first: 10,
        });
        let result = complete_with_retries(&llm, request(), 1).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn non_transient_fails_immediately() {
        struct BadJson;

        #[async_trait]
        impl LlmProvider for BadJson {
            fn model_name(&self) -> &str {
                "bad"
            }
            async fn complete(
                &self,
                _request: CompletionRequest,
            ) -> Result<CompletionResponse, LlmError> {
                Err(LlmError::InvalidResponse {
                    reason: "nope".into(),
                })
            }
        }

        let llm: Arc<dyn LlmProvider> = Arc::new(BadJson);
        let result = complete_with_retries(&llm, request(), 5).await;
        assert!(matches!(result, Err(LlmError::InvalidResponse { .. })));
    }

    #[test]
    fn rate_limit_hint_wins_over_backoff() {
        let e = LlmError::RateLimited {
            retry_after: Some(Duration::from_secs(7)),
        };
        assert_eq!(retry_delay(&e, 1), Duration::from_secs(7));
    }
}
