//! Bounded, jittered retry for transport failures.
//!
//! Wraps any [`LlmClient`]; only `Transport` errors are retried. Everything
//! else (`RateLimited`, `Timeout`, `MalformedOutput`) is surfaced immediately
//! so the orchestration layer can apply its own policy.

use super::r#trait::LlmClient;
use super::error::{ProviderError, Result};
use super::types::{Completion, CompletionRequest};
use async_trait::async_trait;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;

/// Retry tuning.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 250,
            max_delay_ms: 4_000,
        }
    }
}

impl RetryConfig {
    /// Exponential backoff with full jitter, capped at `max_delay_ms`.
    fn delay_for(&self, attempt: u32) -> Duration {
        let exp = self.base_delay_ms.saturating_mul(1u64 << attempt.min(16));
        let capped = exp.min(self.max_delay_ms);
        let jittered = rand::rng().random_range(0..=capped);
        Duration::from_millis(jittered)
    }
}

/// An [`LlmClient`] decorator that absorbs transient transport failures.
pub struct RetryingClient {
    inner: Arc<dyn LlmClient>,
    config: RetryConfig,
}

impl RetryingClient {
    pub fn new(inner: Arc<dyn LlmClient>) -> Self {
        Self {
            inner,
            config: RetryConfig::default(),
        }
    }

    pub fn with_config(mut self, config: RetryConfig) -> Self {
        self.config = config;
        self
    }
}

#[async_trait]
impl LlmClient for RetryingClient {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion> {
        let mut attempt = 0u32;
        loop {
            match self.inner.complete(request.clone()).await {
                Ok(completion) => return Ok(completion),
                Err(ProviderError::Transport(message)) => {
                    attempt += 1;
                    if attempt >= self.config.max_attempts {
                        return Err(ProviderError::Transport(message));
                    }
                    let delay = self.config.delay_for(attempt);
                    tracing::warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "transport error from {}: {message}; retrying",
                        self.inner.name()
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(other) => return Err(other),
            }
        }
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}
