//! Provider error types.

use crate::error::ErrorKind;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ProviderError>;

/// Failures an LLM client may surface to the core.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The provider rejected the call for quota reasons. Surfaced
    /// immediately so the caller's rate budget can be recalibrated.
    #[error("provider rate limited{}", retry_after_ms.map(|ms| format!(" (retry after {ms}ms)")).unwrap_or_default())]
    RateLimited { retry_after_ms: Option<u64> },

    /// The call did not complete within its deadline.
    #[error("provider call timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },

    /// The response could not be parsed against the target schema.
    #[error("malformed provider output: {0}")]
    MalformedOutput(String),

    /// Connection-level failure. The client is expected to retry these
    /// itself (bounded, jittered) before surfacing one.
    #[error("provider transport error: {0}")]
    Transport(String),
}

impl ProviderError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProviderError::RateLimited { .. } => ErrorKind::RateLimited,
            ProviderError::Timeout { .. } => ErrorKind::Timeout,
            ProviderError::MalformedOutput(_) => ErrorKind::MalformedOutput,
            ProviderError::Transport(_) => ErrorKind::Transport,
        }
    }
}
