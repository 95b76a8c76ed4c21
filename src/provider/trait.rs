//! The abstract LLM client contract.

use super::error::Result;
use super::types::{Completion, CompletionRequest};
use async_trait::async_trait;

/// A completion-capable LLM endpoint.
///
/// The core never names a concrete vendor; it composes whatever implements
/// this. Clients are expected to honour `request.schema` either via
/// structured decoding (populating `Completion::fields`) or by emitting JSON
/// text the caller can parse, and to enforce `request.deadline` themselves.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion>;

    /// Short identifier for logs.
    fn name(&self) -> &str;
}
