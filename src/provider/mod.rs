//! LLM Provider Abstraction Layer
//!
//! Provides a unified interface to whatever completion endpoint the
//! deployment wires in. The core depends only on this contract.

pub mod error;
pub mod retry;
pub mod schema;
#[allow(clippy::module_inception)]
mod r#trait;
pub mod types;

// Re-exports
pub use error::{ProviderError, Result};
pub use retry::{RetryConfig, RetryingClient};
pub use schema::{FieldKind, FieldSpec, SchemaDescriptor, SchemaViolation};
pub use r#trait::LlmClient;
pub use types::{Completion, CompletionRequest};
