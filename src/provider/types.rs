//! Request/response types for the LLM client contract.

use super::schema::SchemaDescriptor;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One completion request.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// Fully rendered prompt text.
    pub prompt: String,

    /// Target output schema; `None` means free-form text.
    pub schema: Option<SchemaDescriptor>,

    /// Output token ceiling.
    pub max_tokens: u32,

    /// Per-call deadline. Clients must give up (and surface `Timeout`)
    /// once this much wall-clock time has elapsed.
    pub deadline: Duration,
}

impl CompletionRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            schema: None,
            max_tokens: 1024,
            deadline: Duration::from_secs(25),
        }
    }

    pub fn with_schema(mut self, schema: SchemaDescriptor) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }
}

/// One completion response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Completion {
    /// Raw response text.
    pub text: String,

    /// Schema-shaped fields, when the client performed structured decoding.
    /// Callers fall back to parsing `text` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<serde_json::Value>,

    /// Total tokens consumed by the call.
    pub tokens_used: u32,
}
