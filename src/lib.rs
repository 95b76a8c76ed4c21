//! finsight — the reasoning core of a conversational financial-advisory
//! service.
//!
//! The crate couples a dependency-aware multi-agent orchestrator with an
//! intent-directed retrieval layer:
//!
//! - **Throttle:** a token-bucket rate budget and a bounded-concurrency
//!   batch executor sit between the orchestrator and the LLM client.
//! - **Agents:** a closed catalogue of specialised reasoning agents, each
//!   with a declared dependency set and output schema; requests are grouped
//!   into ordered execution stages.
//! - **Memory:** intent classification, per-intent retrieval planning, and
//!   similarity search over embedded corpora, assembled into one annotated
//!   context bundle per turn.
//! - **Session:** a per-turn state machine that streams `thought`, `token`
//!   and `metadata` events and persists the exchanged pair with embeddings.
//!
//! External surfaces (LLM vendor, embedding model, vector indexes,
//! persistence) are consumed through traits; every component takes its
//! collaborators through its constructor, so tests substitute fakes freely.
//!
//! ## Quick start
//!
//! ```ignore
//! let advisor = Advisor::builder(client, embedder, conversations, Config::default())
//!     .with_vector_store(education)
//!     .build();
//!
//! let mut events = advisor.process(TurnRequest::new(Query::new("What is a P/E ratio?")));
//! while let Some(event) = events.next().await {
//!     // thought / token / metadata
//! }
//! ```

pub mod agents;
pub mod config;
pub mod error;
pub mod logging;
pub mod memory;
pub mod orchestrator;
pub mod provider;
pub mod query;
pub mod session;
pub mod throttle;
pub mod tools;

// Re-export commonly used types
pub use agents::{AgentRegistry, AgentResult, AgentType, ExecutionPlan, SourceKind};
pub use config::Config;
pub use error::ErrorKind;
pub use memory::{ContextBundle, Embedder, Intent, VectorStore};
pub use provider::{Completion, CompletionRequest, LlmClient, ProviderError};
pub use query::{Query, UserFacets};
pub use session::{
    Advisor, ChatEvent, ConversationStore, TurnMetadata, TurnRequest, TurnStatus,
};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
