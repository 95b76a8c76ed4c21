//! Semantic memory: embedded corpora, intent-directed retrieval planning,
//! and context-bundle assembly.

pub mod bundle;
pub mod embedding;
pub mod intent;
pub mod plan;
pub mod retrieval;
pub mod store;

pub use bundle::{ContextBundle, Fragment};
pub use embedding::{EmbedError, Embedder};
pub use intent::{Intent, IntentClassifier, IntentScore};
pub use plan::{RetrievalPlan, TimeHorizon};
pub use retrieval::{RagService, Retrieval};
pub use store::{
    InMemoryVectorStore, ScoredText, SearchFilters, StoreError, StoreId, VectorStore, Visibility,
};
