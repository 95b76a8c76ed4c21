//! Uniform similarity search over embedded corpora.
//!
//! Each corpus (past conversations, the educational knowledge base, ingested
//! documents, market commentary) sits behind the same adapter trait. An
//! unhealthy store yields empty results at the call site, never a failed
//! turn.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use uuid::Uuid;

/// The closed set of corpora the retrieval layer can query.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum StoreId {
    Conversations,
    Education,
    Documents,
    Market,
}

impl StoreId {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreId::Conversations => "conversations",
            StoreId::Education => "education",
            StoreId::Documents => "documents",
            StoreId::Market => "market",
        }
    }
}

impl std::fmt::Display for StoreId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Row visibility for shared corpora.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    Public,
    Private,
}

/// Search-time filters. Unset fields do not constrain.
#[derive(Debug, Clone, Default)]
pub struct SearchFilters {
    /// Restrict to rows owned by this principal (conversation recall).
    pub owner: Option<Uuid>,
    /// Restrict to chunks of one ingested document.
    pub document: Option<Uuid>,
    pub visibility: Option<Visibility>,
}

/// One similarity hit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredText {
    pub text: String,
    /// Cosine similarity clamped to [0, 1].
    pub score: f32,
    /// Human-readable origin ("conversation 42, turn 3", "kb: bonds-101", ...).
    pub provenance: String,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store '{0}' is unhealthy")]
    Unhealthy(StoreId),
    #[error("embedding dimension mismatch: store expects {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
}

/// Uniform similarity search over one embedded corpus.
#[async_trait]
pub trait VectorStore: Send + Sync {
    fn id(&self) -> StoreId;

    /// Top-`k` results by cosine similarity, sorted descending.
    async fn search(
        &self,
        embedding: &[f32],
        k: usize,
        filters: &SearchFilters,
    ) -> Result<Vec<ScoredText>, StoreError>;

    /// Callers treat an unhealthy store as an empty result.
    fn healthy(&self) -> bool;
}

// ─── Reference in-memory implementation ──────────────────────

struct Entry {
    text: String,
    embedding: Vec<f32>,
    owner: Option<Uuid>,
    document: Option<Uuid>,
    visibility: Visibility,
    provenance: String,
}

/// In-memory cosine index. Backs the test corpora and small deployments;
/// production indexes implement [`VectorStore`] over their own engines.
pub struct InMemoryVectorStore {
    id: StoreId,
    dimension: usize,
    entries: RwLock<Vec<Entry>>,
    healthy: AtomicBool,
}

impl InMemoryVectorStore {
    pub fn new(id: StoreId, dimension: usize) -> Self {
        Self {
            id,
            dimension,
            entries: RwLock::new(Vec::new()),
            healthy: AtomicBool::new(true),
        }
    }

    pub fn insert(
        &self,
        text: impl Into<String>,
        embedding: Vec<f32>,
        provenance: impl Into<String>,
    ) {
        self.insert_scoped(text, embedding, provenance, None, None, Visibility::Public);
    }

    pub fn insert_scoped(
        &self,
        text: impl Into<String>,
        embedding: Vec<f32>,
        provenance: impl Into<String>,
        owner: Option<Uuid>,
        document: Option<Uuid>,
        visibility: Visibility,
    ) {
        debug_assert_eq!(embedding.len(), self.dimension);
        self.entries
            .write()
            .expect("vector store lock poisoned")
            .push(Entry {
                text: text.into(),
                embedding,
                owner,
                document,
                visibility,
                provenance: provenance.into(),
            });
    }

    /// Flip the health flag; used to simulate a degraded index.
    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.entries.read().expect("vector store lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Cosine similarity mapped onto [0, 1]; negative similarity clamps to zero.
fn cosine_score(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a * norm_b)).clamp(0.0, 1.0)
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    fn id(&self) -> StoreId {
        self.id
    }

    async fn search(
        &self,
        embedding: &[f32],
        k: usize,
        filters: &SearchFilters,
    ) -> Result<Vec<ScoredText>, StoreError> {
        if !self.healthy() {
            return Err(StoreError::Unhealthy(self.id));
        }
        if embedding.len() != self.dimension {
            return Err(StoreError::DimensionMismatch {
                expected: self.dimension,
                got: embedding.len(),
            });
        }

        let entries = self.entries.read().expect("vector store lock poisoned");
        let mut hits: Vec<ScoredText> = entries
            .iter()
            .filter(|e| filters.owner.is_none() || e.owner == filters.owner)
            .filter(|e| filters.document.is_none() || e.document == filters.document)
            .filter(|e| {
                filters
                    .visibility
                    .is_none_or(|wanted| e.visibility == wanted)
            })
            .map(|e| ScoredText {
                text: e.text.clone(),
                score: cosine_score(embedding, &e.embedding),
                provenance: e.provenance.clone(),
            })
            .collect();

        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(k);
        Ok(hits)
    }

    fn healthy(&self) -> bool {
        self.healthy.load(Ordering::SeqCst)
    }
}
