//! The abstract embedder contract.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EmbedError {
    #[error("embedder transport error: {0}")]
    Transport(String),
}

/// Turns text into a fixed-dimensional vector.
///
/// Implementations must be deterministic: identical inputs produce identical
/// vectors, which is what makes persisted-message recall reproducible.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError>;

    /// Output dimensionality; every vector returned by `embed` has this length.
    fn dimension(&self) -> usize;
}
