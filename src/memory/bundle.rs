//! The annotated context bundle handed to every agent in a turn.

use super::store::StoreId;
use serde::{Deserialize, Serialize};

/// One retrieved fragment, tagged with where it came from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fragment {
    pub source: StoreId,
    pub text: String,
    pub score: f32,
    pub provenance: String,
}

/// Immutable, ordered collection of retrieved fragments with an aggregate
/// relevance in [0, 1].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextBundle {
    pub fragments: Vec<Fragment>,
    pub relevance: f32,
    /// Set when a verification-required retrieval came back under-supported;
    /// downstream synthesis lowers its assertiveness.
    pub thin: bool,
}

impl ContextBundle {
    pub fn empty() -> Self {
        Self {
            fragments: Vec::new(),
            relevance: 0.0,
            thin: false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    /// True when any fragment from `source` scored at least `floor`.
    pub fn has_support_from(&self, source: StoreId, floor: f32) -> bool {
        self.fragments
            .iter()
            .any(|f| f.source == source && f.score >= floor)
    }

    /// True when any fragment at all scored at least `floor`.
    pub fn has_support(&self, floor: f32) -> bool {
        self.fragments.iter().any(|f| f.score >= floor)
    }

    /// Render the bundle as a prompt section. Empty string when nothing was
    /// retrieved.
    pub fn render(&self) -> String {
        if self.fragments.is_empty() {
            return String::new();
        }
        let mut out = String::from("## Retrieved context\n\n");
        for fragment in &self.fragments {
            out.push_str(&format!(
                "[{} | {} | score {:.2}]\n{}\n\n",
                fragment.source, fragment.provenance, fragment.score, fragment.text
            ));
        }
        out
    }
}
