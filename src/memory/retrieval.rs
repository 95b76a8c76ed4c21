//! Intent-directed retrieval: classify, plan, embed, fan out, assemble.

use super::bundle::{ContextBundle, Fragment};
use super::embedding::Embedder;
use super::intent::{IntentClassifier, IntentScore};
use super::plan::RetrievalPlan;
use super::store::{SearchFilters, StoreId, VectorStore};
use crate::query::Query;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

/// What one retrieval pass produced.
#[derive(Debug, Clone)]
pub struct Retrieval {
    pub intent: IntentScore,
    pub plan: RetrievalPlan,
    pub bundle: ContextBundle,
}

/// Orchestrates classification, planning and similarity search into one
/// annotated context bundle per turn.
pub struct RagService {
    classifier: IntentClassifier,
    embedder: Arc<dyn Embedder>,
    stores: BTreeMap<StoreId, Arc<dyn VectorStore>>,
    verification_threshold: f32,
}

impl RagService {
    pub fn new(
        classifier: IntentClassifier,
        embedder: Arc<dyn Embedder>,
        verification_threshold: f32,
    ) -> Self {
        Self {
            classifier,
            embedder,
            stores: BTreeMap::new(),
            verification_threshold,
        }
    }

    /// Register the adapter for one corpus. A store the planner selects but
    /// nobody registered behaves like an empty one.
    pub fn with_store(mut self, store: Arc<dyn VectorStore>) -> Self {
        self.stores.insert(store.id(), store);
        self
    }

    pub fn classifier(&self) -> &IntentClassifier {
        &self.classifier
    }

    /// Classify the query's intent (rules first, optional model fallback).
    pub async fn classify(&self, query: &Query) -> IntentScore {
        self.classifier.classify(query).await
    }

    /// Full retrieval pass for a turn.
    pub async fn retrieve(&self, query: &Query) -> Retrieval {
        let intent = self.classify(query).await;
        self.retrieve_with_intent(query, intent).await
    }

    /// Retrieval with a pre-computed intent (the session classifies once and
    /// reuses the result for agent selection).
    pub async fn retrieve_with_intent(&self, query: &Query, intent: IntentScore) -> Retrieval {
        let plan = RetrievalPlan::for_intent(intent.intent, &query.facets);

        let embedding = match self.embedder.embed(&query.text).await {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!("query embedding failed, returning empty bundle: {e}");
                return Retrieval {
                    intent,
                    plan,
                    bundle: ContextBundle::empty(),
                };
            }
        };

        let mut fragments = Vec::new();
        let mut seen: HashSet<[u8; 32]> = HashSet::new();

        for (store_id, k) in &plan.stores {
            let Some(store) = self.stores.get(store_id) else {
                tracing::debug!("no adapter registered for store {store_id}, skipping");
                continue;
            };
            if !store.healthy() {
                tracing::warn!("store {store_id} unhealthy, treating as empty");
                continue;
            }

            let filters = self.filters_for(*store_id, query);
            let hits = match store.search(&embedding, *k, &filters).await {
                Ok(hits) => hits,
                Err(e) => {
                    tracing::warn!("search against {store_id} failed, treating as empty: {e}");
                    continue;
                }
            };

            for hit in hits {
                if seen.insert(content_hash(&hit.text)) {
                    fragments.push(Fragment {
                        source: *store_id,
                        text: hit.text,
                        score: hit.score,
                        provenance: hit.provenance,
                    });
                }
            }
        }

        let score_sum: f32 = fragments.iter().map(|f| f.score).sum();
        let relevance = if plan.expected_minimum > 0.0 {
            (score_sum / plan.expected_minimum).min(1.0)
        } else {
            0.0
        };
        let thin = plan.needs_verification && relevance < self.verification_threshold;
        if thin {
            tracing::info!(
                relevance,
                threshold = self.verification_threshold,
                "verification-required retrieval is thin"
            );
        }

        Retrieval {
            intent,
            plan,
            bundle: ContextBundle {
                fragments,
                relevance,
                thin,
            },
        }
    }

    fn filters_for(&self, store: StoreId, query: &Query) -> SearchFilters {
        match store {
            StoreId::Conversations => SearchFilters {
                owner: query.owner,
                ..Default::default()
            },
            StoreId::Documents => SearchFilters {
                document: query.facets.attached_document,
                ..Default::default()
            },
            StoreId::Education | StoreId::Market => SearchFilters::default(),
        }
    }
}

/// Dedup key: SHA-256 over the lowercased, whitespace-collapsed text.
fn content_hash(text: &str) -> [u8; 32] {
    let normalised = text.split_whitespace().collect::<Vec<_>>().join(" ");
    let digest = Sha256::digest(normalised.to_lowercase().as_bytes());
    digest.into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::embedding::EmbedError;
    use crate::memory::store::InMemoryVectorStore;
    use async_trait::async_trait;

    /// Deterministic toy embedder: counts cue words onto fixed axes.
    struct KeywordEmbedder;

    #[async_trait]
    impl Embedder for KeywordEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
            let lower = text.to_lowercase();
            let mut v = vec![0.0f32; 4];
            for word in lower.split_whitespace() {
                let axis = (word.len() + word.chars().next().map_or(0, |c| c as usize)) % 4;
                v[axis] += 1.0;
            }
            Ok(v)
        }

        fn dimension(&self) -> usize {
            4
        }
    }

    async fn embed(text: &str) -> Vec<f32> {
        KeywordEmbedder.embed(text).await.unwrap()
    }

    fn service_with_education(store: Arc<InMemoryVectorStore>) -> RagService {
        RagService::new(IntentClassifier::new(), Arc::new(KeywordEmbedder), 0.3)
            .with_store(store)
    }

    #[tokio::test]
    async fn retrieval_tags_fragments_with_source() {
        let store = Arc::new(InMemoryVectorStore::new(StoreId::Education, 4));
        store.insert(
            "A P/E ratio compares price to earnings",
            embed("A P/E ratio compares price to earnings").await,
            "kb:pe-ratio",
        );

        let service = service_with_education(store);
        let retrieval = service
            .retrieve(&Query::new("What is a P/E ratio?"))
            .await;

        assert!(!retrieval.bundle.is_empty());
        assert!(
            retrieval
                .bundle
                .fragments
                .iter()
                .all(|f| f.source == StoreId::Education)
        );
    }

    #[tokio::test]
    async fn near_identical_fragments_dedup() {
        let store = Arc::new(InMemoryVectorStore::new(StoreId::Education, 4));
        let text_a = "Bonds  pay  fixed coupons";
        let text_b = "bonds pay fixed COUPONS";
        store.insert(text_a, embed(text_a).await, "kb:a");
        store.insert(text_b, embed(text_b).await, "kb:b");

        let service = service_with_education(store);
        let retrieval = service.retrieve(&Query::new("What is a bond?")).await;
        assert_eq!(retrieval.bundle.fragments.len(), 1);
    }

    #[tokio::test]
    async fn unhealthy_store_yields_empty_bundle_not_error() {
        let store = Arc::new(InMemoryVectorStore::new(StoreId::Education, 4));
        store.insert("anything", embed("anything").await, "kb:x");
        store.set_healthy(false);

        let service = service_with_education(store);
        let retrieval = service.retrieve(&Query::new("What is a bond?")).await;
        assert!(retrieval.bundle.is_empty());
        assert_eq!(retrieval.bundle.relevance, 0.0);
    }

    #[tokio::test]
    async fn thin_flag_set_for_unsupported_verification_intent() {
        // portfolio advice requires verification; nothing is registered so
        // relevance stays zero
        let service =
            RagService::new(IntentClassifier::new(), Arc::new(KeywordEmbedder), 0.3);
        let retrieval = service
            .retrieve(&Query::new("Should I move all my tech stocks to bonds now?"))
            .await;
        assert!(retrieval.plan.needs_verification);
        assert!(retrieval.bundle.thin);
    }

    #[tokio::test]
    async fn relevance_caps_at_one() {
        let store = Arc::new(InMemoryVectorStore::new(StoreId::Education, 4));
        let text = "hello hello hello";
        for i in 0..8 {
            store.insert(format!("{text} {i}"), embed(text).await, format!("kb:{i}"));
        }

        let service = service_with_education(store);
        let retrieval = service.retrieve(&Query::new("hello hello hello")).await;
        assert!(retrieval.bundle.relevance <= 1.0);
    }
}
