//! Shared fakes for integration tests: a scriptable LLM client and a
//! deterministic embedder.
#![allow(dead_code)]

use async_trait::async_trait;
use finsight::memory::EmbedError;
use finsight::provider::{
    Completion, CompletionRequest, FieldKind, ProviderError, SchemaDescriptor,
};
use finsight::{Embedder, LlmClient};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// How the mock should treat calls for one schema.
#[derive(Debug, Clone)]
pub enum Behavior {
    /// Answer with generated schema-conformant JSON and this recommendation.
    Answer { recommendation: String },
    /// Always return `MalformedOutput`.
    Malformed,
    /// Sleep this long before answering (exercises deadlines).
    Stall(Duration),
}

/// Mock LLM client: generates schema-conformant replies, tracks call counts
/// and peak concurrency, and can be scripted to misbehave per agent schema.
pub struct MockClient {
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    behaviors: Mutex<HashMap<String, Behavior>>,
    calls_per_schema: Mutex<HashMap<String, usize>>,
}

impl Default for MockClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MockClient {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
            behaviors: Mutex::new(HashMap::new()),
            calls_per_schema: Mutex::new(HashMap::new()),
        }
    }

    pub fn set_behavior(&self, schema_name: &str, behavior: Behavior) {
        self.behaviors
            .lock()
            .unwrap()
            .insert(schema_name.to_string(), behavior);
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn calls_for(&self, schema_name: &str) -> usize {
        self.calls_per_schema
            .lock()
            .unwrap()
            .get(schema_name)
            .copied()
            .unwrap_or(0)
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    fn behavior_for(&self, schema_name: &str) -> Behavior {
        self.behaviors
            .lock()
            .unwrap()
            .get(schema_name)
            .cloned()
            .unwrap_or(Behavior::Answer {
                recommendation: "hold".to_string(),
            })
    }
}

/// Generate a value satisfying every field of the schema.
pub fn conforming_reply(schema: &SchemaDescriptor, recommendation: &str) -> Value {
    let mut object = serde_json::Map::new();
    for field in &schema.fields {
        let value = match (&field.name[..], &field.kind) {
            ("analysis", _) => json!(format!("Generated analysis from {}", schema.name)),
            ("recommendation", _) => json!(recommendation),
            ("confidence", _) => json!(80),
            ("sources_used", _) => json!(["llm_knowledge"]),
            (_, FieldKind::Text) => json!("generated"),
            (_, FieldKind::TextList) => json!(["generated"]),
            (_, FieldKind::Number { min, .. }) => json!(min.unwrap_or(0.0)),
            (_, FieldKind::Enumeration(labels)) => json!(labels[0]),
        };
        object.insert(field.name.clone(), value);
    }
    Value::Object(object)
}

#[async_trait]
impl LlmClient for MockClient {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, ProviderError> {
        let schema_name = request
            .schema
            .as_ref()
            .map(|s| s.name.clone())
            .unwrap_or_else(|| "freeform".to_string());

        self.calls.fetch_add(1, Ordering::SeqCst);
        *self
            .calls_per_schema
            .lock()
            .unwrap()
            .entry(schema_name.clone())
            .or_insert(0) += 1;

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);

        let result = match self.behavior_for(&schema_name) {
            Behavior::Malformed => Err(ProviderError::MalformedOutput(
                "scripted malformed reply".to_string(),
            )),
            Behavior::Stall(duration) => {
                tokio::time::sleep(duration).await;
                Ok(self.answer(&request, "hold"))
            }
            Behavior::Answer { recommendation } => Ok(self.answer(&request, &recommendation)),
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn name(&self) -> &str {
        "mock"
    }
}

impl MockClient {
    fn answer(&self, request: &CompletionRequest, recommendation: &str) -> Completion {
        let fields = request
            .schema
            .as_ref()
            .map(|schema| conforming_reply(schema, recommendation));
        Completion {
            text: fields
                .as_ref()
                .map(Value::to_string)
                .unwrap_or_else(|| "free-form reply".to_string()),
            fields,
            tokens_used: 42,
        }
    }
}

/// Deterministic toy embedder: projects character histograms onto a small
/// fixed basis. Identical inputs always produce identical vectors.
pub struct HashEmbedder {
    dimension: usize,
}

impl HashEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let mut vector = vec![0.0f32; self.dimension];
        for (index, ch) in text.to_lowercase().chars().enumerate() {
            let axis = (ch as usize + index) % self.dimension;
            vector[axis] += 1.0;
        }
        Ok(vector)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
