//! The agent output contract shared by the whole catalogue.

use super::catalog::AgentType;
use crate::provider::{SchemaDescriptor, SchemaViolation};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;

/// Where an answer's substance came from.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    KnowledgeBase,
    LlmKnowledge,
    MarketData,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::KnowledgeBase => "knowledge_base",
            SourceKind::LlmKnowledge => "llm_knowledge",
            SourceKind::MarketData => "market_data",
        }
    }

    fn parse(label: &str) -> Option<Self> {
        match label {
            "knowledge_base" => Some(SourceKind::KnowledgeBase),
            "llm_knowledge" => Some(SourceKind::LlmKnowledge),
            "market_data" => Some(SourceKind::MarketData),
            _ => None,
        }
    }
}

/// The fields every agent must return, plus whatever its own schema adds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentOutput {
    pub analysis: String,
    pub recommendation: String,
    /// Certainty in [0, 100].
    pub confidence: f64,
    pub sources_used: BTreeSet<SourceKind>,
    /// Agent-specific fields, schema-validated but otherwise opaque here.
    #[serde(default)]
    pub extra: serde_json::Map<String, Value>,
}

impl AgentOutput {
    /// Validate a parsed response against the agent's declared schema and
    /// lift the shared base fields out of it.
    pub fn from_value(schema: &SchemaDescriptor, value: Value) -> Result<Self, SchemaViolation> {
        schema.validate(&value)?;
        let object = value
            .as_object()
            .ok_or_else(|| SchemaViolation::NotAnObject(schema.name.clone()))?;

        let analysis = object
            .get("analysis")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let recommendation = object
            .get("recommendation")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let confidence = object
            .get("confidence")
            .and_then(Value::as_f64)
            .unwrap_or(0.0)
            .clamp(0.0, 100.0);

        // Unknown source labels are dropped rather than failing the agent.
        let sources_used = object
            .get("sources_used")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .filter_map(SourceKind::parse)
                    .collect()
            })
            .unwrap_or_default();

        let base = ["analysis", "recommendation", "confidence", "sources_used"];
        let extra = object
            .iter()
            .filter(|(key, _)| !base.contains(&key.as_str()))
            .map(|(key, val)| (key.clone(), val.clone()))
            .collect();

        Ok(Self {
            analysis,
            recommendation,
            confidence,
            sources_used,
            extra,
        })
    }
}

/// One agent's contribution to a turn. Written once, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentResult {
    pub agent: AgentType,
    pub output: Option<AgentOutput>,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
}

impl AgentResult {
    pub fn succeeded(
        agent: AgentType,
        output: AgentOutput,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            agent,
            output: Some(output),
            success: true,
            error: None,
            started_at,
            ended_at: Utc::now(),
        }
    }

    pub fn failed(
        agent: AgentType,
        error: impl Into<String>,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            agent,
            output: None,
            success: false,
            error: Some(error.into()),
            started_at,
            ended_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::FieldKind;
    use serde_json::json;

    fn schema() -> SchemaDescriptor {
        SchemaDescriptor::new("test")
            .field("analysis", "prose", FieldKind::Text, true)
            .field("recommendation", "action", FieldKind::Text, true)
            .field(
                "confidence",
                "0-100",
                FieldKind::Number {
                    min: Some(0.0),
                    max: Some(100.0),
                },
                true,
            )
            .field("sources_used", "sources", FieldKind::TextList, true)
    }

    #[test]
    fn base_fields_are_lifted() {
        let value = json!({
            "analysis": "solid quarter",
            "recommendation": "hold",
            "confidence": 72,
            "sources_used": ["knowledge_base", "llm_knowledge"],
            "trend": "bullish"
        });
        let output = AgentOutput::from_value(&schema(), value).unwrap();
        assert_eq!(output.recommendation, "hold");
        assert!(output.sources_used.contains(&SourceKind::KnowledgeBase));
        assert_eq!(output.extra.get("trend"), Some(&json!("bullish")));
    }

    #[test]
    fn unknown_source_labels_are_dropped() {
        let value = json!({
            "analysis": "a",
            "recommendation": "r",
            "confidence": 10,
            "sources_used": ["knowledge_base", "crystal_ball"]
        });
        let output = AgentOutput::from_value(&schema(), value).unwrap();
        assert_eq!(output.sources_used.len(), 1);
    }

    #[test]
    fn schema_violation_propagates() {
        let value = json!({"recommendation": "r", "confidence": 10, "sources_used": []});
        assert!(AgentOutput::from_value(&schema(), value).is_err());
    }
}
