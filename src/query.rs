//! Query and user-facet types.
//!
//! A [`Query`] is immutable for the duration of a turn: the free-form text
//! plus the lightweight facets the caller knows about the user.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Self-declared risk tolerance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskTolerance {
    Low,
    Moderate,
    High,
}

/// Self-declared investing experience.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExperienceLevel {
    Beginner,
    Intermediate,
    Advanced,
    Expert,
}

/// Lightweight user context attached to a turn.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserFacets {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_tolerance: Option<RiskTolerance>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub experience: Option<ExperienceLevel>,

    /// BCP-47 language tag ("en", "pt-BR", ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,

    /// Reference to a previously ingested document the user attached.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attached_document: Option<Uuid>,
}

impl UserFacets {
    /// Render the facets as short prompt lines. Empty string when nothing is set.
    pub fn render(&self) -> String {
        let mut lines = Vec::new();
        if let Some(risk) = self.risk_tolerance {
            lines.push(format!("Risk tolerance: {risk:?}").to_lowercase());
        }
        if let Some(exp) = self.experience {
            lines.push(format!("Experience level: {exp:?}").to_lowercase());
        }
        if let Some(lang) = &self.language {
            lines.push(format!("preferred language: {lang}"));
        }
        lines.join("\n")
    }
}

/// One user turn's input, owned by the streaming session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Query {
    pub text: String,

    #[serde(default)]
    pub facets: UserFacets,

    /// Owner scope for conversation recall; `None` disables owner filtering.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<Uuid>,
}

impl Query {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            facets: UserFacets::default(),
            owner: None,
        }
    }

    pub fn with_facets(mut self, facets: UserFacets) -> Self {
        self.facets = facets;
        self
    }

    pub fn with_owner(mut self, owner: Uuid) -> Self {
        self.owner = Some(owner);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn facets_render_skips_unset_fields() {
        let facets = UserFacets {
            risk_tolerance: Some(RiskTolerance::Moderate),
            ..Default::default()
        };
        let rendered = facets.render();
        assert!(rendered.contains("moderate"));
        assert!(!rendered.contains("language"));
    }

    #[test]
    fn empty_facets_render_empty() {
        assert!(UserFacets::default().render().is_empty());
    }
}
