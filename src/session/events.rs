//! Events emitted over a turn's stream.

use crate::agents::SourceKind;
use crate::error::ErrorKind;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Terminal disposition of a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnStatus {
    /// Every consulted agent succeeded.
    Ok,
    /// The turn completed but some agents failed or context was thin.
    Partial,
    /// Planner error or turn deadline; no synthesis was produced.
    Failed,
}

/// Terminal metadata for one turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<Uuid>,
    pub status: TurnStatus,
    /// Consolidated confidence in [0, 100].
    pub confidence: f64,
    pub duration_ms: u64,
    pub agents_consulted: Vec<String>,
    pub sources_used: Vec<SourceKind>,
    /// False when the turn completed but its record could not be written.
    pub persisted: bool,
}

/// One tagged event on the per-turn stream.
///
/// Emission is totally ordered per turn; each `Token` carries only an
/// appended suffix of the synthesis.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatEvent {
    Thought {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        agent: Option<String>,
    },
    Token {
        delta: String,
    },
    Metadata(TurnMetadata),
    Error {
        kind: ErrorKind,
        message: String,
    },
}

impl ChatEvent {
    pub fn thought(message: impl Into<String>) -> Self {
        ChatEvent::Thought {
            message: message.into(),
            agent: None,
        }
    }

    pub fn agent_thought(agent: &str, message: impl Into<String>) -> Self {
        ChatEvent::Thought {
            message: message.into(),
            agent: Some(agent.to_string()),
        }
    }
}
