//! Crate-wide error kinds.
//!
//! Every failure surfaced to a caller carries one of these named kinds so
//! terminal `error` events stay machine-matchable. Area-specific error enums
//! (provider, planner, stores, persistence) each map into a kind.

use serde::{Deserialize, Serialize};

/// Named failure kinds, as emitted in terminal `error` events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The requested agent set cannot be ordered (unsatisfiable dependency).
    InvalidSelection,
    /// A requested agent depends on an agent outside the selection and the
    /// deployment policy forbids auto-repair.
    MissingDependency,
    /// An agent's output failed schema validation after its retry.
    MalformedOutput,
    /// The LLM client reported provider-side throttling.
    RateLimited,
    /// A deadline elapsed (agent-level or turn-level).
    Timeout,
    /// A vector store reported itself unhealthy.
    StoreUnhealthy,
    /// The conversation record could not be written.
    PersistenceFailure,
    /// A transport-level failure survived the adapter's own retry.
    Transport,
    /// Anything that should not happen.
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidSelection => "invalid_selection",
            ErrorKind::MissingDependency => "missing_dependency",
            ErrorKind::MalformedOutput => "malformed_output",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::Timeout => "timeout",
            ErrorKind::StoreUnhealthy => "store_unhealthy",
            ErrorKind::PersistenceFailure => "persistence_failure",
            ErrorKind::Transport => "transport",
            ErrorKind::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::MissingDependency).unwrap();
        assert_eq!(json, "\"missing_dependency\"");
    }

    #[test]
    fn display_matches_wire_form() {
        assert_eq!(ErrorKind::InvalidSelection.to_string(), "invalid_selection");
        assert_eq!(ErrorKind::Timeout.to_string(), "timeout");
    }
}
