//! Engine error taxonomy.
//!
//! Signal-level failures are recovered locally (the signal contributes 0),
//! row validation failures are fatal on the write path, and expansion
//! failures degrade a query without aborting it. Every user-visible error
//! carries a short reason string and nothing else.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{kind} not found: '{name}'")]
    NotFound {
        kind: &'static str,
        name: String,
        /// Closest known name, offered to the caller as a hint.
        suggestion: Option<String>,
    },

    #[error("id collision: '{first}' and '{second}' both hash to {id}")]
    IdCollision { id: u32, first: String, second: String },

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("search failed: {0}")]
    Search(String),

    #[error("query expansion degraded: {0}")]
    ExpansionDegraded(String),

    #[error("signal scoring failed: {0}")]
    SignalScoring(String),

    #[error("invalid tool arguments: {0}")]
    InvalidArguments(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("storage error: {0}")]
    Storage(String),
}

impl EngineError {
    pub fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            name: name.into(),
            suggestion: None,
        }
    }

    pub fn not_found_with_hint(
        kind: &'static str,
        name: impl Into<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self::NotFound {
            kind,
            name: name.into(),
            suggestion: Some(suggestion.into()),
        }
    }

    /// Stable machine-readable code used in tool error payloads.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound { kind, .. } => match *kind {
                "category" => "CategoryNotFound",
                "concept" => "ConceptNotFound",
                "document" => "DocumentNotFound",
                _ => "NotFound",
            },
            Self::IdCollision { .. } => "IdCollision",
            Self::Validation(_) => "ValidationError",
            Self::Search(_) => "SearchError",
            Self::ExpansionDegraded(_) => "ExpansionDegraded",
            Self::SignalScoring(_) => "SignalScoringError",
            Self::InvalidArguments(_) => "InvalidArguments",
            Self::Cancelled => "Cancelled",
            Self::Storage(_) => "StorageError",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_are_short_reasons() {
        let err = EngineError::not_found("category", "quantum basket weaving");
        assert_eq!(err.to_string(), "category not found: 'quantum basket weaving'");
        assert_eq!(err.code(), "CategoryNotFound");

        let err = EngineError::IdCollision {
            id: 42,
            first: "alpha".into(),
            second: "beta".into(),
        };
        assert!(err.to_string().contains("alpha"));
        assert!(err.to_string().contains("beta"));
    }
}
