// ⚠️ Error taxonomy for the ingestion pipeline
//
// Containment is per legislator. The only error that stops a run by itself
// is SourceExhausted; everything else is caught by the orchestrator, logged,
// and the next legislator is processed.

use std::fmt;
use thiserror::Error;

/// Result type alias using the pipeline's error
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Which cross-source join failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MappingKind {
    Region,
    SecondaryIdentity,
}

impl fmt::Display for MappingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MappingKind::Region => write!(f, "region"),
            MappingKind::SecondaryIdentity => write!(f, "secondary identity"),
        }
    }
}

#[derive(Error, Debug)]
pub enum PipelineError {
    // Source errors (E100-E199)
    #[error("Transient source failure: {url} answered HTTP {status}")]
    TransientSource { url: String, status: u16 },

    #[error("Source exhausted: {url} still failing after {attempts} attempts")]
    SourceExhausted { url: String, attempts: u32 },

    #[error("Network error contacting {url}: {message}")]
    Network { url: String, message: String },

    // Parse errors (E200-E299)
    #[error("Parse error: {0}")]
    Parse(String),

    // Reconciliation errors (E300-E399)
    #[error("No {mapping} mapping for constituency '{key}'")]
    MissingMapping { mapping: MappingKind, key: String },

    #[error("Validation failed: {0}")]
    Validation(String),

    // Persistence errors (E400-E499)
    #[error("Graph store rejected write: {0}")]
    Persistence(String),

    // Generic errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<rusqlite::Error> for PipelineError {
    fn from(err: rusqlite::Error) -> Self {
        PipelineError::Persistence(err.to_string())
    }
}

impl PipelineError {
    /// Stable code for log lines and run reports
    pub fn code(&self) -> &'static str {
        match self {
            Self::TransientSource { .. } => "E100",
            Self::SourceExhausted { .. } => "E101",
            Self::Network { .. } => "E102",
            Self::Parse(_) => "E200",
            Self::MissingMapping { .. } => "E300",
            Self::Validation(_) => "E301",
            Self::Persistence(_) => "E400",
            Self::Config(_) => "E600",
            Self::Json(_) => "E900",
            Self::Io(_) => "E901",
        }
    }

    /// Aborts the whole run
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::SourceExhausted { .. })
    }

    /// Every persisted legislator must carry a display name from the
    /// secondary source, so a missing identity join is reported as critical.
    pub fn is_critical(&self) -> bool {
        matches!(
            self,
            Self::SourceExhausted { .. }
                | Self::MissingMapping {
                    mapping: MappingKind::SecondaryIdentity,
                    ..
                }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_exhaustion_is_fatal() {
        let exhausted = PipelineError::SourceExhausted {
            url: "https://members.example/search".to_string(),
            attempts: 30,
        };
        let transient = PipelineError::TransientSource {
            url: "https://members.example/search".to_string(),
            status: 503,
        };

        assert!(exhausted.is_fatal());
        assert!(!transient.is_fatal());
        assert!(!PipelineError::Parse("bad".to_string()).is_fatal());
        assert_eq!(exhausted.code(), "E101");
    }

    #[test]
    fn test_missing_secondary_identity_is_critical() {
        let region = PipelineError::MissingMapping {
            mapping: MappingKind::Region,
            key: "nowhere".to_string(),
        };
        let identity = PipelineError::MissingMapping {
            mapping: MappingKind::SecondaryIdentity,
            key: "nowhere".to_string(),
        };

        assert!(!region.is_critical());
        assert!(identity.is_critical());
        assert_eq!(
            identity.to_string(),
            "No secondary identity mapping for constituency 'nowhere'"
        );
    }

    #[test]
    fn test_sqlite_errors_become_persistence() {
        let err: PipelineError = rusqlite::Error::InvalidQuery.into();
        assert!(matches!(err, PipelineError::Persistence(_)));
        assert_eq!(err.code(), "E400");
    }
}
