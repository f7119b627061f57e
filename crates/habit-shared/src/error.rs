//! Error types for HabitLedger.

use thiserror::Error;

/// Knowledge base load and validation failures.
///
/// These are configuration errors: they abort startup and never occur
/// per turn.
#[derive(Error, Debug)]
pub enum KnowledgeError {
    #[error("Knowledge base contains no principles")]
    Empty,

    #[error("Duplicate principle id: {0}")]
    DuplicateId(String),

    #[error("Principle has an empty id (position {0})")]
    MissingId(usize),

    #[error("Principle '{0}' has no interventions")]
    NoInterventions(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl KnowledgeError {
    /// Stable short code for log fields
    pub fn code(&self) -> &'static str {
        match self {
            KnowledgeError::Empty => "kb_empty",
            KnowledgeError::DuplicateId(_) => "kb_duplicate_id",
            KnowledgeError::MissingId(_) => "kb_missing_id",
            KnowledgeError::NoInterventions(_) => "kb_no_interventions",
            KnowledgeError::Io(_) => "kb_io",
            KnowledgeError::Json(_) => "kb_json",
        }
    }
}
