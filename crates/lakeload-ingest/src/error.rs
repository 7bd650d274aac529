//! Error types for the ingestion engine
//!
//! Errors split into two families. Per-file errors (missing input, quality
//! gate, unreadable partition) are caught by the engine, written to the
//! ledger as FAIL and the run continues. Everything else is fatal to the run
//! and propagates to the caller.

use lakeload_common::CommonError;
use thiserror::Error;

/// Result type alias for ingestion operations
pub type Result<T> = std::result::Result<T, IngestError>;

#[derive(Error, Debug)]
pub enum IngestError {
    /// A file declared by the manifest is not in the landing directory
    #[error("Missing input: '{file}' is declared in the manifest but absent from {dir}")]
    MissingInput { file: String, dir: String },

    /// The data quality gate rejected a partition
    #[error("Quality gate failed for '{file}': {}", .violations.join("; "))]
    QualityGate {
        file: String,
        violations: Vec<String>,
    },

    /// A partition could not be read or decoded
    #[error("Unreadable partition '{file}': {reason}")]
    UnreadablePartition { file: String, reason: String },

    /// The analytical store rejected a read or write
    #[error("Store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid manifest '{path}': {reason}")]
    InvalidManifest { path: String, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Common(#[from] CommonError),
}

impl IngestError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn unreadable(file: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::UnreadablePartition {
            file: file.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether this error must abort the whole run
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            IngestError::MissingInput { .. }
                | IngestError::QualityGate { .. }
                | IngestError::UnreadablePartition { .. }
        )
    }

    /// Short reason stored in the ledger note for per-file failures
    pub fn ledger_note(&self) -> String {
        match self {
            IngestError::MissingInput { .. } => "missing input".to_string(),
            IngestError::QualityGate { violations, .. } => {
                format!("DQC FAIL: {}", violations.join("; "))
            },
            IngestError::UnreadablePartition { reason, .. } => format!("unreadable: {}", reason),
            other => other.to_string(),
        }
    }
}
