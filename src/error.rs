//! Error types for the KSC metrics engine

use thiserror::Error;

/// Errors that can occur during computation.
///
/// Data-quality conditions (small samples, zero denominators) never surface
/// here; they become null cells. These variants signal invalid arguments.
#[derive(Debug, Error)]
pub enum ComputeError {
    #[error("Column not found: {0}")]
    ColumnNotFound(String),

    #[error("Duplicate column: {0}")]
    DuplicateColumn(String),

    #[error("Length mismatch: {0}")]
    LengthMismatch(String),

    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid precondition: {0}")]
    InvalidPrecondition(String),

    #[error("Date parse error: {0}")]
    DateParseError(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),
}
