//! Storage error types.

use thiserror::Error;

/// Storage operation errors.
///
/// The finalization orchestrator classifies these into client-invalid and
/// operator-transient terminal states; the variants keep the two apart.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid part name: {0}")]
    InvalidPartName(String),

    #[error("incorrect extension; should be a sequence number: {0}")]
    InvalidSequence(String),

    #[error("inconsistent dataset: {0}")]
    InconsistentDataset(String),

    #[error("archive error: {0}")]
    Archive(String),

    #[error("archive entry escapes destination: {0}")]
    PathEscape(String),

    #[error("malformed deposit record: {0}")]
    Record(String),
}

/// Result type for storage operations.
pub type StorageResult<T> = std::result::Result<T, StorageError>;
