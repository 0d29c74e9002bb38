//! Versioning error types.

use thiserror::Error;

/// Faults from repository operations.
#[derive(Debug, Error)]
pub enum VcsError {
    #[error("git error: {0}")]
    Git(#[from] git2::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for versioning operations.
pub type VcsResult<T> = std::result::Result<T, VcsError>;
