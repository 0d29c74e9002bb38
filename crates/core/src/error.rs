//! Error types for the core domain.

use thiserror::Error;

/// Core domain error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid deposit id: {0}")]
    InvalidDepositId(String),

    #[error("invalid digest: {0}")]
    InvalidDigest(String),

    #[error("unsupported content type: {0}")]
    UnsupportedContentType(String),

    #[error("unknown deposit state: {0}")]
    UnknownState(String),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
