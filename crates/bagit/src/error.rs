//! Bag validation error types.

use thiserror::Error;

/// Faults encountered while checking a bag.
///
/// A structurally bad bag is *not* an error; it is a [`Verdict::Invalid`]
/// result. Errors here mean the check itself could not be carried out.
///
/// [`Verdict::Invalid`]: crate::validate::Verdict::Invalid
#[derive(Debug, Error)]
pub enum BagError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt bag metadata: {0}")]
    Metadata(String),
}

/// Result type for bag checks.
pub type BagResult<T> = std::result::Result<T, BagError>;
