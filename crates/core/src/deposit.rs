//! Deposit identifiers, lifecycle states and package content types.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// An opaque, URL-safe deposit identifier.
///
/// Identifiers appear in receipt IRIs and in filesystem paths (the staging
/// and storage directories are named after them), so the accepted alphabet is
/// restricted to the URL-safe unreserved set.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DepositId(String);

impl DepositId {
    /// Maximum accepted identifier length.
    pub const MAX_LEN: usize = 64;

    /// Parse and validate an identifier.
    pub fn parse(s: &str) -> Result<Self> {
        if s.is_empty() || s.len() > Self::MAX_LEN {
            return Err(Error::InvalidDepositId(format!(
                "length must be between 1 and {}, got {}",
                Self::MAX_LEN,
                s.len()
            )));
        }
        if !s
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.' | b'~'))
        {
            return Err(Error::InvalidDepositId(format!(
                "contains characters outside the URL-safe set: {s}"
            )));
        }
        // "." and ".." would alias directory entries once used as a path.
        if s.bytes().all(|b| b == b'.') {
            return Err(Error::InvalidDepositId(format!("reserved name: {s}")));
        }
        Ok(Self(s.to_string()))
    }

    /// Generate a fresh random identifier.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// The identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DepositId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for DepositId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DepositId({})", self.0)
    }
}

/// Lifecycle state of a deposit.
///
/// Transitions form a DAG: `Draft` → `Finalizing` → one of the terminal
/// states. The string forms are the values stored in `deposit.properties`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DepositState {
    /// Open for additional parts.
    Draft,
    /// Handed to the finalization worker; no further parts accepted.
    Finalizing,
    /// Terminal: the package is archived on permanent storage.
    Submitted,
    /// Terminal: the client supplied malformed content.
    Invalid,
    /// Terminal: an operator-side or transient fault stopped the run.
    Failed,
}

impl DepositState {
    /// The record representation of this state.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "DRAFT",
            Self::Finalizing => "FINALIZING",
            Self::Submitted => "SUBMITTED",
            Self::Invalid => "INVALID",
            Self::Failed => "FAILED",
        }
    }

    /// Parse the record representation.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "DRAFT" => Ok(Self::Draft),
            "FINALIZING" => Ok(Self::Finalizing),
            "SUBMITTED" => Ok(Self::Submitted),
            "INVALID" => Ok(Self::Invalid),
            "FAILED" => Ok(Self::Failed),
            other => Err(Error::UnknownState(other.to_string())),
        }
    }

    /// Whether no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Submitted | Self::Invalid | Self::Failed)
    }
}

impl fmt::Display for DepositState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Content type of a deposited package.
///
/// `Single` payloads are complete archives; `Chunked` payloads arrive as an
/// ordered sequence of byte-range parts that are concatenated before
/// extraction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PackageType {
    Single,
    Chunked,
}

impl PackageType {
    /// The wire `Content-Type` value for this package type.
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Single => "archive/single",
            Self::Chunked => "archive/chunked",
        }
    }

    /// Parse a `Content-Type` header value.
    ///
    /// Media-type parameters (`; charset=...`) are ignored; the essence must
    /// match one of the two accepted values exactly.
    pub fn from_mime_type(value: &str) -> Result<Self> {
        let essence = value.split(';').next().unwrap_or("").trim();
        match essence {
            "archive/single" => Ok(Self::Single),
            "archive/chunked" => Ok(Self::Chunked),
            other => Err(Error::UnsupportedContentType(other.to_string())),
        }
    }
}
