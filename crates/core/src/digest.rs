//! Payload digest type and utilities.
//!
//! The deposit protocol transmits per-part checksums as lowercase hex MD5,
//! and BagIt payload manifests in this service are MD5 manifests, so MD5 is
//! the digest everywhere a client-supplied checksum is compared.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// An MD5 payload digest represented as 16 bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PayloadDigest([u8; 16]);

impl PayloadDigest {
    /// Create a digest from raw bytes.
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Compute the digest of a byte slice.
    pub fn compute(data: &[u8]) -> Self {
        Self(md5::compute(data).0)
    }

    /// Create an incremental hasher.
    pub fn hasher() -> PayloadHasher {
        PayloadHasher(md5::Context::new())
    }

    /// Parse from a lowercase or uppercase hex string.
    pub fn from_hex(s: &str) -> Result<Self> {
        if s.len() != 32 {
            return Err(Error::InvalidDigest(format!(
                "expected 32 hex chars, got {}",
                s.len()
            )));
        }
        let mut bytes = [0u8; 16];
        for (i, chunk) in s.as_bytes().chunks(2).enumerate() {
            let hex_str =
                std::str::from_utf8(chunk).map_err(|e| Error::InvalidDigest(e.to_string()))?;
            bytes[i] = u8::from_str_radix(hex_str, 16)
                .map_err(|e| Error::InvalidDigest(e.to_string()))?;
        }
        Ok(Self(bytes))
    }

    /// Encode as a lowercase hex string.
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{b:02x}")).collect()
    }
}

impl fmt::Debug for PayloadDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PayloadDigest({})", self.to_hex())
    }
}

impl fmt::Display for PayloadDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Incremental MD5 hasher.
pub struct PayloadHasher(md5::Context);

impl PayloadHasher {
    /// Update the hasher with data.
    pub fn update(&mut self, data: &[u8]) {
        self.0.consume(data);
    }

    /// Finalize and return the digest.
    pub fn finalize(self) -> PayloadDigest {
        PayloadDigest(self.0.compute().0)
    }
}
