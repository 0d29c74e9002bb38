//! Deposit receipt model and SWORD error IRIs.

use crate::deposit::DepositId;
use crate::digest::PayloadDigest;
use serde::{Deserialize, Serialize};

/// Packaging IRI advertised for every accepted deposit.
pub const PACKAGING_BAGIT: &str = "http://purl.org/net/sword/package/BagIt";

/// Treatment description included in every receipt.
pub const TREATMENT: &str = "[1] unpacking [2] verifying integrity [3] storing persistently";

/// Error IRIs surfaced to clients on the synchronous path.
pub mod error_iri {
    /// Payload write failure.
    pub const BAD_REQUEST: &str = "http://purl.org/net/sword/error/ErrorBadRequest";
    /// Per-part MD5 disagreement.
    pub const CHECKSUM_MISMATCH: &str = "http://purl.org/net/sword/error/ErrorChecksumMismatch";
    /// Continuation against a deposit that is not in `DRAFT`.
    pub const METHOD_NOT_ALLOWED: &str = "http://purl.org/net/sword/error/MethodNotAllowed";
}

/// The receipt returned after every accepted part.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DepositReceipt {
    /// Container IRI of the deposit.
    #[serde(rename = "editIRI")]
    pub edit_iri: String,
    /// IRI further parts of an in-progress deposit are sent to.
    #[serde(rename = "editMediaIRI")]
    pub edit_media_iri: String,
    /// IRI of the deposit statement.
    #[serde(rename = "statementURI")]
    pub statement_uri: String,
    /// Accepted packaging formats.
    pub packaging: Vec<String>,
    /// Fixed description of how the deposit will be processed.
    pub treatment: String,
    /// Echo of the received part.
    #[serde(rename = "verboseDescription")]
    pub verbose_description: String,
}

impl DepositReceipt {
    /// Build the receipt for a freshly received part.
    pub fn new(base_url: &str, id: &DepositId, filename: &str, digest: &PayloadDigest) -> Self {
        let base = base_url.trim_end_matches('/');
        Self {
            edit_iri: format!("{base}/container/{id}"),
            edit_media_iri: format!("{base}/media/{id}"),
            statement_uri: format!("{base}/statement/{id}"),
            packaging: vec![PACKAGING_BAGIT.to_string()],
            treatment: TREATMENT.to_string(),
            verbose_description: format!(
                "received successfully: {filename}; MD5: {}",
                digest.to_hex()
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn receipt_iris_follow_base_url() {
        let id = DepositId::parse("dep1").unwrap();
        let digest = PayloadDigest::compute(b"payload");
        let receipt = DepositReceipt::new("http://host/", &id, "pkg.zip", &digest);

        assert_eq!(receipt.edit_iri, "http://host/container/dep1");
        assert_eq!(receipt.edit_media_iri, "http://host/media/dep1");
        assert_eq!(receipt.statement_uri, "http://host/statement/dep1");
        assert_eq!(receipt.packaging, vec![PACKAGING_BAGIT.to_string()]);
        assert!(receipt.verbose_description.starts_with("received successfully: pkg.zip; MD5: "));
    }

    #[test]
    fn receipt_serializes_with_wire_field_names() {
        let id = DepositId::parse("dep2").unwrap();
        let digest = PayloadDigest::compute(b"x");
        let receipt = DepositReceipt::new("http://host", &id, "a.zip", &digest);

        let json = serde_json::to_value(&receipt).unwrap();
        assert!(json.get("editIRI").is_some());
        assert!(json.get("editMediaIRI").is_some());
        assert!(json.get("statementURI").is_some());
        assert!(json.get("verboseDescription").is_some());
    }
}
