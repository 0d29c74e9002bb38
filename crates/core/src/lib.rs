//! Core domain types and shared logic for the Depot deposit service.
//!
//! This crate defines the canonical data model used across all other crates:
//! - Deposit identifiers and lifecycle states
//! - Accepted package content types
//! - Payload digests (MD5, as mandated by the deposit protocol)
//! - Deposit receipts and SWORD error IRIs
//! - Service configuration

pub mod config;
pub mod deposit;
pub mod digest;
pub mod error;
pub mod receipt;

pub use config::{AppConfig, ServerConfig, StoreConfig, VcsConfig};
pub use deposit::{DepositId, DepositState, PackageType};
pub use digest::{PayloadDigest, PayloadHasher};
pub use error::{Error, Result};
pub use receipt::{DepositReceipt, PACKAGING_BAGIT, TREATMENT};

/// Name of the per-deposit state record file.
pub const PROPERTIES_FILE: &str = "deposit.properties";

/// Name of the intermediate file chunked parts are concatenated into.
pub const MERGED_ARCHIVE: &str = "merged.archive";
