//! Filesystem layer for the Depot deposit service.
//!
//! This crate owns everything that touches the staging and permanent storage
//! trees:
//! - Per-deposit staging directories and atomic part writes
//! - The `deposit.properties` state record with staging-first resolution
//! - Archive unpacking with path-traversal defense
//! - Promotion of a staging directory onto permanent storage

pub mod error;
pub mod promote;
pub mod props;
pub mod staging;
pub mod unpack;

pub use error::{StorageError, StorageResult};
pub use promote::Promoter;
pub use props::{DepositRecord, PropsStore};
pub use staging::{StagingArea, digest_file};
pub use unpack::unpack;
