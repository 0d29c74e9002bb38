//! HTTP deposit server and finalization pipeline for Depot.
//!
//! This crate provides the two planes of the service:
//! - The synchronous ingress front: SWORDv2-style deposit endpoints that
//!   receive payload parts, verify checksums and return receipts
//! - The asynchronous finalization pipeline: a single worker on a bounded
//!   queue that reassembles, extracts, validates, versions and promotes
//!   each completed deposit

pub mod error;
pub mod finalize;
pub mod handlers;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use finalize::{FinalizeHandle, FinalizeRequest, Finalizer, spawn_finalizer};
pub use routes::create_router;
pub use state::AppState;
