//! HTTP request handlers.

pub mod deposits;
pub mod service;

pub use deposits::*;
pub use service::*;
