//! BagIt v0.97 package validation.
//!
//! A bag is a directory with a `bagit.txt` declaration, a `data/` payload
//! directory and at least one payload manifest listing every payload file
//! with its checksum. Validation distinguishes a *bad bag* (the client's
//! problem, reported with a diagnostic) from a *failed check* (an I/O fault
//! on our side).

pub mod error;
pub mod validate;

pub use error::{BagError, BagResult};
pub use validate::{BagValidator, Verdict};
