//! Core document types, validation, tax arithmetic and numbering.
//!
//! Everything here is pure and synchronous; I/O lives in the
//! signing, transmission, storage and repository modules.

mod builder;
pub mod catalogs;
mod error;
mod numbering;
mod tax;
mod types;
mod validation;

pub use builder::*;
pub use error::*;
pub use numbering::*;
pub use tax::*;
pub use types::*;
pub use validation::*;
