//! Input/output helpers.
//!
//! - CSV ingest + column normalization (`ingest`)
//! - model artifact and metadata files (`artifact`)
//! - forecast exports (`export`)

pub mod artifact;
pub mod export;
pub mod ingest;

pub use artifact::*;
pub use export::*;
pub use ingest::*;
