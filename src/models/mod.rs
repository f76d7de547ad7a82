//! Trained model artifacts and their resolution.
//!
//! - model families and their prediction calls (`artifact`)
//! - the alternative-kind preference table (`alternatives`)
//! - discovery, caching and fallback resolution (`registry`)

pub mod alternatives;
pub mod artifact;
pub mod registry;

pub use artifact::*;
pub use registry::*;
