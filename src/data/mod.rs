//! Data acquisition.
//!
//! - metric derivation from ingested frames (`derive`)
//! - generated fallback series (`sample`)
//! - the source variants (`source`)
//! - priority-ordered resolution across sources (`manager`)

pub mod derive;
pub mod manager;
pub mod sample;
pub mod source;

pub use manager::*;
pub use source::*;
