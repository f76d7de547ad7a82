//! Terminal rendering of service payloads.

pub mod format;

pub use format::*;
