//! Domain types used throughout the service.
//!
//! This module defines:
//!
//! - the query descriptor handed to data sources (`DataContext`)
//! - the case table sources return (`CaseTable`, `CaseRecord`)
//! - forecast points and response payloads

pub mod context;
pub mod table;
pub mod types;

pub use context::*;
pub use table::*;
pub use types::*;
