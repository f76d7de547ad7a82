//! Forecast generation.
//!
//! - feature rows from recent history (`features`)
//! - iterative single-step path (`standard`)
//! - sequence-model path with fallback to standard (`enhanced`)
//! - orchestration (`predictor`)

pub mod enhanced;
pub mod features;
pub mod predictor;
pub mod standard;

pub use features::{FeatureRow, prepare_features};
pub use predictor::*;
