//! Clipscope Core
//!
//! Types shared across Clipscope components.
//!
//! This crate provides:
//! - The error taxonomy every operation reports through
//! - Ranked per-prompt scores and the per-model result mapping returned by predictions

pub mod error;
pub mod types;

pub use error::{Error, ErrorKind, Result};
pub use types::{ModelPredictions, RankedScores};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::error::{Error, ErrorKind, Result};
    pub use crate::types::{ModelPredictions, RankedScores};
}
