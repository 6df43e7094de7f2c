//! Utility modules shared across the query path
//!
//! - Stats: rounding, means and trend slopes
//! - Normalize: sailing key normalization

pub mod normalize;
pub mod stats;

// Re-export commonly used helpers
pub use normalize::{normalize_key, sailing_key};
pub use stats::{linear_slope, mean, round2, round_to};
