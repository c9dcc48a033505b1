//! Divergence detection between observed and published prices
//!
//! Features:
//! - Exact rational threshold test, no floating point
//! - Decimal-scale normalization (always scales up)
//! - Per-cycle evaluation report for status output

pub mod threshold;
pub mod evaluation;

pub use threshold::{is_significant, ThresholdPolicy};
pub use evaluation::{Decision, Evaluation};
