//! Per-cycle comparison result

use alloy_primitives::U256;
use serde::Serialize;
use std::fmt;

use oracle_core::format_units;

/// Outcome of the threshold test
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    /// Divergence exceeds the threshold; publish the candidate
    Update,
    /// Within threshold; nothing to do
    Hold,
}

impl Decision {
    pub fn name(&self) -> &'static str {
        match self {
            Decision::Update => "update",
            Decision::Hold => "hold",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Values compared in one decision cycle, all at `decimals` scale
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Evaluation {
    pub observed: U256,
    pub published: U256,
    pub decimals: u8,
    pub difference: U256,
    /// `published * numerator / denominator`, rounded down
    pub threshold: U256,
    pub decision: Decision,
}

impl Evaluation {
    pub fn is_significant(&self) -> bool {
        self.decision == Decision::Update
    }

    pub fn observed_display(&self) -> String {
        format_units(self.observed, self.decimals)
    }

    pub fn published_display(&self) -> String {
        format_units(self.published, self.decimals)
    }

    pub fn difference_display(&self) -> String {
        format_units(self.difference, self.decimals)
    }

    pub fn threshold_display(&self) -> String {
        format_units(self.threshold, self.decimals)
    }
}
