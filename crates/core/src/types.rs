//! Core type definitions

use alloy_primitives::{B256, U256};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::units::{format_units, parse_units, GWEI_DECIMALS};
use crate::{CoreError, CoreResult};

/// Transaction hash
pub type TxHash = B256;

/// Observed price from the feed, scaled to `decimals` places
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceSample {
    pub value: U256,
    pub decimals: u8,
    pub observed_at: DateTime<Utc>,
}

impl PriceSample {
    pub fn new(value: U256, decimals: u8) -> Self {
        Self::at(value, decimals, Utc::now())
    }

    pub fn at(value: U256, decimals: u8, observed_at: DateTime<Utc>) -> Self {
        Self {
            value,
            decimals,
            observed_at,
        }
    }

    /// Parse a human-readable decimal price ("2650.37")
    pub fn from_decimal_str(text: &str, decimals: u8) -> CoreResult<Self> {
        Ok(Self::new(parse_units(text, decimals)?, decimals))
    }

    pub fn age_ms(&self, now: DateTime<Utc>) -> i64 {
        (now - self.observed_at).num_milliseconds().max(0)
    }
}

impl fmt::Display for PriceSample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", format_units(self.value, self.decimals))
    }
}

/// Last price known to be on-chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedPrice {
    pub value: U256,
    pub decimals: u8,
    pub read_at: DateTime<Utc>,
}

impl PublishedPrice {
    pub fn new(value: U256, decimals: u8) -> Self {
        Self {
            value,
            decimals,
            read_at: Utc::now(),
        }
    }

    /// Value published by a confirmed update, carried over without rescaling
    pub fn from_confirmed(sample: &PriceSample) -> Self {
        Self::new(sample.value, sample.decimals)
    }

    /// On-chain storage has never been written
    pub fn is_uninitialized(&self) -> bool {
        self.value.is_zero()
    }
}

impl fmt::Display for PublishedPrice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", format_units(self.value, self.decimals))
    }
}

/// Rational significance threshold: `|candidate - published| * denominator > published * numerator`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    pub numerator: u64,
    pub denominator: u64,
}

impl ThresholdConfig {
    pub fn new(numerator: u64, denominator: u64) -> Self {
        Self {
            numerator,
            denominator,
        }
    }

    /// Threshold expressed in percent, for display only
    pub fn percent(&self) -> Decimal {
        if self.denominator == 0 {
            return Decimal::ZERO;
        }
        Decimal::from(self.numerator) * Decimal::ONE_HUNDRED / Decimal::from(self.denominator)
    }

    pub fn validate(&self) -> CoreResult<()> {
        if self.denominator == 0 {
            return Err(CoreError::InvalidConfig(
                "threshold denominator must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        // 1%
        Self::new(100, 10_000)
    }
}

/// Fee offered for transaction inclusion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FeeBid {
    /// Single gas price (type 0 transaction)
    Legacy { gas_price: U256 },
    /// Max fee / priority fee pair (type 2 transaction)
    Eip1559 {
        max_fee_per_gas: U256,
        max_priority_fee_per_gas: U256,
    },
}

impl FeeBid {
    pub fn legacy(gas_price: U256) -> Self {
        FeeBid::Legacy { gas_price }
    }

    pub fn eip1559(max_fee_per_gas: U256, max_priority_fee_per_gas: U256) -> Self {
        FeeBid::Eip1559 {
            max_fee_per_gas,
            max_priority_fee_per_gas,
        }
    }

    pub fn is_legacy(&self) -> bool {
        matches!(self, FeeBid::Legacy { .. })
    }

    /// Highest per-gas amount this bid can pay
    pub fn ceiling(&self) -> U256 {
        match self {
            FeeBid::Legacy { gas_price } => *gas_price,
            FeeBid::Eip1559 {
                max_fee_per_gas, ..
            } => *max_fee_per_gas,
        }
    }

    /// Same bid raised by `increment` on every component
    pub fn bumped(&self, increment: U256) -> Self {
        match self {
            FeeBid::Legacy { gas_price } => FeeBid::Legacy {
                gas_price: gas_price.saturating_add(increment),
            },
            FeeBid::Eip1559 {
                max_fee_per_gas,
                max_priority_fee_per_gas,
            } => FeeBid::Eip1559 {
                max_fee_per_gas: max_fee_per_gas.saturating_add(increment),
                max_priority_fee_per_gas: max_priority_fee_per_gas.saturating_add(increment),
            },
        }
    }
}

impl fmt::Display for FeeBid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeeBid::Legacy { gas_price } => {
                write!(f, "{} gwei", format_units(*gas_price, GWEI_DECIMALS))
            }
            FeeBid::Eip1559 {
                max_fee_per_gas,
                max_priority_fee_per_gas,
            } => write!(
                f,
                "max {} gwei, tip {} gwei",
                format_units(*max_fee_per_gas, GWEI_DECIMALS),
                format_units(*max_priority_fee_per_gas, GWEI_DECIMALS)
            ),
        }
    }
}

/// One broadcast attempt for a logical price update
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionAttempt {
    /// `None` means fetch the latest nonce before broadcasting
    pub nonce: Option<u64>,
    pub fee_bid: FeeBid,
    pub attempt_number: u32,
    pub started_at: DateTime<Utc>,
    /// The legacy fallback bid has already been tried for this update
    pub fallback_used: bool,
}

impl SubmissionAttempt {
    pub fn first(fee_bid: FeeBid) -> Self {
        Self {
            nonce: None,
            fee_bid,
            attempt_number: 1,
            started_at: Utc::now(),
            fallback_used: false,
        }
    }

    /// Follow-up attempt with the given fee and nonce
    pub fn next(&self, fee_bid: FeeBid, nonce: Option<u64>) -> Self {
        Self {
            nonce,
            fee_bid,
            attempt_number: self.attempt_number + 1,
            started_at: Utc::now(),
            fallback_used: self.fallback_used,
        }
    }
}

/// Process-lifetime counters, owned by the coordinator
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionState {
    pub transactions_confirmed: u64,
    pub transactions_failed: u64,
    pub cycles: u64,
    pub in_flight: bool,
    pub last_confirmed_at: Option<DateTime<Utc>>,
    pub last_tx_hash: Option<TxHash>,
}
