//! Error types

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::FeeBid;

/// Core error types
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid amount: {0:?}")]
    InvalidAmount(String),

    #[error("Negative amount: {0}")]
    NegativeAmount(String),

    #[error("Amount {value} does not fit in 256 bits at {decimals} decimals")]
    AmountOverflow { value: String, decimals: u8 },
}

/// Price feed errors
#[derive(Debug, Error)]
pub enum PriceFeedError {
    #[error("Feed connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Feed disconnected")]
    Disconnected,

    #[error("Invalid message format: {0}")]
    InvalidMessage(String),

    #[error("Price field {0} missing from payload")]
    MissingField(String),

    #[error("Price source returned HTTP {0}")]
    HttpStatus(u16),

    #[error("Invalid price value: {0}")]
    InvalidPrice(#[from] CoreError),
}

/// Closed set of transaction failure kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureKind {
    InsufficientFunds,
    ReplacementUnderpriced,
    NonceStale,
    UnsupportedFeeField,
    Other,
}

impl FailureKind {
    pub fn name(&self) -> &'static str {
        match self {
            FailureKind::InsufficientFunds => "insufficient-funds",
            FailureKind::ReplacementUnderpriced => "replacement-underpriced",
            FailureKind::NonceStale => "nonce-stale",
            FailureKind::UnsupportedFeeField => "unsupported-fee-field",
            FailureKind::Other => "other",
        }
    }

    /// Whether adjusting nonce or fee can make the next attempt succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FailureKind::ReplacementUnderpriced
                | FailureKind::NonceStale
                | FailureKind::UnsupportedFeeField
        )
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Errors reported by the chain client
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainError {
    #[error("Insufficient funds: {0}")]
    InsufficientFunds(String),

    #[error("Replacement transaction underpriced: {0}")]
    ReplacementUnderpriced(String),

    #[error("Nonce stale: {0}")]
    NonceStale(String),

    #[error("Unsupported fee field: {0}")]
    UnsupportedFeeField(String),

    #[error("Chain error: {0}")]
    Other(String),
}

impl ChainError {
    pub fn kind(&self) -> FailureKind {
        match self {
            ChainError::InsufficientFunds(_) => FailureKind::InsufficientFunds,
            ChainError::ReplacementUnderpriced(_) => FailureKind::ReplacementUnderpriced,
            ChainError::NonceStale(_) => FailureKind::NonceStale,
            ChainError::UnsupportedFeeField(_) => FailureKind::UnsupportedFeeField,
            ChainError::Other(_) => FailureKind::Other,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            ChainError::InsufficientFunds(m)
            | ChainError::ReplacementUnderpriced(m)
            | ChainError::NonceStale(m)
            | ChainError::UnsupportedFeeField(m)
            | ChainError::Other(m) => m,
        }
    }

    /// Map a node error message onto a failure kind
    pub fn classify(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();

        if lower.contains("insufficient funds") {
            ChainError::InsufficientFunds(message)
        } else if lower.contains("underpriced") || lower.contains("replacement fee too low") {
            ChainError::ReplacementUnderpriced(message)
        } else if lower.contains("nonce too low")
            || lower.contains("nonce expired")
            || lower.contains("nonce has already been used")
        {
            ChainError::NonceStale(message)
        } else if lower.contains("transaction type not supported")
            || lower.contains("unsupported fee")
            || lower.contains("unsupported transaction type")
            || lower.contains("maxfeepergas")
            || lower.contains("type 2")
            || lower.contains("eip-1559")
            || lower.contains("eip1559")
        {
            ChainError::UnsupportedFeeField(message)
        } else {
            ChainError::Other(message)
        }
    }
}

/// A failed submission attempt with the context it failed in
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(
    "attempt {attempt} failed ({kind}) at nonce {}, fee {fee}: {message}",
    .nonce.map_or_else(|| "unassigned".to_string(), |n| n.to_string())
)]
pub struct SubmissionFailure {
    pub kind: FailureKind,
    pub message: String,
    pub nonce: Option<u64>,
    pub fee: FeeBid,
    pub attempt: u32,
}

impl SubmissionFailure {
    pub fn new(error: &ChainError, nonce: Option<u64>, fee: FeeBid, attempt: u32) -> Self {
        Self {
            kind: error.kind(),
            message: error.message().to_string(),
            nonce,
            fee,
            attempt,
        }
    }
}

/// Result type alias
pub type CoreResult<T> = Result<T, CoreError>;
pub type PriceFeedResult<T> = Result<T, PriceFeedError>;
pub type ChainResult<T> = Result<T, ChainError>;
