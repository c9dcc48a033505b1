//! Retry policy with fee escalation

use alloy_primitives::U256;
use std::fmt;

use oracle_core::{
    CoreResult, ExecutionConfig, FailureKind, FeeBid, FeeConfig, SubmissionAttempt,
};

/// Escalation bounds
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EscalationConfig {
    pub initial: FeeBid,
    pub increment: U256,
    /// Legacy bid used once the node rejects the configured fee fields
    pub fallback: FeeBid,
    /// No bid may exceed this per-gas amount
    pub cap: U256,
    pub max_attempts: u32,
}

impl EscalationConfig {
    pub fn from_config(fees: &FeeConfig, execution: &ExecutionConfig) -> CoreResult<Self> {
        Ok(Self {
            initial: fees.initial_bid()?,
            increment: fees.increment_wei()?,
            fallback: fees.fallback_bid()?,
            cap: fees.cap_wei()?,
            max_attempts: execution.max_attempts,
        })
    }
}

/// Why a logical update was abandoned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GiveUpReason {
    /// Failure kind that no adjustment can fix
    Fatal(FailureKind),
    AttemptsExhausted { attempts: u32 },
    /// Fee fields rejected even with the legacy fallback
    FallbackExhausted,
    /// Next bid would exceed the cap
    FeeCapExceeded { bid: U256, cap: U256 },
}

impl fmt::Display for GiveUpReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GiveUpReason::Fatal(kind) => write!(f, "{} is not retryable", kind),
            GiveUpReason::AttemptsExhausted { attempts } => {
                write!(f, "gave up after {} attempts", attempts)
            }
            GiveUpReason::FallbackExhausted => {
                write!(f, "fee fields rejected after legacy fallback")
            }
            GiveUpReason::FeeCapExceeded { bid, cap } => {
                write!(f, "next bid {} wei exceeds cap {} wei", bid, cap)
            }
        }
    }
}

/// Outcome of applying the policy to a failed attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    Retry(SubmissionAttempt),
    GiveUp(GiveUpReason),
}

impl RetryDecision {
    pub fn should_retry(&self) -> bool {
        matches!(self, RetryDecision::Retry(_))
    }
}

/// Pure decision function from (previous attempt, failure) to the next step
#[derive(Debug, Clone)]
pub struct FeeEscalationStrategy {
    config: EscalationConfig,
}

impl FeeEscalationStrategy {
    pub fn new(config: EscalationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EscalationConfig {
        &self.config
    }

    /// Starting bid. A node estimate, when given, is clamped to the cap.
    pub fn opening_bid(&self, estimate: Option<FeeBid>) -> FeeBid {
        let Some(estimate) = estimate else {
            return self.config.initial;
        };

        let cap = self.config.cap;
        match estimate {
            FeeBid::Legacy { gas_price } => FeeBid::legacy(gas_price.min(cap)),
            FeeBid::Eip1559 {
                max_fee_per_gas,
                max_priority_fee_per_gas,
            } => {
                let max_fee = max_fee_per_gas.min(cap);
                FeeBid::eip1559(max_fee, max_priority_fee_per_gas.min(max_fee))
            }
        }
    }

    /// Decide the next attempt after `previous` failed with `kind`.
    ///
    /// `attempt_number` is 1-based, so `max_attempts` bounds the total
    /// number of broadcasts for one logical update.
    pub fn next(&self, previous: &SubmissionAttempt, kind: FailureKind) -> RetryDecision {
        if !kind.is_retryable() {
            return RetryDecision::GiveUp(GiveUpReason::Fatal(kind));
        }
        if previous.attempt_number >= self.config.max_attempts {
            return RetryDecision::GiveUp(GiveUpReason::AttemptsExhausted {
                attempts: previous.attempt_number,
            });
        }

        match kind {
            FailureKind::ReplacementUnderpriced => {
                let bid = previous.fee_bid.bumped(self.config.increment);
                if bid.ceiling() > self.config.cap {
                    return RetryDecision::GiveUp(GiveUpReason::FeeCapExceeded {
                        bid: bid.ceiling(),
                        cap: self.config.cap,
                    });
                }
                // Same nonce so the bid replaces the pending transaction
                RetryDecision::Retry(previous.next(bid, previous.nonce))
            }
            FailureKind::NonceStale => RetryDecision::Retry(previous.next(previous.fee_bid, None)),
            FailureKind::UnsupportedFeeField => {
                if previous.fallback_used {
                    return RetryDecision::GiveUp(GiveUpReason::FallbackExhausted);
                }
                let mut attempt = previous.next(self.config.fallback, previous.nonce);
                attempt.fallback_used = true;
                RetryDecision::Retry(attempt)
            }
            FailureKind::InsufficientFunds | FailureKind::Other => {
                RetryDecision::GiveUp(GiveUpReason::Fatal(kind))
            }
        }
    }
}
