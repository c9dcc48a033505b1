//! Significance test for price divergence
//!
//! A candidate is significant when
//! `|candidate - published| * denominator > published * numerator`,
//! evaluated on 512-bit integers after bringing both values to the
//! larger of the two decimal scales.

use alloy_primitives::{U256, U512};

use oracle_core::{PriceSample, PublishedPrice, ThresholdConfig};

use crate::evaluation::{Decision, Evaluation};

/// Widen without loss
pub(crate) fn widen(value: U256) -> U512 {
    U512::from_be_slice(&value.to_be_bytes::<32>())
}

/// Narrow, saturating at `U256::MAX`
pub(crate) fn narrow(value: U512) -> U256 {
    if value > widen(U256::MAX) {
        return U256::MAX;
    }
    let bytes = value.to_be_bytes::<64>();
    U256::from_be_slice(&bytes[32..])
}

fn scale_up(value: U512, places: u8) -> U512 {
    if places == 0 {
        return value;
    }
    U512::from(10u8)
        .checked_pow(U512::from(places))
        .and_then(|factor| value.checked_mul(factor))
        .unwrap_or(U512::MAX)
}

/// Both values at a common scale. The lower-decimals side is scaled up,
/// never the other way round.
pub(crate) fn normalize(
    published: &PublishedPrice,
    candidate: &PriceSample,
) -> (U512, U512, u8) {
    let p = widen(published.value);
    let c = widen(candidate.value);

    if published.decimals >= candidate.decimals {
        let places = published.decimals - candidate.decimals;
        (p, scale_up(c, places), published.decimals)
    } else {
        let places = candidate.decimals - published.decimals;
        (scale_up(p, places), c, candidate.decimals)
    }
}

fn abs_diff(a: U512, b: U512) -> U512 {
    if a > b {
        a - b
    } else {
        b - a
    }
}

/// Whether `candidate` diverges from `published` by more than the threshold.
///
/// An uninitialized on-chain value (zero) makes every non-zero candidate
/// significant.
pub fn is_significant(
    published: &PublishedPrice,
    candidate: &PriceSample,
    config: &ThresholdConfig,
) -> bool {
    let (p, c, _) = normalize(published, candidate);

    if p.is_zero() {
        return !c.is_zero();
    }

    let lhs = abs_diff(p, c).saturating_mul(U512::from(config.denominator));
    let rhs = p.saturating_mul(U512::from(config.numerator));
    lhs > rhs
}

/// Threshold policy bound to a fixed configuration
#[derive(Debug, Clone)]
pub struct ThresholdPolicy {
    config: ThresholdConfig,
}

impl ThresholdPolicy {
    pub fn new(config: ThresholdConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ThresholdConfig {
        &self.config
    }

    pub fn is_significant(&self, published: &PublishedPrice, candidate: &PriceSample) -> bool {
        is_significant(published, candidate, &self.config)
    }

    /// Full comparison, including the values shown in status output
    pub fn evaluate(&self, published: &PublishedPrice, candidate: &PriceSample) -> Evaluation {
        let (p, c, decimals) = normalize(published, candidate);

        let threshold = if self.config.denominator == 0 {
            U512::ZERO
        } else {
            p.saturating_mul(U512::from(self.config.numerator))
                / U512::from(self.config.denominator)
        };

        let decision = if is_significant(published, candidate, &self.config) {
            Decision::Update
        } else {
            Decision::Hold
        };

        Evaluation {
            observed: narrow(c),
            published: narrow(p),
            decimals,
            difference: narrow(abs_diff(p, c)),
            threshold: narrow(threshold),
            decision,
        }
    }
}

impl Default for ThresholdPolicy {
    fn default() -> Self {
        Self::new(ThresholdConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn published(value: u128, decimals: u8) -> PublishedPrice {
        PublishedPrice::new(U256::from(value), decimals)
    }

    fn sample(value: u128, decimals: u8) -> PriceSample {
        PriceSample::new(U256::from(value), decimals)
    }

    fn one_percent() -> ThresholdConfig {
        ThresholdConfig::new(100, 10_000)
    }

    #[test]
    fn test_half_percent_move_is_not_significant() {
        let p = published(100_00000000, 8);
        assert!(!is_significant(&p, &sample(100_50000000, 8), &one_percent()));
    }

    #[test]
    fn test_just_over_one_percent_is_significant() {
        let p = published(100_00000000, 8);
        assert!(is_significant(&p, &sample(101_01000000, 8), &one_percent()));
    }

    #[test]
    fn test_exactly_one_percent_is_not_significant() {
        let p = published(100_00000000, 8);
        assert!(!is_significant(&p, &sample(101_00000000, 8), &one_percent()));
        assert!(!is_significant(&p, &sample(99_00000000, 8), &one_percent()));
    }

    #[test]
    fn test_uninitialized_published_value() {
        let p = published(0, 8);
        assert!(is_significant(&p, &sample(1, 8), &one_percent()));
        assert!(!is_significant(&p, &sample(0, 8), &one_percent()));
    }

    #[test]
    fn test_mixed_scales_normalize_up() {
        // 100.00 at 2 decimals vs 101.01 at 8 decimals
        let p = published(100_00, 2);
        assert!(is_significant(&p, &sample(101_01000000, 8), &one_percent()));
        assert!(!is_significant(&p, &sample(100_50000000, 8), &one_percent()));

        // and the other way round
        let p = published(100_00000000, 8);
        assert!(is_significant(&p, &sample(101_02, 2), &one_percent()));
        assert!(!is_significant(&p, &sample(100_99, 2), &one_percent()));
    }

    #[test]
    fn test_evaluate_reports_threshold_value() {
        let policy = ThresholdPolicy::new(one_percent());
        let eval = policy.evaluate(&published(100_00000000, 8), &sample(101_01000000, 8));

        assert_eq!(eval.decision, Decision::Update);
        assert_eq!(eval.threshold, U256::from(1_00000000u64));
        assert_eq!(eval.difference, U256::from(1_01000000u64));
        assert_eq!(eval.decimals, 8);
    }

    #[test]
    fn test_huge_values_do_not_panic() {
        let p = PublishedPrice::new(U256::MAX, 0);
        let c = PriceSample::new(U256::MAX, 77);
        let policy = ThresholdPolicy::new(ThresholdConfig::new(u64::MAX, u64::MAX));
        let _ = policy.evaluate(&p, &c);
    }

    proptest! {
        #[test]
        fn prop_zero_published_any_nonzero_candidate(
            candidate in 1u128..u128::MAX,
            decimals in 0u8..=18,
            numerator in 0u64..1_000_000,
        ) {
            let config = ThresholdConfig::new(numerator, 10_000);
            prop_assert!(is_significant(&published(0, decimals), &sample(candidate, decimals), &config));
        }

        #[test]
        fn prop_symmetric_in_sign_of_difference(
            p in 1u128..1_000_000_000_000_000_000u128,
            frac in 0u128..=1_000u128,
            numerator in 0u64..10_000,
        ) {
            let d = p / 1_000 * frac;
            let config = ThresholdConfig::new(numerator, 10_000);
            let base = published(p, 8);
            let up = is_significant(&base, &sample(p + d, 8), &config);
            let down = is_significant(&base, &sample(p - d, 8), &config);
            prop_assert_eq!(up, down);
        }

        #[test]
        fn prop_matches_threshold_value(
            p in 1u64..u64::MAX,
            c in 0u64..u64::MAX,
        ) {
            let policy = ThresholdPolicy::new(one_percent());
            let eval = policy.evaluate(&published(p as u128, 8), &sample(c as u128, 8));
            prop_assert_eq!(eval.decision == Decision::Update, eval.difference > eval.threshold);
        }
    }
}
