//! Fixed-point unit conversions
//!
//! Prices and fees are carried as integers scaled to a known number of
//! decimal places. Conversion from human-readable decimals goes through
//! `rust_decimal`, never through `f64`.

use alloy_primitives::U256;
use rust_decimal::{Decimal, RoundingStrategy};
use std::str::FromStr;

use crate::{CoreError, CoreResult};

/// Decimals used for gwei-denominated values
pub const GWEI_DECIMALS: u8 = 9;

/// Decimals used for ether-denominated values
pub const ETHER_DECIMALS: u8 = 18;

/// Largest decimal count whose scale factor still fits in a U256
pub const MAX_DECIMALS: u8 = 77;

/// 10^exp, or `None` if it does not fit in 256 bits
pub fn pow10(exp: u32) -> Option<U256> {
    U256::from(10u8).checked_pow(U256::from(exp))
}

/// Convert a decimal amount to an integer scaled by `decimals`.
///
/// Digits beyond `decimals` are rounded half away from zero.
pub fn decimal_to_units(value: Decimal, decimals: u8) -> CoreResult<U256> {
    let target = u32::from(decimals);
    let rounded = if value.scale() > target {
        value.round_dp_with_strategy(target, RoundingStrategy::MidpointAwayFromZero)
    } else {
        value
    };

    let mantissa = rounded.mantissa();
    if mantissa < 0 {
        return Err(CoreError::NegativeAmount(value.to_string()));
    }

    let factor = pow10(target - rounded.scale()).ok_or(CoreError::AmountOverflow {
        value: value.to_string(),
        decimals,
    })?;

    U256::from(mantissa as u128)
        .checked_mul(factor)
        .ok_or(CoreError::AmountOverflow {
            value: value.to_string(),
            decimals,
        })
}

/// Parse a decimal string ("2650.37", "1e-3") into scaled units
pub fn parse_units(text: &str, decimals: u8) -> CoreResult<U256> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(CoreError::InvalidAmount(text.to_string()));
    }

    let value = if trimmed.contains(['e', 'E']) {
        Decimal::from_scientific(trimmed)
    } else {
        Decimal::from_str(trimmed)
    }
    .map_err(|_| CoreError::InvalidAmount(text.to_string()))?;

    decimal_to_units(value, decimals)
}

/// Render scaled units as a decimal string without trailing zeros
pub fn format_units(value: U256, decimals: u8) -> String {
    let digits = value.to_string();
    let decimals = usize::from(decimals);
    if decimals == 0 {
        return digits;
    }

    let padded = if digits.len() <= decimals {
        format!("{}{}", "0".repeat(decimals - digits.len() + 1), digits)
    } else {
        digits
    };

    let (int_part, frac_part) = padded.split_at(padded.len() - decimals);
    let frac_part = frac_part.trim_end_matches('0');

    if frac_part.is_empty() {
        int_part.to_string()
    } else {
        format!("{}.{}", int_part, frac_part)
    }
}

/// Gwei amount to wei
pub fn gwei_to_wei(gwei: Decimal) -> CoreResult<U256> {
    decimal_to_units(gwei, GWEI_DECIMALS)
}

/// Ether amount to wei
pub fn ether_to_wei(ether: Decimal) -> CoreResult<U256> {
    decimal_to_units(ether, ETHER_DECIMALS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_parse_units_scales_exactly() {
        assert_eq!(parse_units("100", 8).unwrap(), U256::from(100_00000000u64));
        assert_eq!(parse_units("100.5", 8).unwrap(), U256::from(100_50000000u64));
        assert_eq!(parse_units("2650.12345678", 8).unwrap(), U256::from(2650_12345678u64));
    }

    #[test]
    fn test_parse_units_rounds_extra_digits() {
        // 9th digit rounds half away from zero at 8 decimals
        assert_eq!(parse_units("1.000000005", 8).unwrap(), U256::from(1_00000001u64));
        assert_eq!(parse_units("1.000000004", 8).unwrap(), U256::from(1_00000000u64));
    }

    #[test]
    fn test_parse_units_eighteen_decimals() {
        let wei = parse_units("1.5", 18).unwrap();
        assert_eq!(wei, U256::from(1_500_000_000_000_000_000u128));
    }

    #[test]
    fn test_parse_units_scientific() {
        assert_eq!(parse_units("1.5e2", 2).unwrap(), U256::from(15_000u64));
        assert_eq!(parse_units("2E-3", 8).unwrap(), U256::from(200_000u64));
    }

    #[test]
    fn test_parse_units_rejects_garbage() {
        assert!(matches!(parse_units("", 8), Err(CoreError::InvalidAmount(_))));
        assert!(matches!(parse_units("abc", 8), Err(CoreError::InvalidAmount(_))));
        assert!(matches!(parse_units("-1.0", 8), Err(CoreError::NegativeAmount(_))));
    }

    #[test]
    fn test_format_units() {
        assert_eq!(format_units(U256::from(100_50000000u64), 8), "100.5");
        assert_eq!(format_units(U256::from(100_00000000u64), 8), "100");
        assert_eq!(format_units(U256::from(5u64), 8), "0.00000005");
        assert_eq!(format_units(U256::ZERO, 8), "0");
        assert_eq!(format_units(U256::from(42u64), 0), "42");
    }

    #[test]
    fn test_gwei_conversion() {
        assert_eq!(gwei_to_wei(Decimal::new(10, 0)).unwrap(), U256::from(10_000_000_000u64));
        assert_eq!(gwei_to_wei(Decimal::new(1, 1)).unwrap(), U256::from(100_000_000u64));
    }

    #[test]
    fn test_pow10_bounds() {
        assert_eq!(pow10(0), Some(U256::from(1u8)));
        assert!(pow10(u32::from(MAX_DECIMALS)).is_some());
        assert!(pow10(78).is_none());
    }

    proptest! {
        #[test]
        fn prop_formatted_units_parse_back(value in any::<u64>(), decimals in 0u8..=18) {
            let units = U256::from(value);
            prop_assert_eq!(parse_units(&format_units(units, decimals), decimals).unwrap(), units);
        }
    }
}
