//! Exact conversion between decimal token amounts and atomic units
//!
//! Conversions go through the decimal string form so that no binary floating
//! point is involved. Digits beyond `decimals` are truncated.

use rust_decimal::Decimal;

/// Largest decimal precision accepted for a token
pub const MAX_DECIMALS: u8 = 18;

/// Convert a decimal token amount to atomic units, truncating excess precision
///
/// Returns `None` for negative amounts, `decimals > MAX_DECIMALS` or a result
/// that does not fit in `u128`.
///
/// Truncation makes this non-decreasing in `amount` but not strictly
/// increasing: two amounts less than one atomic unit (`10^-decimals`) apart
/// may map to the same value. Strict growth holds only once the increase
/// reaches one atomic unit.
pub fn decimal_to_atomics(amount: Decimal, decimals: u8) -> Option<u128> {
    if amount.is_sign_negative() && !amount.is_zero() {
        return None;
    }
    decimal_string_to_atomics(&amount.normalize().to_string(), decimals)
}

/// Convert a plain (non-exponent) decimal string to atomic units
pub fn decimal_string_to_atomics(value: &str, decimals: u8) -> Option<u128> {
    if decimals > MAX_DECIMALS {
        return None;
    }
    let decimals = decimals as usize;
    let (integer, fractional) = value.split_once('.').unwrap_or((value, ""));
    if integer.is_empty() && fractional.is_empty() {
        return None;
    }
    if !integer.bytes().all(|b| b.is_ascii_digit())
        || !fractional.bytes().all(|b| b.is_ascii_digit())
    {
        return None;
    }

    let mut digits = String::with_capacity(integer.len() + decimals);
    digits.push_str(integer);
    let kept = &fractional[..fractional.len().min(decimals)];
    digits.push_str(kept);
    digits.extend(std::iter::repeat('0').take(decimals - kept.len()));

    let trimmed = digits.trim_start_matches('0');
    if trimmed.is_empty() {
        return Some(0);
    }
    trimmed.parse::<u128>().ok()
}

/// Convert atomic units back to a decimal token amount
pub fn atomics_to_decimal(atomics: u128, decimals: u8) -> Option<Decimal> {
    if decimals > MAX_DECIMALS {
        return None;
    }
    let mantissa = i128::try_from(atomics).ok()?;
    Decimal::try_from_i128_with_scale(mantissa, decimals as u32).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal::dec;

    #[test]
    fn test_whole_and_fractional_amounts() {
        assert_eq!(decimal_to_atomics(dec!(1), 6), Some(1_000_000));
        assert_eq!(decimal_to_atomics(dec!(1.5), 6), Some(1_500_000));
        assert_eq!(decimal_to_atomics(dec!(0.000001), 6), Some(1));
        assert_eq!(decimal_to_atomics(dec!(0), 9), Some(0));
    }

    #[test]
    fn test_excess_precision_truncates() {
        assert_eq!(decimal_to_atomics(dec!(0.0000019), 6), Some(1));
        assert_eq!(decimal_to_atomics(dec!(1.23456789), 2), Some(123));
    }

    #[test]
    fn test_growth_below_one_unit_can_stall() {
        let low = decimal_to_atomics(dec!(0.0000011), 6);
        assert_eq!(decimal_to_atomics(dec!(0.0000019), 6), low);
        assert!(decimal_to_atomics(dec!(0.0000021), 6) > low);
    }

    #[test]
    fn test_decimal_boundary_exact() {
        // 0.29 * 100 is 28.999999999999996 in binary floating point
        assert_eq!(decimal_to_atomics(dec!(0.29), 2), Some(29));
        assert_eq!(decimal_to_atomics(dec!(1.005), 3), Some(1005));
    }

    #[test]
    fn test_zero_decimals() {
        assert_eq!(decimal_to_atomics(dec!(42.9), 0), Some(42));
    }

    #[test]
    fn test_rejects_negative_and_bad_precision() {
        assert_eq!(decimal_to_atomics(dec!(-1), 6), None);
        assert_eq!(decimal_to_atomics(dec!(1), 19), None);
        assert_eq!(decimal_string_to_atomics("1e5", 2), None);
        assert_eq!(decimal_string_to_atomics("", 2), None);
        assert_eq!(decimal_string_to_atomics(".", 2), None);
    }

    #[test]
    fn test_string_forms() {
        assert_eq!(decimal_string_to_atomics(".5", 2), Some(50));
        assert_eq!(decimal_string_to_atomics("7.", 2), Some(700));
        assert_eq!(decimal_string_to_atomics("000.010", 3), Some(10));
    }

    #[test]
    fn test_atomics_to_decimal() {
        assert_eq!(atomics_to_decimal(1_500_000, 6), Some(dec!(1.5)));
        assert_eq!(atomics_to_decimal(1, 9), Some(dec!(0.000000001)));
        assert_eq!(atomics_to_decimal(5, 19), None);
    }

    proptest! {
        #[test]
        fn prop_atomics_round_trip(atomics in 0u64..u64::MAX, decimals in 0u8..=9) {
            let amount = atomics_to_decimal(atomics as u128, decimals).unwrap();
            prop_assert_eq!(decimal_to_atomics(amount, decimals), Some(atomics as u128));
        }

        #[test]
        fn prop_decimal_round_trip_to_precision(mantissa in 0i64..i64::MAX, scale in 0u32..12, decimals in 0u8..=9) {
            let amount = Decimal::new(mantissa, scale);
            let atomics = decimal_to_atomics(amount, decimals).unwrap();
            let back = atomics_to_decimal(atomics, decimals).unwrap();
            prop_assert!(back <= amount);
            prop_assert_eq!(back, amount.trunc_with_scale(decimals as u32));
        }
    }
}
