//! Platform fee calculation.
//!
//! The marketplace retains `floor(subtotal * 1.7%)` plus a fixed surcharge
//! derived from the deployment seed. Pure arithmetic, no I/O.

use rust_decimal::Decimal;

const FEE_RATE_PERMILLE: i64 = 17; // 1.7%
const DEFAULT_SURCHARGE: u32 = 25;

/// Extracts the fixed surcharge from the deployment seed string: the first
/// run of decimal digits, or 25 when the seed carries none.
pub fn surcharge_from_seed(seed: &str) -> u32 {
    let digits: String = seed
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().unwrap_or(DEFAULT_SURCHARGE)
}

/// `floor(subtotal * 0.017) + surcharge`. The floor is applied to the
/// percentage component before the surcharge is added.
pub fn platform_fee(subtotal: Decimal, surcharge: u32) -> Decimal {
    let percentage = subtotal * Decimal::new(FEE_RATE_PERMILLE, 3);
    percentage.floor() + Decimal::from(surcharge)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn surcharge_parses_first_integer_substring() {
        assert_eq!(surcharge_from_seed("DEFAULT_SEED-25"), 25);
        assert_eq!(surcharge_from_seed("seed42extra7"), 42);
        assert_eq!(surcharge_from_seed("no-digits-here"), 25);
        assert_eq!(surcharge_from_seed(""), 25);
        assert_eq!(surcharge_from_seed("007-bond"), 7);
    }

    #[test]
    fn fee_floors_percentage_before_surcharge() {
        // 25.00 * 0.017 = 0.425 -> floors to 0
        let fee = platform_fee(Decimal::new(2500, 2), 25);
        assert_eq!(fee, Decimal::from(25));

        // 1000.00 * 0.017 = 17.00 -> stays 17
        let fee = platform_fee(Decimal::new(100000, 2), 25);
        assert_eq!(fee, Decimal::from(42));

        // 99.99 * 0.017 = 1.69983 -> floors to 1
        let fee = platform_fee(Decimal::new(9999, 2), 10);
        assert_eq!(fee, Decimal::from(11));
    }

    #[test]
    fn zero_subtotal_yields_surcharge_only() {
        assert_eq!(platform_fee(Decimal::ZERO, 25), Decimal::from(25));
        assert_eq!(platform_fee(Decimal::ZERO, 0), Decimal::ZERO);
    }

    #[test]
    fn fee_is_deterministic() {
        let subtotal = Decimal::new(123456, 2);
        assert_eq!(platform_fee(subtotal, 25), platform_fee(subtotal, 25));
    }
}
