use chrono::{Duration, NaiveDate};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::types::{ValidationError, AMOUNT_SCALE};

/// How a range-based salary adjustment is applied to matching payroll rows.
///
/// The two policies are not interchangeable: `InPlace` overwrites matching
/// amounts and loses the pre-increase value, `NewPeriod` appends a
/// forward-dated row per affected employee and keeps history intact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentPolicy {
    InPlace,
    NewPeriod,
}

impl AdjustmentPolicy {
    /// Canonical name used in configuration and logging.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InPlace => "in-place",
            Self::NewPeriod => "new-period",
        }
    }

    /// Parses the configuration spelling of a policy.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "in-place" | "in_place" => Some(Self::InPlace),
            "new-period" | "new_period" => Some(Self::NewPeriod),
            _ => None,
        }
    }
}

/// Inclusive amount interval selecting the payroll rows an adjustment touches.
///
/// Bounds are normalized to cents precision; `0 <= min < max` is required.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AmountRange {
    min: Decimal,
    max: Decimal,
}

impl AmountRange {
    pub fn new(min: Decimal, max: Decimal) -> Result<Self, ValidationError> {
        if min.is_sign_negative() && !min.is_zero() || min >= max {
            return Err(ValidationError::AmountRange { min, max });
        }
        Ok(Self {
            min: min.round_dp_with_strategy(AMOUNT_SCALE, RoundingStrategy::MidpointAwayFromZero),
            max: max.round_dp_with_strategy(AMOUNT_SCALE, RoundingStrategy::MidpointAwayFromZero),
        })
    }

    pub fn min(&self) -> Decimal {
        self.min
    }

    pub fn max(&self) -> Decimal {
        self.max
    }

    pub fn contains(&self, amount: Decimal) -> bool {
        self.min <= amount && amount <= self.max
    }
}

/// Converts a percentage (3.2 meaning +3.2%) into a multiplication factor.
///
/// Percentages below -100 would drive amounts negative and are rejected.
pub fn raise_factor(percent: Decimal) -> Result<Decimal, ValidationError> {
    if percent < -Decimal::ONE_HUNDRED {
        return Err(ValidationError::Percent(percent));
    }
    Ok(Decimal::ONE + percent / Decimal::ONE_HUNDRED)
}

/// Applies a raise factor to an amount, rounding half-up to cents.
pub fn apply_raise(amount: Decimal, factor: Decimal) -> Decimal {
    (amount * factor).round_dp_with_strategy(AMOUNT_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// Computes the pay period following the given one: it starts the day after
/// `end` and spans the same inclusive day count.
pub fn next_period(start: NaiveDate, end: NaiveDate) -> (NaiveDate, NaiveDate) {
    let span = end - start;
    let next_start = end + Duration::days(1);
    (next_start, next_start + span)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn dec(value: &str) -> Decimal {
        value.parse().unwrap()
    }

    #[test]
    fn policy_round_trips_through_names() {
        for policy in [AdjustmentPolicy::InPlace, AdjustmentPolicy::NewPeriod] {
            assert_eq!(AdjustmentPolicy::parse(policy.as_str()), Some(policy));
        }
        assert_eq!(AdjustmentPolicy::parse("overwrite"), None);
    }

    #[test]
    fn range_rejects_inverted_and_negative_bounds() {
        assert!(AmountRange::new(dec("2000"), dec("1000")).is_err());
        assert!(AmountRange::new(dec("1000"), dec("1000")).is_err());
        assert!(AmountRange::new(dec("-1"), dec("1000")).is_err());
    }

    #[test]
    fn range_bounds_are_inclusive() {
        let range = AmountRange::new(dec("1000"), dec("2000")).unwrap();
        assert!(range.contains(dec("1000")));
        assert!(range.contains(dec("2000")));
        assert!(!range.contains(dec("999.99")));
        assert!(!range.contains(dec("2000.01")));
    }

    #[test]
    fn factor_for_ten_percent() {
        assert_eq!(raise_factor(dec("10")).unwrap(), dec("1.1"));
    }

    #[test]
    fn factor_for_fractional_percent_is_exact() {
        assert_eq!(raise_factor(dec("3.2")).unwrap(), dec("1.032"));
    }

    #[test]
    fn factor_rejects_percent_below_minus_hundred() {
        assert!(matches!(
            raise_factor(dec("-100.01")),
            Err(ValidationError::Percent(_))
        ));
        assert_eq!(raise_factor(dec("-100")).unwrap(), Decimal::ZERO);
    }

    #[test]
    fn raise_avoids_binary_float_error() {
        // 5000 * 1.10 must be exactly 5500.00, not 5500.000000001.
        let factor = raise_factor(dec("10")).unwrap();
        assert_eq!(apply_raise(dec("5000"), factor), dec("5500.00"));
    }

    #[test]
    fn raise_rounds_half_up_to_cents() {
        // 1000.05 * 1.032 = 1032.0516 -> 1032.05
        let factor = raise_factor(dec("3.2")).unwrap();
        assert_eq!(apply_raise(dec("1000.05"), factor), dec("1032.05"));
        // 101.25 * 1.10 = 111.375 -> 111.38
        let factor = raise_factor(dec("10")).unwrap();
        assert_eq!(apply_raise(dec("101.25"), factor), dec("111.38"));
    }

    #[test]
    fn next_period_follows_spec_example() {
        // A 15-day period ending 2025-01-15 is followed by 2025-01-16..2025-01-30.
        let (start, end) = next_period(date(2025, 1, 1), date(2025, 1, 15));
        assert_eq!(start, date(2025, 1, 16));
        assert_eq!(end, date(2025, 1, 30));
    }

    #[test]
    fn next_period_crosses_month_and_year_bounds() {
        let (start, end) = next_period(date(2024, 12, 17), date(2024, 12, 31));
        assert_eq!(start, date(2025, 1, 1));
        assert_eq!(end, date(2025, 1, 15));
    }

    #[test]
    fn next_period_handles_single_day_span() {
        let (start, end) = next_period(date(2025, 3, 10), date(2025, 3, 10));
        assert_eq!(start, date(2025, 3, 11));
        assert_eq!(end, date(2025, 3, 11));
    }
}
