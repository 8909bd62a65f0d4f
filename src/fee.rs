// 💰 Fee Calculator - elapsed time → billed minutes → amount
//
// Policy:
// - elapsed minutes are floored (partial minutes are never billed)
// - anything shorter than one minute is billed as one minute
// - amounts are rounded half-up to 2 decimals

use crate::clock::Clock;
use crate::error::{ParkingError, Result};
use chrono::NaiveDateTime;
use rust_decimal::{Decimal, RoundingStrategy};

const MINUTES_PER_HOUR: i64 = 60;

// ============================================================================
// RATE
// ============================================================================

/// Parking rate, stored per hour so the default 10/hour stays exact
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rate {
    per_hour: Decimal,
}

impl Rate {
    pub fn per_hour(amount: Decimal) -> Result<Self> {
        if amount.is_sign_negative() && !amount.is_zero() {
            return Err(ParkingError::InvalidRate(format!(
                "rate must not be negative, got {}/hour",
                amount
            )));
        }
        Ok(Self { per_hour: amount })
    }

    pub fn per_minute(amount: Decimal) -> Result<Self> {
        let per_hour = amount
            .checked_mul(Decimal::from(MINUTES_PER_HOUR))
            .ok_or_else(|| ParkingError::InvalidRate(format!("{}/min is out of range", amount)))?;
        Self::per_hour(per_hour)
    }

    pub fn hourly(&self) -> Decimal {
        self.per_hour
    }
}

impl Default for Rate {
    /// 10 currency units per hour
    fn default() -> Self {
        Self {
            per_hour: Decimal::TEN,
        }
    }
}

// ============================================================================
// FEE COMPUTATION
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeQuote {
    pub billed_minutes: i64,
    pub amount: Decimal,
}

/// Whole minutes between two instants (floored, not clamped)
pub fn elapsed_minutes(entry: NaiveDateTime, exit: NaiveDateTime) -> i64 {
    (exit - entry).num_seconds().div_euclid(60)
}

pub fn compute_fee(entry: NaiveDateTime, exit: NaiveDateTime, rate: &Rate) -> Result<FeeQuote> {
    if exit < entry {
        return Err(ParkingError::InvalidInterval { entry, exit });
    }

    let billed_minutes = elapsed_minutes(entry, exit).max(1);

    let amount = Decimal::from(billed_minutes)
        .checked_mul(rate.hourly())
        .and_then(|total| total.checked_div(Decimal::from(MINUTES_PER_HOUR)))
        .ok_or_else(|| {
            ParkingError::InvalidRate(format!(
                "fee for {} minutes at {}/hour overflows",
                billed_minutes,
                rate.hourly()
            ))
        })?;

    Ok(FeeQuote {
        billed_minutes,
        amount: round_currency(amount),
    })
}

/// Same as compute_fee with the exit taken from the clock
pub fn compute_fee_until_now(entry: NaiveDateTime, rate: &Rate, clock: &dyn Clock) -> Result<FeeQuote> {
    compute_fee(entry, clock.now(), rate)
}

/// Half-up to cents, always carrying exactly two decimal places
pub fn round_currency(amount: Decimal) -> Decimal {
    let mut rounded = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(2);
    rounded
}

// ============================================================================
// DISPLAY HELPERS
// ============================================================================

/// "45 min", "2 hr", "1 hr 5 min"
pub fn format_duration(minutes: i64) -> String {
    let minutes = minutes.max(0);
    if minutes >= MINUTES_PER_HOUR {
        let hrs = minutes / MINUTES_PER_HOUR;
        let mins = minutes % MINUTES_PER_HOUR;
        if mins == 0 {
            format!("{} hr", hrs)
        } else {
            format!("{} hr {} min", hrs, mins)
        }
    } else {
        format!("{} min", minutes)
    }
}

pub fn format_currency(amount: Decimal, symbol: &str) -> String {
    format!("{}{:.2}", symbol, round_currency(amount))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{parse_timestamp, ManualClock};
    use chrono::Duration;

    fn ts(s: &str) -> NaiveDateTime {
        parse_timestamp(s).unwrap()
    }

    #[test]
    fn test_two_hours_at_default_rate() {
        let rate = Rate::per_minute(Decimal::TEN / Decimal::from(60)).unwrap();
        let quote = compute_fee(ts("2024-01-01 10:00:00"), ts("2024-01-01 12:00:00"), &rate).unwrap();

        assert_eq!(quote.billed_minutes, 120);
        assert_eq!(quote.amount, Decimal::new(2000, 2));
    }

    #[test]
    fn test_same_instant_bills_one_minute() {
        let rate = Rate::default();
        let t = ts("2024-01-01 10:00:00");
        let quote = compute_fee(t, t, &rate).unwrap();

        assert_eq!(quote.billed_minutes, 1);
        // 10/60 = 0.1666.. → 0.17
        assert_eq!(quote.amount, Decimal::new(17, 2));
    }

    #[test]
    fn test_ten_second_stay_is_one_minute() {
        let quote = compute_fee(
            ts("2024-01-01 10:00:00"),
            ts("2024-01-01 10:00:10"),
            &Rate::default(),
        )
        .unwrap();
        assert_eq!(quote.billed_minutes, 1);
    }

    #[test]
    fn test_partial_minutes_are_floored() {
        let quote = compute_fee(
            ts("2024-01-01 10:00:00"),
            ts("2024-01-01 10:02:59"),
            &Rate::default(),
        )
        .unwrap();
        assert_eq!(quote.billed_minutes, 2);
        assert_eq!(quote.amount, Decimal::new(33, 2));
    }

    #[test]
    fn test_exit_before_entry_is_rejected() {
        let result = compute_fee(
            ts("2024-01-01 10:00:00"),
            ts("2024-01-01 09:59:59"),
            &Rate::default(),
        );
        assert!(matches!(result, Err(ParkingError::InvalidInterval { .. })));
    }

    #[test]
    fn test_fee_is_monotonic_in_elapsed_time() {
        let rate = Rate::per_hour(Decimal::new(735, 1)).unwrap();
        let entry = ts("2024-01-01 00:00:00");

        let mut previous = Decimal::ZERO;
        for secs in (0..6 * 3600).step_by(37) {
            let quote = compute_fee(entry, entry + Duration::seconds(secs), &rate).unwrap();
            assert!(quote.amount >= previous, "fee dropped at {}s", secs);
            assert!(quote.billed_minutes >= 1);
            previous = quote.amount;
        }
    }

    #[test]
    fn test_half_up_rounding() {
        // 3 min at 0.3/hour = 0.015 exactly → 0.02
        let rate = Rate::per_hour(Decimal::new(3, 1)).unwrap();
        let quote = compute_fee(
            ts("2024-01-01 10:00:00"),
            ts("2024-01-01 10:03:00"),
            &rate,
        )
        .unwrap();
        assert_eq!(quote.amount, Decimal::new(2, 2));
    }

    #[test]
    fn test_negative_rate_rejected() {
        assert!(matches!(
            Rate::per_hour(Decimal::new(-1, 0)),
            Err(ParkingError::InvalidRate(_))
        ));
        assert!(Rate::per_minute(Decimal::ZERO).is_ok());
    }

    #[test]
    fn test_zero_rate_is_free() {
        let rate = Rate::per_hour(Decimal::ZERO).unwrap();
        let quote = compute_fee(ts("2024-01-01 10:00:00"), ts("2024-01-01 15:00:00"), &rate).unwrap();
        assert_eq!(quote.amount, Decimal::ZERO);
        assert_eq!(quote.billed_minutes, 300);
    }

    #[test]
    fn test_fee_until_now_uses_clock() {
        let clock = ManualClock::at("2024-01-01 11:30:00").unwrap();
        let quote = compute_fee_until_now(ts("2024-01-01 10:00:00"), &Rate::default(), &clock).unwrap();
        assert_eq!(quote.billed_minutes, 90);
        assert_eq!(quote.amount, Decimal::new(1500, 2));
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(0), "0 min");
        assert_eq!(format_duration(45), "45 min");
        assert_eq!(format_duration(120), "2 hr");
        assert_eq!(format_duration(65), "1 hr 5 min");
    }

    #[test]
    fn test_format_currency() {
        assert_eq!(format_currency(Decimal::new(2000, 2), "P"), "P20.00");
        assert_eq!(format_currency(Decimal::new(17, 2), "₱"), "₱0.17");
        assert_eq!(format_currency(Decimal::TEN, "$"), "$10.00");
    }
}
