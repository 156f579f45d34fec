// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Shared helpers: the weekly activation window and fixed-point rounding.
//!
//! All monetary arithmetic in this crate is carried out on [`BigDecimal`]
//! values with seven fractional digits, matching the ledger's amount
//! precision. Rounding direction is always explicit.

use bigdecimal::{num_bigint::BigInt, BigDecimal, RoundingMode};
use chrono::{DateTime, Datelike, Duration, NaiveDate, Timelike, Utc};

/// Fractional digits of all ledger amounts.
pub const AMOUNT_SCALE: i64 = 7;

/// Smallest representable ledger amount (one stroop).
pub fn amount_epsilon() -> BigDecimal {
    BigDecimal::new(BigInt::from(1), AMOUNT_SCALE)
}

/// Round down to ledger precision.
pub fn round_down(value: &BigDecimal) -> BigDecimal {
    value.with_scale_round(AMOUNT_SCALE, RoundingMode::Down)
}

/// Round up to ledger precision.
pub fn round_up(value: &BigDecimal) -> BigDecimal {
    value.with_scale_round(AMOUNT_SCALE, RoundingMode::Up)
}

/// The activation window derived from a reference time: starts at 00:00:00
/// UTC on the Monday strictly after `time` and runs for `duration`.
pub fn epoch_window(time: DateTime<Utc>, duration: Duration) -> (DateTime<Utc>, DateTime<Utc>) {
    let days_ahead = 8 - i64::from(time.weekday().number_from_monday());
    let start = (time + Duration::days(days_ahead))
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .expect("midnight is a valid time")
        .and_utc();
    (start, start + duration)
}

/// Truncate a timestamp to the start of its hour.
pub fn truncate_to_hour(time: DateTime<Utc>) -> DateTime<Utc> {
    time.date_naive()
        .and_hms_opt(time.hour(), 0, 0)
        .expect("whole hours are valid times")
        .and_utc()
}

/// Start and end of the UTC day containing `date`.
pub fn day_bounds(date: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = date
        .and_hms_opt(0, 0, 0)
        .expect("midnight is a valid time")
        .and_utc();
    (start, start + Duration::days(1))
}

/// Abbreviated form of a ledger key for log lines and memos:
/// first four and last four characters.
pub fn short_key(key: &str) -> String {
    if key.len() <= 8 {
        return key.to_string();
    }
    format!("{}...{}", &key[..4], &key[key.len() - 4..])
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Weekday};
    use quickcheck_macros::quickcheck;
    use std::str::FromStr;

    #[test]
    fn epoch_window_starts_on_next_monday() {
        // 2022-02-16 is a Wednesday.
        let t = Utc.with_ymd_and_hms(2022, 2, 16, 15, 30, 0).unwrap();
        let (start, stop) = epoch_window(t, Duration::days(7));
        assert_eq!(start, Utc.with_ymd_and_hms(2022, 2, 21, 0, 0, 0).unwrap());
        assert_eq!(stop, Utc.with_ymd_and_hms(2022, 2, 28, 0, 0, 0).unwrap());
    }

    #[test]
    fn epoch_window_is_strictly_after_a_monday_reference() {
        let monday_midnight = Utc.with_ymd_and_hms(2022, 2, 14, 0, 0, 0).unwrap();
        let (start, _) = epoch_window(monday_midnight, Duration::days(7));
        assert_eq!(start, Utc.with_ymd_and_hms(2022, 2, 21, 0, 0, 0).unwrap());
    }

    #[test]
    fn epoch_window_from_sunday_is_next_day() {
        let sunday = Utc.with_ymd_and_hms(2022, 2, 20, 23, 59, 59).unwrap();
        let (start, _) = epoch_window(sunday, Duration::days(7));
        assert_eq!(start, Utc.with_ymd_and_hms(2022, 2, 21, 0, 0, 0).unwrap());
    }

    #[quickcheck]
    fn epoch_window_always_lands_on_a_future_monday(secs: u32) {
        let t = Utc
            .timestamp_opt(1_600_000_000 + i64::from(secs), 0)
            .unwrap();
        let (start, stop) = epoch_window(t, Duration::days(7));
        assert_eq!(start.weekday(), Weekday::Mon);
        assert_eq!(start.num_seconds_from_midnight(), 0);
        assert!(start > t);
        assert!(start - t <= Duration::days(7));
        assert_eq!(stop - start, Duration::days(7));
    }

    #[test]
    fn rounding_direction_is_explicit() {
        let v = BigDecimal::from_str("1.00000015").unwrap();
        assert_eq!(round_down(&v), BigDecimal::from_str("1.0000001").unwrap());
        assert_eq!(round_up(&v), BigDecimal::from_str("1.0000002").unwrap());
    }

    #[test]
    fn short_key_abbreviates() {
        assert_eq!(
            short_key("GBPF7NLFCYGZNHU6HS64ZGTE4YCRLAWTLFGOMFTHQ3WSUUFIGOSQFPJT"),
            "GBPF...FPJT"
        );
        assert_eq!(short_key("short"), "short");
    }
}
