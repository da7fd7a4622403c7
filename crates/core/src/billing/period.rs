//! Billing period resolution.
//!
//! A buyer's closing day cuts the calendar into billing periods. Closing on
//! day 20 bills 21 December through 20 January as "January"; closing on the
//! 28th or later (or 99, the stored "end of month" marker) bills the whole
//! calendar month.

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Malformed input to the resolver.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BillingInputError {
    #[error("malformed billing month {0:?}, expected YYYY-MM")]
    MalformedMonth(String),

    #[error("closing day must be 1-28 or 99, got {0}")]
    InvalidClosingDay(i32),
}

/// A buyer's monthly cut-off day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub struct ClosingDay(u8);

impl ClosingDay {
    /// Stored marker for "last day of the month".
    pub const END_OF_MONTH: Self = Self(99);

    /// # Errors
    ///
    /// Returns `InvalidClosingDay` outside 1-28 and 99.
    pub fn new(day: i32) -> Result<Self, BillingInputError> {
        match u8::try_from(day) {
            Ok(d @ (1..=28 | 99)) => Ok(Self(d)),
            _ => Err(BillingInputError::InvalidClosingDay(day)),
        }
    }

    #[must_use]
    pub const fn day(self) -> u8 {
        self.0
    }

    /// Whether periods follow calendar months.
    #[must_use]
    pub const fn is_end_of_month(self) -> bool {
        self.0 >= 28
    }
}

impl Default for ClosingDay {
    fn default() -> Self {
        Self::END_OF_MONTH
    }
}

impl TryFrom<i32> for ClosingDay {
    type Error = BillingInputError;

    fn try_from(day: i32) -> Result<Self, Self::Error> {
        Self::new(day)
    }
}

impl From<ClosingDay> for i32 {
    fn from(day: ClosingDay) -> Self {
        Self::from(day.0)
    }
}

impl fmt::Display for ClosingDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 == 99 {
            write!(f, "end of month")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

/// The month an invoice is issued for, written `YYYY-MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TargetMonth {
    /// Always the first day of the month.
    first_day: NaiveDate,
}

impl TargetMonth {
    /// # Errors
    ///
    /// Returns `MalformedMonth` when the month is outside 1-12 or the year is
    /// out of the supported date range.
    pub fn new(year: i32, month: u32) -> Result<Self, BillingInputError> {
        NaiveDate::from_ymd_opt(year, month, 1)
            .map(|first_day| Self { first_day })
            .ok_or_else(|| BillingInputError::MalformedMonth(format!("{year:04}-{month:02}")))
    }

    #[must_use]
    pub fn year(self) -> i32 {
        self.first_day.year()
    }

    #[must_use]
    pub fn month(self) -> u32 {
        self.first_day.month()
    }

    /// The month before this one.
    ///
    /// # Errors
    ///
    /// Returns `MalformedMonth` only at the lower edge of the date range.
    pub fn previous(self) -> Result<Self, BillingInputError> {
        if self.month() == 1 {
            Self::new(self.year() - 1, 12)
        } else {
            Self::new(self.year(), self.month() - 1)
        }
    }

    /// Number of days in the month, leap years included.
    #[must_use]
    pub fn days(self) -> u32 {
        match self.month() {
            4 | 6 | 9 | 11 => 30,
            2 if is_leap_year(self.year()) => 29,
            2 => 28,
            _ => 31,
        }
    }

    fn day(self, day: u32) -> Result<NaiveDate, BillingInputError> {
        self.first_day
            .with_day(day)
            .ok_or_else(|| BillingInputError::MalformedMonth(self.to_string()))
    }
}

const fn is_leap_year(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

impl fmt::Display for TargetMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year(), self.month())
    }
}

impl FromStr for TargetMonth {
    type Err = BillingInputError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || BillingInputError::MalformedMonth(s.to_string());

        let (year, month) = s.trim().split_once('-').ok_or_else(malformed)?;
        if year.len() != 4 || month.is_empty() || month.len() > 2 {
            return Err(malformed());
        }

        let year = year.parse::<i32>().map_err(|_| malformed())?;
        let month = month.parse::<u32>().map_err(|_| malformed())?;
        Self::new(year, month).map_err(|_| malformed())
    }
}

impl TryFrom<String> for TargetMonth {
    type Error = BillingInputError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TargetMonth> for String {
    fn from(month: TargetMonth) -> Self {
        month.to_string()
    }
}

/// Inclusive range of delivery dates billed together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BillingPeriod {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

impl BillingPeriod {
    /// Resolve the period billed as `month` for a buyer closing on
    /// `closing_day`.
    ///
    /// # Errors
    ///
    /// Returns `MalformedMonth` when the preceding month falls outside the
    /// supported date range.
    pub fn resolve(month: TargetMonth, closing_day: ClosingDay) -> Result<Self, BillingInputError> {
        if closing_day.is_end_of_month() {
            return Ok(Self {
                start_date: month.day(1)?,
                end_date: month.day(month.days())?,
            });
        }

        // Closing days below 28 exist in every month, and so does the day after.
        let day = u32::from(closing_day.day());
        Ok(Self {
            start_date: month.previous()?.day(day + 1)?,
            end_date: month.day(day)?,
        })
    }

    /// Whether `date` falls inside the period, both ends inclusive.
    #[must_use]
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start_date <= date && date <= self.end_date
    }
}

impl fmt::Display for BillingPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} to {}", self.start_date, self.end_date)
    }
}

/// Resolve a billing period from raw `(year, month)` and closing day values.
///
/// # Errors
///
/// Returns `MalformedMonth` or `InvalidClosingDay` for out-of-range input.
pub fn resolve(year: i32, month: u32, closing_day: i32) -> Result<BillingPeriod, BillingInputError> {
    BillingPeriod::resolve(TargetMonth::new(year, month)?, ClosingDay::new(closing_day)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    #[test]
    fn test_end_of_month_non_leap_february() {
        let period = resolve(2026, 2, 99).expect("valid input");
        assert_eq!(period.start_date, date(2026, 2, 1));
        assert_eq!(period.end_date, date(2026, 2, 28));
    }

    #[test]
    fn test_end_of_month_leap_february() {
        let period = resolve(2024, 2, 99).expect("valid input");
        assert_eq!(period.end_date, date(2024, 2, 29));
    }

    #[test]
    fn test_closing_day_28_means_calendar_month() {
        let period = resolve(2026, 3, 28).expect("valid input");
        assert_eq!(period.start_date, date(2026, 3, 1));
        assert_eq!(period.end_date, date(2026, 3, 31));
    }

    #[test]
    fn test_mid_month_closing_rolls_over_year() {
        let period = resolve(2026, 1, 20).expect("valid input");
        assert_eq!(period.start_date, date(2025, 12, 21));
        assert_eq!(period.end_date, date(2026, 1, 20));
    }

    #[test]
    fn test_closing_day_27_after_february() {
        let period = resolve(2026, 3, 27).expect("valid input");
        assert_eq!(period.start_date, date(2026, 2, 28));
        assert_eq!(period.end_date, date(2026, 3, 27));
    }

    #[test]
    fn test_closing_day_one() {
        let period = resolve(2026, 5, 1).expect("valid input");
        assert_eq!(period.start_date, date(2026, 4, 2));
        assert_eq!(period.end_date, date(2026, 5, 1));
    }

    #[test]
    fn test_invalid_closing_days() {
        for day in [0, 29, 31, 98, 100, -1] {
            assert_eq!(
                resolve(2026, 1, day),
                Err(BillingInputError::InvalidClosingDay(day))
            );
        }
    }

    #[test]
    fn test_invalid_month() {
        assert!(matches!(
            resolve(2026, 13, 99),
            Err(BillingInputError::MalformedMonth(_))
        ));
    }

    #[test]
    fn test_target_month_parsing() {
        let month: TargetMonth = "2026-03".parse().expect("valid month");
        assert_eq!((month.year(), month.month()), (2026, 3));
        assert_eq!(month.to_string(), "2026-03");
        assert_eq!("2026-3".parse::<TargetMonth>(), Ok(month));

        for bad in ["2026", "2026-00", "2026-13", "26-03", "2026-03-01", "abcd-ef", ""] {
            assert!(bad.parse::<TargetMonth>().is_err(), "{bad} should not parse");
        }
    }

    #[test]
    fn test_target_month_serde() {
        let month: TargetMonth = serde_json::from_str("\"2025-12\"").expect("deserialize");
        assert_eq!(month.previous().expect("previous").to_string(), "2025-11");
        assert_eq!(serde_json::to_string(&month).expect("serialize"), "\"2025-12\"");
    }

    #[test]
    fn test_period_contains_both_ends() {
        let period = resolve(2026, 1, 20).expect("valid input");
        assert!(period.contains(date(2025, 12, 21)));
        assert!(period.contains(date(2026, 1, 20)));
        assert!(!period.contains(date(2025, 12, 20)));
        assert!(!period.contains(date(2026, 1, 21)));
    }

    #[test]
    fn test_closing_day_default_and_display() {
        assert_eq!(ClosingDay::default(), ClosingDay::END_OF_MONTH);
        assert_eq!(ClosingDay::END_OF_MONTH.to_string(), "end of month");
        assert_eq!(ClosingDay::new(15).expect("valid").to_string(), "15");
    }
}
