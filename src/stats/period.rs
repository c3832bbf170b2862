use std::fmt;

use chrono::{Datelike, Month, NaiveDate};

use crate::{Result, error::DentalXlsxError};

/// A calendar month; the unit a workbook covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MonthKey {
    year: i32,
    month: u32,
}

impl MonthKey {
    pub fn new(year: i32, month: u32) -> Result<Self> {
        if !(1..=12).contains(&month) || NaiveDate::from_ymd_opt(year, month, 1).is_none() {
            return Err(DentalXlsxError::InvalidMonth(month));
        }
        Ok(MonthKey { year, month })
    }

    pub fn of(date: NaiveDate) -> Self {
        MonthKey {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    pub fn days_in_month(&self) -> u32 {
        let (next_year, next_month) = if self.month == 12 {
            (self.year + 1, 1)
        } else {
            (self.year, self.month + 1)
        };
        match (
            NaiveDate::from_ymd_opt(self.year, self.month, 1),
            NaiveDate::from_ymd_opt(next_year, next_month, 1),
        ) {
            (Some(first), Some(next)) => (next - first).num_days() as u32,
            _ => 31,
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date.year() == self.year && date.month() == self.month
    }

    /// English month name, e.g. "February".
    pub fn month_name(&self) -> &'static str {
        Month::try_from(self.month as u8)
            .map(|m| m.name())
            .unwrap_or("")
    }
}

/// Zero-padded `YYYY-MM`.
impl fmt::Display for MonthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{:02}", self.year, self.month)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn february_follows_leap_years() {
        assert_eq!(MonthKey::new(2023, 2).unwrap().days_in_month(), 28);
        assert_eq!(MonthKey::new(2024, 2).unwrap().days_in_month(), 29);
        assert_eq!(MonthKey::new(1900, 2).unwrap().days_in_month(), 28);
        assert_eq!(MonthKey::new(2000, 2).unwrap().days_in_month(), 29);
    }

    #[test]
    fn month_lengths() {
        let lens: Vec<u32> = (1..=12)
            .map(|m| MonthKey::new(2023, m).unwrap().days_in_month())
            .collect();
        assert_eq!(lens, [31, 28, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31]);
    }

    #[test]
    fn rejects_months_outside_the_calendar() {
        assert!(matches!(
            MonthKey::new(2024, 0),
            Err(DentalXlsxError::InvalidMonth(0))
        ));
        assert!(MonthKey::new(2024, 13).is_err());
    }

    #[test]
    fn names_and_stamps() {
        let key = MonthKey::new(2024, 3).unwrap();
        assert_eq!(key.month_name(), "March");
        assert_eq!(key.to_string(), "2024-03");
    }
}
