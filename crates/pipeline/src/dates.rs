//! Day-precision date parsing
//!
//! Ambiguous numeric dates are read day-first (`03/04/2024` is 3 April).
//! When the day-first reading is impossible the month-first one is tried,
//! so `12/31/2024` still parses.

use chrono::{DateTime, NaiveDate, NaiveDateTime};

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%Y%m%d",
    "%d/%m/%Y",
    "%d-%m-%Y",
    "%d.%m.%Y",
    "%d/%m/%y",
    "%d %b %Y",
    "%d %B %Y",
    "%b %d %Y",
    "%B %d %Y",
    "%m/%d/%Y",
    "%m-%d-%Y",
];

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

/// Parse a date or timestamp, keeping only the calendar day.
pub fn parse_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    let cleaned = text.replace(',', "");

    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(&cleaned, fmt) {
            return Some(d);
        }
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(&cleaned, fmt) {
            return Some(dt.date());
        }
    }
    DateTime::parse_from_rfc3339(text).ok().map(|dt| dt.date_naive())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_iso_and_timestamps() {
        assert_eq!(parse_date("2024-03-05"), Some(ymd(2024, 3, 5)));
        assert_eq!(parse_date("2024-03-05 14:22:01"), Some(ymd(2024, 3, 5)));
        assert_eq!(parse_date("2024-03-05T14:22:01.250"), Some(ymd(2024, 3, 5)));
        assert_eq!(parse_date("2024-03-05T14:22:01+03:00"), Some(ymd(2024, 3, 5)));
    }

    #[test]
    fn test_day_first() {
        assert_eq!(parse_date("03/04/2024"), Some(ymd(2024, 4, 3)));
        assert_eq!(parse_date("03.04.2024"), Some(ymd(2024, 4, 3)));
        assert_eq!(parse_date("03/04/2024 08:00"), Some(ymd(2024, 4, 3)));
        // Impossible day-first reading falls back to month-first
        assert_eq!(parse_date("12/31/2024"), Some(ymd(2024, 12, 31)));
    }

    #[test]
    fn test_named_months() {
        assert_eq!(parse_date("5 Mar 2024"), Some(ymd(2024, 3, 5)));
        assert_eq!(parse_date("March 5, 2024"), Some(ymd(2024, 3, 5)));
    }

    #[test]
    fn test_garbage() {
        assert_eq!(parse_date("yesterday"), None);
        assert_eq!(parse_date(""), None);
        assert_eq!(parse_date("2024-13-40"), None);
    }
}
