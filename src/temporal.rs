// ⏰ Temporal Helpers - calendar month buckets
// The gold layer keys everything by the first day of the month

use crate::error::{PipelineError, Result};
use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime};

/// Truncate a date to the first day of its month (the bucket key)
pub fn month_start(date: NaiveDate) -> NaiveDate {
    // day 1 exists in every month
    date.with_day(1).unwrap_or(date)
}

/// Parse a `YYYY-MM` month into its bucket key
///
/// Only the exact form is accepted: no day part, no surrounding whitespace.
pub fn parse_month(ym: &str) -> Result<NaiveDate> {
    let invalid = || PipelineError::InvalidArgument(format!("month must be YYYY-MM, got '{}'", ym));

    if ym.len() != 7 || ym.as_bytes()[4] != b'-' {
        return Err(invalid());
    }

    NaiveDate::parse_from_str(&format!("{}-01", ym), "%Y-%m-%d").map_err(|_| invalid())
}

/// Format a bucket key back into `YYYY-MM`
pub fn format_month(month: NaiveDate) -> String {
    month.format("%Y-%m").to_string()
}

/// Parse a raw date cell
///
/// Accepts `YYYY-MM-DD`, `YYYY-MM-DD HH:MM:SS` and RFC 3339 timestamps; the
/// time part is discarded.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let s = raw.trim();

    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(d);
    }

    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(dt.date());
    }

    DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.date_naive())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_month_start_truncates() {
        assert_eq!(month_start(d(2012, 8, 26)), d(2012, 8, 1));
        assert_eq!(month_start(d(2012, 8, 1)), d(2012, 8, 1));
        assert_eq!(month_start(d(2024, 2, 29)), d(2024, 2, 1));
    }

    #[test]
    fn test_parse_month() {
        assert_eq!(parse_month("1993-04").unwrap(), d(1993, 4, 1));
        assert!(parse_month("1993-4").is_err());
        assert!(parse_month("1993-13").is_err());
        assert!(parse_month("1993-04-01").is_err());
        assert!(parse_month("199304").is_err());
    }

    #[test]
    fn test_format_month_round_trips() {
        assert_eq!(format_month(parse_month("2012-08").unwrap()), "2012-08");
    }

    #[test]
    fn test_parse_date_formats() {
        assert_eq!(parse_date("2009-03-29"), Some(d(2009, 3, 29)));
        assert_eq!(parse_date("2009-03-29 06:00:00"), Some(d(2009, 3, 29)));
        assert_eq!(parse_date("2009-03-29T06:00:00Z"), Some(d(2009, 3, 29)));
        assert_eq!(parse_date("29/03/2009"), None);
        assert_eq!(parse_date("TBC"), None);
    }
}
