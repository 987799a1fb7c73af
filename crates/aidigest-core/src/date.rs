//! Calendar handling pinned to Asia/Shanghai (UTC+8, no DST).
//!
//! Every operation that depends on "today" takes an explicit [`FetchDate`]
//! instead of reading process-wide state.

use std::fmt;
use std::str::FromStr;

use anyhow::{Context, Result};
use chrono::{DateTime, Datelike, Days, FixedOffset, NaiveDate, NaiveDateTime, Offset, Utc};

const SHANGHAI_OFFSET_SECS: i32 = 8 * 3600;

/// The UTC+8 offset used for all calendar decisions.
pub fn shanghai() -> FixedOffset {
    FixedOffset::east_opt(SHANGHAI_OFFSET_SECS).unwrap_or_else(|| Utc.fix())
}

/// The day a fetch, report or RSS build is performed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FetchDate(NaiveDate);

impl FetchDate {
    /// Today's date in Shanghai.
    pub fn today() -> Self {
        Self::at(Utc::now())
    }

    /// The Shanghai calendar date of `instant`.
    pub fn at(instant: DateTime<Utc>) -> Self {
        Self(instant.with_timezone(&shanghai()).date_naive())
    }

    pub fn from_date(date: NaiveDate) -> Self {
        Self(date)
    }

    pub fn date(self) -> NaiveDate {
        self.0
    }

    /// The date `days` earlier (saturates at the calendar minimum).
    pub fn days_back(self, days: u64) -> Self {
        Self(self.0.checked_sub_days(Days::new(days)).unwrap_or(NaiveDate::MIN))
    }

    /// `2025年5月30日`
    pub fn to_chinese(self) -> String {
        format!("{}年{}月{}日", self.0.year(), self.0.month(), self.0.day())
    }
}

impl fmt::Display for FetchDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d"))
    }
}

impl FromStr for FetchDate {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
            .map(Self)
            .with_context(|| format!("Invalid date '{s}', expected YYYY-MM-DD"))
    }
}

/// Parses the timestamp formats feeds actually send.
///
/// RFC 3339 and RFC 2822 keep their offset. Offset-less values
/// (`YYYY-MM-DD`, `YYYY-MM-DDTHH:MM:SS`) are read as UTC.
pub fn parse_published(value: &str) -> Option<DateTime<FixedOffset>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt);
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(value) {
        return Some(dt);
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Some(naive.and_utc().fixed_offset());
        }
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc().fixed_offset())
}

/// True when the Shanghai calendar date of `published` lies within the
/// `days` days ending at `fetch_date` (inclusive).
///
/// `days == 0` and unparsable timestamps never match.
pub fn is_within_last_days(published: &str, fetch_date: FetchDate, days: u32) -> bool {
    if days == 0 {
        return false;
    }
    let Some(published) = parse_published(published) else {
        return false;
    };
    let item_day = published.with_timezone(&shanghai()).date_naive();
    let earliest = fetch_date.days_back(u64::from(days - 1)).date();
    item_day >= earliest && item_day <= fetch_date.date()
}

/// RFC 822 style date as used by RSS 2.0 (`Thu, 01 Jan 1970 00:00:00 GMT`).
pub fn format_rss_date(instant: DateTime<Utc>) -> String {
    instant.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Millisecond timestamp for ordering; unparsable values sort last.
pub fn sort_key(published: &str) -> i64 {
    parse_published(published).map_or(i64::MIN, |dt| dt.timestamp_millis())
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn date(s: &str) -> FetchDate {
        s.parse().unwrap()
    }

    #[test]
    fn test_fetch_date_parse_and_display() {
        assert_eq!(date("2025-06-01").to_string(), "2025-06-01");
        assert_eq!(date("2025-06-01").to_chinese(), "2025年6月1日");
        assert!("2025/06/01".parse::<FetchDate>().is_err());
        assert_eq!(date("2025-03-01").days_back(1).to_string(), "2025-02-28");
    }

    #[test]
    fn test_today_uses_shanghai_offset() {
        let late_utc = Utc.with_ymd_and_hms(2025, 5, 31, 17, 30, 0).unwrap();
        assert_eq!(FetchDate::at(late_utc).to_string(), "2025-06-01");
        let early_utc = Utc.with_ymd_and_hms(2025, 5, 31, 15, 59, 59).unwrap();
        assert_eq!(FetchDate::at(early_utc).to_string(), "2025-05-31");
    }

    /// Test: window is inclusive of the fetch date and `days - 1` days before it.
    #[test]
    fn test_is_within_last_days_window() {
        let fetch = date("2025-06-03");
        assert!(is_within_last_days("2025-06-03T10:00:00Z", fetch, 3));
        assert!(is_within_last_days("2025-06-01T00:00:00+08:00", fetch, 3));
        assert!(!is_within_last_days("2025-05-31T15:59:59Z", fetch, 3));
        // 16:30 UTC on May 31st is already June 1st in Shanghai.
        assert!(is_within_last_days("2025-05-31T16:30:00Z", fetch, 3));
        assert!(!is_within_last_days("2025-06-04T01:00:00+08:00", fetch, 3));
        assert!(!is_within_last_days("2025-06-03T10:00:00Z", fetch, 0));
        assert!(!is_within_last_days("not a date", fetch, 3));
    }

    #[test]
    fn test_parse_published_formats() {
        assert!(parse_published("2025-06-01T08:24:52.000Z").is_some());
        assert!(parse_published("Sun, 01 Jun 2025 08:24:52 +0000").is_some());
        assert!(parse_published("2025-06-01").is_some());
        assert!(parse_published("2025-06-01 08:00:00").is_some());
        assert!(parse_published("").is_none());
    }

    #[test]
    fn test_format_rss_date() {
        let instant = Utc.with_ymd_and_hms(1970, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(format_rss_date(instant), "Thu, 01 Jan 1970 00:00:00 GMT");
    }

    #[test]
    fn test_sort_key_orders_unparsable_last() {
        assert!(sort_key("2025-06-02") > sort_key("2025-06-01"));
        assert_eq!(sort_key("garbage"), i64::MIN);
    }
}
