use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

static MONTH_KEY: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{4}-\d{2}$").expect("valid regex"));

/// Parses the timestamp shapes the platform emits. Empty strings and the
/// `0001-…` never-happened sentinel yield `None`.
pub fn parse_iso_date(value: &str) -> Option<DateTime<Utc>> {
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed.starts_with("0001") {
        return None;
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(parsed.with_timezone(&Utc));
    }

    // Naive timestamps are taken as UTC.
    if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(naive.and_utc());
    }

    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|naive| naive.and_utc());
    }

    if is_month_key(trimmed) {
        return NaiveDate::parse_from_str(&format!("{trimmed}-01"), "%Y-%m-%d")
            .ok()
            .and_then(|date| date.and_hms_opt(0, 0, 0))
            .map(|naive| naive.and_utc());
    }

    None
}

/// Four leading ASCII digits of `value`, if present.
pub fn year_from_date(value: &str) -> Option<String> {
    let year = value.get(..4)?;
    if year.chars().all(|c| c.is_ascii_digit()) {
        Some(year.to_string())
    } else {
        None
    }
}

/// `YYYY-MM` of a parseable timestamp. Applying it to its own output returns the
/// same key.
pub fn month_key(value: &str) -> Option<String> {
    parse_iso_date(value).map(|date| date.format("%Y-%m").to_string())
}

pub fn is_month_key(value: &str) -> bool {
    MONTH_KEY.is_match(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;

    #[test]
    fn parses_zulu_timestamp() {
        let parsed = parse_iso_date("2024-01-15T10:30:00Z").expect("parses");
        assert_eq!(parsed.year(), 2024);
        assert_eq!(parsed.month(), 1);
        assert_eq!(parsed.day(), 15);
    }

    #[test]
    fn parses_offset_and_long_fraction() {
        assert_eq!(
            parse_iso_date("2024-06-20T15:45:00+00:00").map(|d| d.year()),
            Some(2024)
        );
        let parsed = parse_iso_date("2019-05-12T20:13:56.4570000Z").expect("parses");
        assert_eq!(parsed.month(), 5);
    }

    #[test]
    fn parses_naive_and_date_only() {
        assert_eq!(
            parse_iso_date("2023-11-02T08:00:00").map(|d| d.day()),
            Some(2)
        );
        assert_eq!(parse_iso_date("2023-11-02").map(|d| d.month()), Some(11));
    }

    #[test]
    fn rejects_sentinel_empty_and_garbage() {
        assert!(parse_iso_date("0001-01-01T00:00:00Z").is_none());
        assert!(parse_iso_date("").is_none());
        assert!(parse_iso_date("not-a-date").is_none());
    }

    #[test]
    fn year_prefix() {
        assert_eq!(year_from_date("2024-01-15T10:30:00Z").as_deref(), Some("2024"));
        assert!(year_from_date("abc").is_none());
        assert!(year_from_date("").is_none());
        assert!(year_from_date("20x4-01-01").is_none());
    }

    #[test]
    fn month_keys() {
        assert_eq!(month_key("2024-06-15T10:30:00Z").as_deref(), Some("2024-06"));
        assert!(month_key("invalid").is_none());
        assert!(month_key("0001-01-01T00:00:00Z").is_none());
    }

    #[test]
    fn month_key_is_idempotent() {
        for input in ["2024-06-15T10:30:00Z", "2019-12-31T23:59:59.9990000Z", "2020-02-29"] {
            let once = month_key(input).expect("parses");
            assert!(is_month_key(&once));
            assert_eq!(month_key(&once).as_deref(), Some(once.as_str()));
        }
    }
}
