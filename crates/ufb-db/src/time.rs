//! Timestamps are stored as UTC text in SQLite's `datetime('now')` layout so
//! that column defaults, range filters and `date()` grouping all agree.

use anyhow::{Result, anyhow};
use chrono::{DateTime, NaiveDateTime, Utc};

pub const FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn format(ts: DateTime<Utc>) -> String {
    ts.format(FORMAT).to_string()
}

pub fn now() -> String {
    format(Utc::now())
}

pub fn parse(raw: &str) -> Result<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(raw, FORMAT)
        .map(|ndt| ndt.and_utc())
        .or_else(|_| raw.parse::<DateTime<Utc>>())
        .map_err(|e| anyhow!("invalid timestamp '{}': {}", raw, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn round_trips_sqlite_layout() {
        let ts = Utc.with_ymd_and_hms(2023, 11, 24, 3, 12, 28).unwrap();
        let raw = format(ts);
        assert_eq!(raw, "2023-11-24 03:12:28");
        assert_eq!(parse(&raw).unwrap(), ts);
    }

    #[test]
    fn accepts_rfc3339() {
        let ts = parse("2023-11-24T03:12:28Z").unwrap();
        assert_eq!(format(ts), "2023-11-24 03:12:28");
        assert!(parse("yesterday").is_err());
    }
}
