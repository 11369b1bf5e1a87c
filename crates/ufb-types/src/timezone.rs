use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A UTC offset in the `+HH:MM` / `-HH:MM` form stored on the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimezoneOffset {
    minutes: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidOffset(pub String);

impl fmt::Display for InvalidOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid timezone offset '{}', expected +HH:MM", self.0)
    }
}

impl std::error::Error for InvalidOffset {}

impl TimezoneOffset {
    pub const UTC: TimezoneOffset = TimezoneOffset { minutes: 0 };

    pub fn from_minutes(minutes: i32) -> Option<Self> {
        // Real-world offsets span -12:00 ..= +14:00
        (-12 * 60..=14 * 60)
            .contains(&minutes)
            .then_some(Self { minutes })
    }

    pub fn minutes(&self) -> i32 {
        self.minutes
    }

    /// SQLite date-function modifier that shifts a UTC timestamp into this offset.
    pub fn sqlite_modifier(&self) -> String {
        format!("{:+} minutes", self.minutes)
    }
}

impl FromStr for TimezoneOffset {
    type Err = InvalidOffset;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || InvalidOffset(s.to_string());
        let bytes = s.as_bytes();
        if !s.is_ascii() || bytes.len() != 6 || bytes[3] != b':' {
            return Err(err());
        }
        let sign = match bytes[0] {
            b'+' => 1,
            b'-' => -1,
            _ => return Err(err()),
        };
        let digits = |range: std::ops::Range<usize>| -> Result<i32, InvalidOffset> {
            let part = &s[range];
            if !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(err());
            }
            part.parse().map_err(|_| err())
        };
        let hours = digits(1..3)?;
        let minutes = digits(4..6)?;
        if minutes >= 60 {
            return Err(err());
        }
        Self::from_minutes(sign * (hours * 60 + minutes)).ok_or_else(err)
    }
}

impl fmt::Display for TimezoneOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.minutes < 0 { '-' } else { '+' };
        let abs = self.minutes.abs();
        write!(f, "{}{:02}:{:02}", sign, abs / 60, abs % 60)
    }
}

impl Serialize for TimezoneOffset {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TimezoneOffset {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
