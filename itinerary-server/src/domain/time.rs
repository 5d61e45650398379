//! Schedule time handling.
//!
//! The provider gives times of day as "HH:MM:SS" strings (local, no
//! timezone) and service dates as "YYYYMMDD". Times past midnight belonging
//! to the previous service day are written with hours beyond 23, so a
//! `TimeOfDay` is stored as seconds since midnight rather than a wall-clock
//! time.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::DomainError;

/// Highest hour accepted in a schedule time (two service days).
const MAX_HOUR: u32 = 47;

/// A scheduled time of day, as seconds since local midnight.
///
/// # Examples
///
/// ```
/// use itinerary_server::domain::TimeOfDay;
///
/// let t = TimeOfDay::parse("07:46:00").unwrap();
/// assert_eq!(t.seconds(), 7 * 3600 + 46 * 60);
/// assert_eq!(t.to_string(), "07:46:00");
/// assert_eq!(t.hhmm(), "07:46");
///
/// // Seconds are optional
/// assert_eq!(TimeOfDay::parse("07:46").unwrap(), t);
///
/// // Past-midnight service times are allowed
/// assert!(TimeOfDay::parse("25:10:00").is_ok());
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TimeOfDay(u32);

impl TimeOfDay {
    /// Create a time from hours, minutes and seconds.
    pub fn from_hms(hour: u32, minute: u32, second: u32) -> Option<Self> {
        if hour > MAX_HOUR || minute > 59 || second > 59 {
            return None;
        }
        Some(Self(hour * 3600 + minute * 60 + second))
    }

    /// Parse a time from "HH:MM" or "HH:MM:SS".
    pub fn parse(s: &str) -> Result<Self, DomainError> {
        let err = |reason| DomainError::InvalidTime {
            value: s.to_string(),
            reason,
        };

        let mut parts = s.trim().split(':');
        let hour = parts
            .next()
            .and_then(parse_digits)
            .ok_or_else(|| err("invalid hour digits"))?;
        let minute = parts
            .next()
            .filter(|p| p.len() == 2)
            .and_then(parse_digits)
            .ok_or_else(|| err("invalid minute digits"))?;
        let second = match parts.next() {
            Some(p) if p.len() == 2 => parse_digits(p).ok_or_else(|| err("invalid second digits"))?,
            Some(_) => return Err(err("invalid second digits")),
            None => 0,
        };
        if parts.next().is_some() {
            return Err(err("expected HH:MM or HH:MM:SS"));
        }

        Self::from_hms(hour, minute, second).ok_or_else(|| err("component out of range"))
    }

    /// Total seconds since midnight.
    pub fn seconds(&self) -> u32 {
        self.0
    }

    pub fn hour(&self) -> u32 {
        self.0 / 3600
    }

    pub fn minute(&self) -> u32 {
        (self.0 / 60) % 60
    }

    pub fn second(&self) -> u32 {
        self.0 % 60
    }

    /// Formats as "HH:MM", dropping seconds.
    pub fn hhmm(&self) -> String {
        format!("{:02}:{:02}", self.hour(), self.minute())
    }
}

impl fmt::Debug for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TimeOfDay({})", self)
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02}:{:02}:{:02}",
            self.hour(),
            self.minute(),
            self.second()
        )
    }
}

/// Parse one or two ASCII digits.
fn parse_digits(s: &str) -> Option<u32> {
    if s.is_empty() || s.len() > 2 || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

/// Parse a service date in the provider's "YYYYMMDD" form.
///
/// ```
/// use itinerary_server::domain::parse_service_date;
/// use chrono::NaiveDate;
///
/// assert_eq!(
///     parse_service_date("20230703").unwrap(),
///     NaiveDate::from_ymd_opt(2023, 7, 3).unwrap()
/// );
/// assert!(parse_service_date("2023-07-03").is_err());
/// ```
pub fn parse_service_date(s: &str) -> Result<NaiveDate, DomainError> {
    let s = s.trim();
    if s.len() != 8 || !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(DomainError::InvalidDate(s.to_string()));
    }
    NaiveDate::parse_from_str(s, "%Y%m%d").map_err(|_| DomainError::InvalidDate(s.to_string()))
}
