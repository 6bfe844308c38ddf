use std::fmt;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Canonical calendar-day bucket for all counters.
///
/// Every date the system stores or accepts on the wire goes through this type:
/// compact `YYYYMMDD` strings for counter keys and query parameters, ISO
/// `YYYY-MM-DD` for the active-users payload, and derivation from an instant
/// under the configured fixed UTC offset. No other date representation exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DateBucket(NaiveDate);

impl DateBucket {
    /// Lower bound used when a range query omits its start.
    pub const EPOCH: DateBucket = DateBucket(NaiveDate::MIN);

    pub fn new(date: NaiveDate) -> Self {
        Self(date)
    }

    /// Parse the compact 8-digit form, e.g. `20250131`.
    pub fn parse_compact(raw: &str) -> Result<Self, &'static str> {
        if raw.len() != 8 || !raw.bytes().all(|b| b.is_ascii_digit()) {
            return Err("date must be 8 digits in YYYYMMDD format");
        }
        NaiveDate::parse_from_str(raw, "%Y%m%d")
            .map(Self)
            .map_err(|_| "date is not a valid calendar day")
    }

    /// Parse the ISO form, e.g. `2025-01-31`.
    pub fn parse_iso(raw: &str) -> Result<Self, &'static str> {
        NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .map(Self)
            .map_err(|_| "date must use the YYYY-MM-DD format")
    }

    /// The bucket an instant falls into under the given fixed UTC offset.
    pub fn from_instant(instant: DateTime<Utc>, utc_offset_minutes: i32) -> Self {
        Self((instant + Duration::minutes(utc_offset_minutes as i64)).date_naive())
    }

    pub fn today(utc_offset_minutes: i32) -> Self {
        Self::from_instant(Utc::now(), utc_offset_minutes)
    }

    /// Local midnight of this bucket expressed back in UTC.
    pub fn start_of_day_utc(&self, utc_offset_minutes: i32) -> DateTime<Utc> {
        let midnight = self.0.and_hms_opt(0, 0, 0).unwrap_or_default();
        DateTime::from_naive_utc_and_offset(
            midnight - Duration::minutes(utc_offset_minutes as i64),
            Utc,
        )
    }

    pub fn compact(&self) -> String {
        self.0.format("%Y%m%d").to_string()
    }

    pub fn iso(&self) -> String {
        self.0.format("%Y-%m-%d").to_string()
    }

    pub fn date(&self) -> NaiveDate {
        self.0
    }
}

/// Inclusive date range resolved from optional query inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: DateBucket,
    pub end: DateBucket,
}

impl DateRange {
    pub fn single(date: DateBucket) -> Self {
        Self {
            start: date,
            end: date,
        }
    }

    /// Resolve `date` / `start` / `end` query inputs. An exact `date` wins over a
    /// range; a missing start defaults to the epoch, a missing end to `today`.
    /// start > end is rejected, never swapped.
    pub fn resolve(
        date: Option<DateBucket>,
        start: Option<DateBucket>,
        end: Option<DateBucket>,
        today: DateBucket,
    ) -> Result<Self, &'static str> {
        if let Some(date) = date {
            return Ok(Self::single(date));
        }
        let start = start.unwrap_or(DateBucket::EPOCH);
        let end = end.unwrap_or(today);
        if start > end {
            return Err("start date cannot be after end date");
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, date: DateBucket) -> bool {
        self.start <= date && date <= self.end
    }
}

impl fmt::Display for DateBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.compact())
    }
}

impl Serialize for DateBucket {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.compact())
    }
}

impl<'de> Deserialize<'de> for DateBucket {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse_compact(&raw).map_err(D::Error::custom)
    }
}
