//! Calendar-day partition key.
//!
//! Every row that belongs to "a day" carries a `date_int` column encoded as
//! `YYYYMMDD`. All conversions here are pinned to UTC so that bucketing never
//! depends on the host's locale.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use std::fmt;

const MIN_YEAR: i32 = 1;
const MAX_YEAR: i32 = 9999;

/// `YYYYMMDD` only holds four-digit, positive years.
fn has_encodable_year(date: &NaiveDate) -> bool {
  (MIN_YEAR..=MAX_YEAR).contains(&date.year())
}

/// A calendar day encoded as `YYYYMMDD`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DateBucket(u32);

impl DateBucket {
  /// Bucket for the current UTC day.
  pub fn today() -> Self {
    Self::from_date(Utc::now().date_naive())
  }

  /// Years outside `1..=9999` are clamped; use [`DateBucket::parse_or`] or
  /// [`DateBucket::of_timestamp`] to reject them instead.
  pub fn from_date(date: NaiveDate) -> Self {
    let year = date.year().clamp(MIN_YEAR, MAX_YEAR) as u32;
    Self(year * 10000 + date.month() * 100 + date.day())
  }

  /// Bucket containing the given unix timestamp (seconds).
  pub fn of_timestamp(ts: i64) -> Self {
    DateTime::from_timestamp(ts, 0)
      .map(|dt| dt.date_naive())
      .filter(has_encodable_year)
      .map(Self::from_date)
      .unwrap_or_else(Self::today)
  }

  /// Parse a `YYYY-MM-DD` string, falling back to `today` when the input is
  /// empty or malformed. Never fails.
  pub fn parse_or(input: &str, today: DateBucket) -> Self {
    let input = input.trim();
    if input.is_empty() {
      return today;
    }
    NaiveDate::parse_from_str(input, "%Y-%m-%d")
      .ok()
      .filter(has_encodable_year)
      .map(Self::from_date)
      .unwrap_or(today)
  }

  /// Parse against the current UTC day.
  pub fn parse(input: &str) -> Self {
    Self::parse_or(input, Self::today())
  }

  /// Rebuild from the stored integer, rejecting impossible dates.
  pub fn from_int(value: u32) -> Option<Self> {
    Self(value).to_date().map(Self::from_date)
  }

  pub fn as_int(self) -> u32 {
    self.0
  }

  pub fn to_date(self) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(
      (self.0 / 10000) as i32,
      (self.0 % 10000) / 100,
      self.0 % 100,
    )
  }

  /// Unix timestamp of 00:00:00 UTC on this day.
  pub fn day_start(self) -> i64 {
    self
      .to_date()
      .and_then(|d| d.and_hms_opt(0, 0, 0))
      .map(|dt| dt.and_utc().timestamp())
      .unwrap_or(0)
  }
}

impl fmt::Display for DateBucket {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self.to_date() {
      Some(date) => write!(f, "{}", date.format("%Y-%m-%d")),
      None => write!(f, "{}", self.0),
    }
  }
}
