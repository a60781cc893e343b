//! Calendar-day terms for date columns
//!
//! `YYYY-M-D` or `YYYY/M/D`, optionally prefixed with `>`, `>=`, `<`, `<=`.
//! Days are UTC days, bounds are inclusive epoch milliseconds.

use chrono::{NaiveDate, TimeZone, Utc};
use regex::Regex;
use std::sync::OnceLock;

use super::compiler::Comparison;

const DAY_MILLIS: i64 = 86_400_000;

/// First and last millisecond of a UTC calendar day
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayBounds {
    pub start: i64,
    pub end: i64,
}

impl DayBounds {
    pub fn of(date: NaiveDate) -> Option<Self> {
        let midnight = date.and_hms_opt(0, 0, 0)?;
        let start = Utc.from_utc_datetime(&midnight).timestamp_millis();
        Some(Self {
            start,
            end: start + DAY_MILLIS - 1,
        })
    }
}

fn date_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(>=|<=|>|<)?(\d{4})([-/])(\d{1,2})([-/])(\d{1,2})$")
            .unwrap_or_else(|e| panic!("date term pattern must compile: {}", e))
    })
}

/// Recognizes a date-shaped term. Returns `None` for anything else,
/// including impossible dates such as `2023-02-30`.
pub fn parse_date_term(term: &str) -> Option<(Option<Comparison>, DayBounds)> {
    let caps = date_pattern().captures(term.trim())?;
    if caps[3] != caps[5] {
        return None;
    }
    let op = caps.get(1).and_then(|m| Comparison::from_prefix(m.as_str()));
    let year: i32 = caps[2].parse().ok()?;
    let month: u32 = caps[4].parse().ok()?;
    let day: u32 = caps[6].parse().ok()?;
    let date = NaiveDate::from_ymd_opt(year, month, day)?;
    Some((op, DayBounds::of(date)?))
}
