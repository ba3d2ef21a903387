use std::sync::OnceLock;

use chrono::{Datelike, NaiveDate, Utc};
use chrono_tz::Tz;
use regex::Regex;
use tracing::warn;

use crate::error::{AttendanceError, Result};

/// Storage format for session dates.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

// ── System timezone detection ─────────────────────────────────────────────────

/// Detect the IANA timezone name of the running system.
///
/// Falls back to `"UTC"` if detection fails.
pub fn get_system_timezone() -> String {
    iana_time_zone::get_timezone().unwrap_or_else(|_| "UTC".to_string())
}

// ── Canonical dates ───────────────────────────────────────────────────────────

fn canonical_date_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("regex is valid"))
}

/// `true` for a real calendar date written exactly as `YYYY-MM-DD`.
///
/// chrono alone would also accept `2025-3-5`, which would then sort and
/// prefix-match incorrectly as a storage key.
pub fn is_canonical_date(s: &str) -> bool {
    canonical_date_re().is_match(s) && NaiveDate::parse_from_str(s, DATE_FORMAT).is_ok()
}

/// Parse a canonical `YYYY-MM-DD` date.
pub fn parse_date(s: &str) -> Result<NaiveDate> {
    let trimmed = s.trim();
    if !is_canonical_date(trimmed) {
        return Err(AttendanceError::InvalidDate(s.to_string()));
    }
    NaiveDate::parse_from_str(trimmed, DATE_FORMAT)
        .map_err(|_| AttendanceError::InvalidDate(s.to_string()))
}

/// Format a date as a storage key.
pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

// ── Month windows ─────────────────────────────────────────────────────────────

/// The `YYYY-MM` prefix shared by every date key in `month` of `year`.
///
/// `month` is 1-indexed and zero-padded to two digits.
pub fn month_prefix(month: u32, year: i32) -> String {
    format!("{:04}-{:02}", year, month)
}

/// `true` when `date_key` falls inside the `month`/`year` window.
///
/// A plain prefix comparison: malformed keys simply do not match.
pub fn date_in_month(date_key: &str, month: u32, year: i32) -> bool {
    let prefix = month_prefix(month, year);
    date_key
        .strip_prefix(prefix.as_str())
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('-'))
}

// ── Calendar ──────────────────────────────────────────────────────────────────

/// Answers "what day is it" in a configured timezone.
pub struct Calendar {
    tz: Tz,
}

impl Calendar {
    /// Create a calendar for the given IANA timezone name.
    ///
    /// If `tz_name` is not a recognised IANA timezone, falls back to UTC
    /// and logs a warning.
    pub fn new(tz_name: &str) -> Self {
        let tz = tz_name.parse::<Tz>().unwrap_or_else(|_| {
            warn!(
                "Calendar: unrecognised timezone \"{}\", falling back to UTC",
                tz_name
            );
            Tz::UTC
        });
        Self { tz }
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    /// Today's date in the configured timezone.
    pub fn today(&self) -> NaiveDate {
        Utc::now().with_timezone(&self.tz).date_naive()
    }

    /// Today's date as a storage key.
    pub fn today_key(&self) -> String {
        format_date(self.today())
    }

    /// `(month, year)` of today, month 1-indexed.
    pub fn current_month_year(&self) -> (u32, i32) {
        let today = self.today();
        (today.month(), today.year())
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────
