//! Text formatting helpers shared by the table renderer.

use crate::models::{AttendanceStatus, Schedule};

/// Placeholder shown for absent optional values.
pub const EMPTY_CELL: &str = "-";

/// Format a whole-number percentage, e.g. `"68%"`.
///
/// # Examples
///
/// ```
/// use attendance_core::formatting::format_percentage;
///
/// assert_eq!(format_percentage(68), "68%");
/// assert_eq!(format_percentage(0), "0%");
/// ```
pub fn format_percentage(percentage: u32) -> String {
    format!("{}%", percentage)
}

/// Format a session count with thousands separators.
///
/// # Examples
///
/// ```
/// use attendance_core::formatting::format_count;
///
/// assert_eq!(format_count(7), "7");
/// assert_eq!(format_count(12_345), "12,345");
/// ```
pub fn format_count(count: u32) -> String {
    group_thousands(&count.to_string())
}

/// Label for a possibly-unmarked status.
pub fn format_status(status: Option<AttendanceStatus>) -> &'static str {
    status.map(AttendanceStatus::label).unwrap_or("Not marked")
}

/// Schedule text, or [`EMPTY_CELL`].
pub fn format_schedule(schedule: Option<&Schedule>) -> &str {
    schedule
        .map(Schedule::describe)
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(EMPTY_CELL)
}

/// Optional free text, or [`EMPTY_CELL`] when missing or blank.
pub fn format_optional(value: Option<&str>) -> &str {
    value.filter(|s| !s.trim().is_empty()).unwrap_or(EMPTY_CELL)
}

// ── Internal helpers ──────────────────────────────────────────────────────────

/// Insert commas every three digits from the right of an integer string.
fn group_thousands(s: &str) -> String {
    if s.len() <= 3 {
        return s.to_string();
    }
    let chars: Vec<char> = s.chars().collect();
    let mut result = String::with_capacity(s.len() + s.len() / 3);
    let remainder = chars.len() % 3;
    for (i, &c) in chars.iter().enumerate() {
        if i != 0 && (i % 3 == remainder) {
            result.push(',');
        }
        result.push(c);
    }
    result
}

// ── Tests ──────────────────────────────────────────────────────────────────────
