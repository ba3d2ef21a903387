//! Attendance statistics over an in-memory [`AttendanceBook`].
//!
//! Everything here is a pure function of its arguments: callers load a
//! snapshot from the repository and pass the pieces in on every call.

use serde::Serialize;

use attendance_core::calculations::{attendance_percentage, is_below_threshold};
use attendance_core::models::{AttendanceBook, AttendanceStatus, Student};
use attendance_core::time_utils::date_in_month;

// ── StatusTally ───────────────────────────────────────────────────────────────

/// Per-status counts for a set of attendance entries.
///
/// `unmarked` counts entries saved without a status, so that
/// `present + absent + late + unmarked` always equals the number of entries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusTally {
    #[serde(rename = "PRESENT")]
    pub present: u32,
    #[serde(rename = "ABSENT")]
    pub absent: u32,
    #[serde(rename = "LATE")]
    pub late: u32,
    #[serde(rename = "UNMARKED")]
    pub unmarked: u32,
}

impl StatusTally {
    /// Count one entry.
    pub fn record(&mut self, status: Option<AttendanceStatus>) {
        match status {
            Some(AttendanceStatus::Present) => self.present += 1,
            Some(AttendanceStatus::Absent) => self.absent += 1,
            Some(AttendanceStatus::Late) => self.late += 1,
            None => self.unmarked += 1,
        }
    }

    /// Entries that carry a status.
    pub fn marked(&self) -> u32 {
        self.present + self.absent + self.late
    }

    /// Every entry, marked or not.
    pub fn total(&self) -> u32 {
        self.marked() + self.unmarked
    }

    /// Present share of marked entries, `0` when nothing is marked.
    pub fn percentage(&self) -> u32 {
        attendance_percentage(self.present, self.marked())
    }
}

// ── Report types ──────────────────────────────────────────────────────────────

/// One session a student appears in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    /// Batch the session was recorded under.
    pub batch_id: String,
    pub date: String,
    pub status: Option<AttendanceStatus>,
}

/// Attendance summary for one student across every batch and date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentReport {
    pub percentage: u32,
    pub present_count: u32,
    pub absent_count: u32,
    pub late_count: u32,
    /// Most recent first.
    pub history: Vec<HistoryEntry>,
}

/// A student whose monthly attendance is below the threshold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DefaulterEntry {
    pub student: Student,
    pub percentage: u32,
    pub present_count: u32,
    pub marked_count: u32,
}

/// Which batches a defaulter query looks at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchScope {
    All,
    Only(String),
}

impl BatchScope {
    pub fn from_option(batch_id: Option<String>) -> Self {
        batch_id.map_or(BatchScope::All, BatchScope::Only)
    }

    fn includes_batch(&self, batch_id: &str) -> bool {
        match self {
            BatchScope::All => true,
            BatchScope::Only(id) => id == batch_id,
        }
    }
}

// ── AttendanceAggregator ──────────────────────────────────────────────────────

/// Stateless attendance statistics.
pub struct AttendanceAggregator;

impl AttendanceAggregator {
    /// Tally and history for `student_id` across every batch and date.
    ///
    /// Unmarked entries show up in the history but not in the counts. An
    /// unknown id yields all-zero counts and an empty history.
    pub fn student_report(student_id: &str, attendance: &AttendanceBook) -> StudentReport {
        let mut tally = StatusTally::default();
        let mut history: Vec<HistoryEntry> = Vec::new();

        for (batch_id, days) in attendance {
            for (date, entries) in days {
                for entry in entries.iter().filter(|e| e.student_id == student_id) {
                    tally.record(entry.status);
                    history.push(HistoryEntry {
                        batch_id: batch_id.clone(),
                        date: date.clone(),
                        status: entry.status,
                    });
                }
            }
        }

        // Stable: equal dates keep encounter order.
        history.sort_by(|a, b| b.date.cmp(&a.date));

        StudentReport {
            percentage: tally.percentage(),
            present_count: tally.present,
            absent_count: tally.absent,
            late_count: tally.late,
            history,
        }
    }

    /// Status counts for one `(batch, date)` session.
    ///
    /// Returns `None` when no session was recorded, which is distinct from a
    /// recorded session with zero presents.
    pub fn batch_summary(
        batch_id: &str,
        date: &str,
        attendance: &AttendanceBook,
    ) -> Option<StatusTally> {
        let entries = attendance.get(batch_id)?.get(date)?;
        let mut tally = StatusTally::default();
        for entry in entries {
            tally.record(entry.status);
        }
        Some(tally)
    }

    /// Students whose present percentage within `month`/`year` is strictly
    /// below `threshold`.
    ///
    /// With [`BatchScope::Only`] the roster is narrowed to students enrolled
    /// in that batch and only that batch's sessions are counted. Students
    /// with no marked session in the window are never listed. Results keep
    /// roster order.
    pub fn defaulters(
        scope: &BatchScope,
        month: u32,
        year: i32,
        threshold: u8,
        students: &[Student],
        attendance: &AttendanceBook,
    ) -> Vec<DefaulterEntry> {
        students
            .iter()
            .filter(|student| match scope {
                BatchScope::All => true,
                BatchScope::Only(id) => &student.batch == id,
            })
            .filter_map(|student| {
                let tally = Self::month_tally(&student.id, scope, month, year, attendance);
                if tally.marked() == 0 {
                    return None;
                }
                let percentage = tally.percentage();
                is_below_threshold(percentage, threshold).then(|| DefaulterEntry {
                    student: student.clone(),
                    percentage,
                    present_count: tally.present,
                    marked_count: tally.marked(),
                })
            })
            .collect()
    }

    /// Counts for one student over the sessions of `month`/`year` in scope.
    pub fn month_tally(
        student_id: &str,
        scope: &BatchScope,
        month: u32,
        year: i32,
        attendance: &AttendanceBook,
    ) -> StatusTally {
        let mut tally = StatusTally::default();
        let in_window = attendance
            .iter()
            .filter(|(batch_id, _)| scope.includes_batch(batch_id))
            .flat_map(|(_, days)| days.iter())
            .filter(|(date, _)| date_in_month(date, month, year));

        for (_, entries) in in_window {
            for entry in entries.iter().filter(|e| e.student_id == student_id) {
                tally.record(entry.status);
            }
        }
        tally
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
