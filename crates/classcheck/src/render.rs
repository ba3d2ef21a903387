//! Plain-text tables and JSON output for the command layer.
//!
//! Every function returns the finished text so commands can be tested
//! without capturing stdout.

use serde::Serialize;
use unicode_width::UnicodeWidthStr;

use attendance_core::formatting::{
    format_count, format_optional, format_percentage, format_schedule, format_status,
};
use attendance_core::models::{Batch, Snapshot, Student};
use attendance_core::time_utils::month_prefix;
use attendance_data::aggregator::{DefaulterEntry, StatusTally, StudentReport};
use attendance_data::repository::SessionRow;

/// Shown by `report batch` when nothing was saved for the day.
pub const NO_ATTENDANCE: &str = "No attendance recorded";

// ── TextTable ─────────────────────────────────────────────────────────────────

/// Left-aligned columns padded to their widest cell.
pub struct TextTable {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl TextTable {
    pub fn new(headers: &[&str]) -> Self {
        Self {
            headers: headers.iter().map(|h| h.to_string()).collect(),
            rows: Vec::new(),
        }
    }

    pub fn push_row(&mut self, row: Vec<String>) {
        self.rows.push(row);
    }

    pub fn render(&self) -> String {
        let mut widths: Vec<usize> = self.headers.iter().map(|h| h.width()).collect();
        for row in &self.rows {
            for (i, cell) in row.iter().enumerate() {
                if let Some(w) = widths.get_mut(i) {
                    *w = (*w).max(cell.width());
                }
            }
        }

        let mut lines = Vec::with_capacity(self.rows.len() + 2);
        lines.push(format_line(&self.headers, &widths));
        lines.push(
            widths
                .iter()
                .map(|w| "─".repeat(*w))
                .collect::<Vec<_>>()
                .join("  "),
        );
        for row in &self.rows {
            lines.push(format_line(row, &widths));
        }
        lines.join("\n")
    }
}

fn format_line(cells: &[String], widths: &[usize]) -> String {
    let padded: Vec<String> = widths
        .iter()
        .enumerate()
        .map(|(i, width)| {
            let cell = cells.get(i).map(String::as_str).unwrap_or("");
            let pad = width.saturating_sub(cell.width());
            format!("{}{}", cell, " ".repeat(pad))
        })
        .collect();
    padded.join("  ").trim_end().to_string()
}

// ── JSON ──────────────────────────────────────────────────────────────────────

pub fn json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}

// ── Batches & students ────────────────────────────────────────────────────────

pub fn batches(batches: &[Batch]) -> String {
    if batches.is_empty() {
        return "No batches yet".to_string();
    }
    let mut table = TextTable::new(&["ID", "Name", "Description", "Schedule"]);
    for batch in batches {
        table.push_row(vec![
            batch.id.clone(),
            batch.name.clone(),
            format_optional(batch.description.as_deref()).to_string(),
            format_schedule(batch.schedule.as_ref()).to_string(),
        ]);
    }
    table.render()
}

pub fn batch_line(verb: &str, batch: &Batch) -> String {
    format!("{} batch {} ({})", verb, batch.name, batch.id)
}

/// Batch name for display; students may point at a deleted batch.
fn batch_name<'a>(snapshot: &'a Snapshot, batch_id: &'a str) -> &'a str {
    snapshot
        .batch(batch_id)
        .map(|b| b.name.as_str())
        .unwrap_or(batch_id)
}

pub fn students(students: &[&Student], snapshot: &Snapshot) -> String {
    if students.is_empty() {
        return "No students found".to_string();
    }
    let mut table = TextTable::new(&["ID", "Roll", "Name", "Batch", "Contact"]);
    for student in students {
        table.push_row(vec![
            student.id.clone(),
            student.roll_number.clone(),
            student.name.clone(),
            batch_name(snapshot, &student.batch).to_string(),
            format_optional(student.contact_number.as_deref()).to_string(),
        ]);
    }
    table.render()
}

pub fn student_line(verb: &str, student: &Student) -> String {
    format!(
        "{} student {} (roll {}, {})",
        verb, student.name, student.roll_number, student.id
    )
}

// ── Sessions ──────────────────────────────────────────────────────────────────

pub fn session(batch: &Batch, date: &str, rows: &[SessionRow]) -> String {
    let title = format!("{} on {}", batch.name, date);
    if rows.is_empty() {
        return format!("{}\nNo students in this batch", title);
    }
    let mut table = TextTable::new(&["Roll", "Name", "ID", "Status"]);
    for row in rows {
        table.push_row(vec![
            row.student.roll_number.clone(),
            row.student.name.clone(),
            row.student.id.clone(),
            format_status(row.status).to_string(),
        ]);
    }
    format!("{}\n{}", title, table.render())
}

// ── Reports ───────────────────────────────────────────────────────────────────

pub fn student_report(
    student_id: &str,
    report: &StudentReport,
    snapshot: &Snapshot,
) -> String {
    let heading = match snapshot.student(student_id) {
        Some(student) => format!("{} (roll {})", student.name, student.roll_number),
        None => format!("{} (no longer enrolled)", student_id),
    };

    let mut out = vec![
        heading,
        format!(
            "Attendance: {}  Present {}  Absent {}  Late {}",
            format_percentage(report.percentage),
            format_count(report.present_count),
            format_count(report.absent_count),
            format_count(report.late_count),
        ),
    ];

    if report.history.is_empty() {
        out.push("No attendance history".to_string());
    } else {
        let mut table = TextTable::new(&["Date", "Batch", "Status"]);
        for entry in &report.history {
            table.push_row(vec![
                entry.date.clone(),
                batch_name(snapshot, &entry.batch_id).to_string(),
                format_status(entry.status).to_string(),
            ]);
        }
        out.push(String::new());
        out.push(table.render());
    }
    out.join("\n")
}

pub fn batch_summary(batch: &Batch, date: &str, summary: Option<&StatusTally>) -> String {
    let title = format!("{} on {}", batch.name, date);
    let Some(tally) = summary else {
        return format!("{}\n{}", title, NO_ATTENDANCE);
    };

    let mut table = TextTable::new(&["Status", "Count"]);
    for (label, count) in [
        ("Present", tally.present),
        ("Absent", tally.absent),
        ("Late", tally.late),
        ("Not marked", tally.unmarked),
        ("Total", tally.total()),
    ] {
        table.push_row(vec![label.to_string(), format_count(count)]);
    }
    format!("{}\n{}", title, table.render())
}

pub fn defaulters(
    entries: &[DefaulterEntry],
    month: u32,
    year: i32,
    threshold: u8,
    snapshot: &Snapshot,
) -> String {
    let title = format!(
        "Below {} in {}",
        format_percentage(u32::from(threshold)),
        month_prefix(month, year)
    );
    if entries.is_empty() {
        return format!("{}\nNo defaulters", title);
    }

    let mut table = TextTable::new(&["Roll", "Name", "Batch", "Attendance", "Present"]);
    for entry in entries {
        table.push_row(vec![
            entry.student.roll_number.clone(),
            entry.student.name.clone(),
            batch_name(snapshot, &entry.student.batch).to_string(),
            format_percentage(entry.percentage),
            format!(
                "{}/{}",
                format_count(entry.present_count),
                format_count(entry.marked_count)
            ),
        ]);
    }
    format!("{}\n{}", title, table.render())
}

// ── Overview ──────────────────────────────────────────────────────────────────

/// Counts shown when classcheck runs without a subcommand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Overview {
    pub batches: usize,
    pub students: usize,
    pub sessions: usize,
}

impl Overview {
    pub fn from_snapshot(snapshot: &Snapshot) -> Self {
        Self {
            batches: snapshot.batches.len(),
            students: snapshot.students.len(),
            sessions: snapshot.attendance.values().map(|days| days.len()).sum(),
        }
    }
}

pub fn overview(overview: &Overview) -> String {
    format!(
        "{} batches, {} students, {} recorded sessions\nRun `classcheck --help` for commands",
        overview.batches, overview.students, overview.sessions
    )
}

// ── Tests ─────────────────────────────────────────────────────────────────────
