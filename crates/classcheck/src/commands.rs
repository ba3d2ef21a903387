//! Subcommand dispatch: each command runs against a repository and returns
//! the text to print.

use anyhow::{Context, Result};
use tracing::{debug, warn};

use attendance_core::calculations::DEFAULT_THRESHOLD_PERCENT;
use attendance_core::error::AttendanceError;
use attendance_core::models::{Batch, Snapshot, Student};
use attendance_core::settings::{
    AttendanceCommand, BatchCommand, BulkMark, Command, ReportCommand, Settings, StudentCommand,
};
use attendance_core::time_utils::{format_date, parse_date, Calendar};
use attendance_data::aggregator::{AttendanceAggregator, BatchScope};
use attendance_data::repository::{
    set_row_status, AttendanceRepository, NewBatch, NewStudent, StudentPatch,
};
use attendance_data::store::{FileStore, KeyValueStore};

use crate::render;

/// Open the configured data directory and run the selected command.
pub fn run(settings: &Settings) -> Result<String> {
    let data_dir = settings.data_dir();
    let store = FileStore::open(&data_dir)
        .with_context(|| format!("opening data directory {}", data_dir.display()))?;
    let mut repo = AttendanceRepository::new(store);
    let calendar = Calendar::new(&settings.timezone);

    execute(
        &mut repo,
        &calendar,
        settings.command.as_ref(),
        settings.wants_json(),
    )
}

/// Run one command. `None` prints an overview of what is stored.
pub fn execute<S: KeyValueStore>(
    repo: &mut AttendanceRepository<S>,
    calendar: &Calendar,
    command: Option<&Command>,
    json: bool,
) -> Result<String> {
    match command {
        None => {
            let snapshot = repo.snapshot()?;
            let overview = render::Overview::from_snapshot(&snapshot);
            if json {
                render::json(&overview)
            } else {
                Ok(render::overview(&overview))
            }
        }
        Some(Command::Batch(cmd)) => batch(repo, cmd, json),
        Some(Command::Student(cmd)) => student(repo, cmd, json),
        Some(Command::Attendance(cmd)) => attendance(repo, calendar, cmd, json),
        Some(Command::Report(cmd)) => report(repo, calendar, cmd, json),
    }
}

// ── batch ─────────────────────────────────────────────────────────────────────

fn batch<S: KeyValueStore>(
    repo: &mut AttendanceRepository<S>,
    cmd: &BatchCommand,
    json: bool,
) -> Result<String> {
    match cmd {
        BatchCommand::Add {
            name,
            description,
            schedule,
        } => {
            let batch = repo
                .create_batch(NewBatch {
                    name: name.clone(),
                    description: description.clone(),
                    schedule: schedule.clone(),
                })
                .context("creating batch")?;
            output(json, &batch, || render::batch_line("Created", &batch))
        }
        BatchCommand::List => {
            let batches = repo.batches()?;
            output(json, &batches, || render::batches(&batches))
        }
        BatchCommand::Delete { id } => {
            let batch = repo
                .delete_batch(id)
                .with_context(|| format!("deleting batch {}", id))?;
            output(json, &batch, || render::batch_line("Deleted", &batch))
        }
    }
}

// ── student ───────────────────────────────────────────────────────────────────

fn student<S: KeyValueStore>(
    repo: &mut AttendanceRepository<S>,
    cmd: &StudentCommand,
    json: bool,
) -> Result<String> {
    match cmd {
        StudentCommand::Add {
            name,
            roll_number,
            batch,
            contact,
        } => {
            let student = repo
                .create_student(NewStudent {
                    name: name.clone(),
                    roll_number: roll_number.clone(),
                    batch: batch.clone(),
                    contact_number: contact.clone(),
                })
                .context("enrolling student")?;
            output(json, &student, || render::student_line("Enrolled", &student))
        }
        StudentCommand::List { batch } => {
            let snapshot = repo.snapshot()?;
            let students: Vec<&Student> = snapshot
                .students
                .iter()
                .filter(|s| batch.as_deref().map_or(true, |b| s.batch == b))
                .collect();
            output(json, &students, || render::students(&students, &snapshot))
        }
        StudentCommand::Update {
            id,
            name,
            roll_number,
            batch,
            contact,
        } => {
            let student = repo
                .update_student(
                    id,
                    StudentPatch {
                        name: name.clone(),
                        roll_number: roll_number.clone(),
                        batch: batch.clone(),
                        contact_number: contact.clone(),
                    },
                )
                .with_context(|| format!("updating student {}", id))?;
            output(json, &student, || render::student_line("Updated", &student))
        }
        StudentCommand::Delete { id } => {
            let student = repo
                .delete_student(id)
                .with_context(|| format!("deleting student {}", id))?;
            output(json, &student, || render::student_line("Removed", &student))
        }
    }
}

// ── attendance ────────────────────────────────────────────────────────────────

fn attendance<S: KeyValueStore>(
    repo: &mut AttendanceRepository<S>,
    calendar: &Calendar,
    cmd: &AttendanceCommand,
    json: bool,
) -> Result<String> {
    match cmd {
        AttendanceCommand::Show { batch, date } => {
            let date = resolve_date(date.as_deref(), calendar)?;
            let batch = find_batch(repo, batch)?;
            let rows = repo.session(&batch.id, &date)?;
            output(json, &rows, || render::session(&batch, &date, &rows))
        }
        AttendanceCommand::Mark {
            batch,
            date,
            all,
            marks,
        } => {
            let date = resolve_date(date.as_deref(), calendar)?;
            let batch = find_batch(repo, batch)?;
            let mut rows = repo.session(&batch.id, &date)?;
            if rows.is_empty() {
                warn!("Batch {} has no students; saving an empty session", batch.id);
            }

            if let Some(BulkMark(status)) = all {
                for row in rows.iter_mut() {
                    row.status = *status;
                }
            }
            for mark in marks {
                set_row_status(&mut rows, &mark.student_id, mark.status)
                    .with_context(|| format!("student {} is not in {}", mark.student_id, batch.name))?;
            }

            repo.save_session(&batch.id, &date, &rows)
                .context("saving attendance")?;
            output(json, &rows, || render::session(&batch, &date, &rows))
        }
        AttendanceCommand::Clear => {
            repo.clear_attendance()?;
            if json {
                render::json(&serde_json::json!({ "cleared": true }))
            } else {
                Ok("Cleared all attendance records".to_string())
            }
        }
    }
}

// ── report ────────────────────────────────────────────────────────────────────

fn report<S: KeyValueStore>(
    repo: &AttendanceRepository<S>,
    calendar: &Calendar,
    cmd: &ReportCommand,
    json: bool,
) -> Result<String> {
    match cmd {
        ReportCommand::Student { id } => {
            let snapshot = repo.snapshot()?;
            let report = AttendanceAggregator::student_report(id, &snapshot.attendance);
            if snapshot.student(id).is_none() && report.history.is_empty() {
                return Err(AttendanceError::student_not_found(id.as_str()).into());
            }
            output(json, &report, || render::student_report(id, &report, &snapshot))
        }
        ReportCommand::Batch { batch, date } => {
            let date = resolve_date(date.as_deref(), calendar)?;
            let snapshot = repo.snapshot()?;
            let batch = report_batch(&snapshot, batch)?;
            let summary =
                AttendanceAggregator::batch_summary(&batch.id, &date, &snapshot.attendance);
            output(json, &summary, || {
                render::batch_summary(&batch, &date, summary.as_ref())
            })
        }
        ReportCommand::Defaulters {
            batch,
            month,
            year,
            threshold,
        } => {
            let (current_month, current_year) = calendar.current_month_year();
            let month = month.unwrap_or(current_month);
            let year = year.unwrap_or(current_year);
            let threshold = threshold.unwrap_or(DEFAULT_THRESHOLD_PERCENT);

            let snapshot = repo.snapshot()?;
            if let Some(batch_id) = batch {
                report_batch(&snapshot, batch_id)?;
            }
            let scope = BatchScope::from_option(batch.clone());
            debug!(
                "Defaulters for {:?} in {:02}/{} below {}%",
                scope, month, year, threshold
            );
            let entries = AttendanceAggregator::defaulters(
                &scope,
                month,
                year,
                threshold,
                &snapshot.students,
                &snapshot.attendance,
            );
            output(json, &entries, || {
                render::defaulters(&entries, month, year, threshold, &snapshot)
            })
        }
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn output<T, F>(json: bool, value: &T, text: F) -> Result<String>
where
    T: serde::Serialize + ?Sized,
    F: FnOnce() -> String,
{
    if json {
        render::json(value)
    } else {
        Ok(text())
    }
}

/// Canonical date key for `--date`, or today in the configured timezone.
fn resolve_date(date: Option<&str>, calendar: &Calendar) -> Result<String> {
    match date {
        Some(raw) => Ok(format_date(parse_date(raw)?)),
        None => Ok(calendar.today_key()),
    }
}

fn find_batch<S: KeyValueStore>(repo: &AttendanceRepository<S>, id: &str) -> Result<Batch> {
    repo.batches()?
        .into_iter()
        .find(|b| b.id == id)
        .ok_or_else(|| AttendanceError::batch_not_found(id).into())
}

/// Batch to report on. A deleted batch whose sessions or students remain is
/// still reportable, shown under its id.
fn report_batch(snapshot: &Snapshot, id: &str) -> Result<Batch> {
    if let Some(batch) = snapshot.batch(id) {
        return Ok(batch.clone());
    }
    let referenced =
        snapshot.attendance.contains_key(id) || snapshot.students_in(id).next().is_some();
    if !referenced {
        return Err(AttendanceError::batch_not_found(id).into());
    }
    warn!("Batch {} was deleted; reporting on its remaining records", id);
    Ok(Batch {
        id: id.to_string(),
        name: id.to_string(),
        description: None,
        schedule: None,
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
