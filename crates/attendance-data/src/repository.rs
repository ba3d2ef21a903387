//! Typed read/modify/write access to the three attendance documents.
//!
//! Every operation re-reads the documents it needs from the store, applies
//! the change in memory and writes the whole document back. An absent key
//! reads as an empty collection.

use std::collections::HashSet;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use attendance_core::error::{AttendanceError, Result};
use attendance_core::models::{
    AttendanceBook, AttendanceEntry, AttendanceStatus, Batch, Schedule, Snapshot, Student,
};
use attendance_core::time_utils::parse_date;

use crate::store::KeyValueStore;

pub const BATCHES_KEY: &str = "batches";
pub const STUDENTS_KEY: &str = "students";
pub const ATTENDANCE_KEY: &str = "attendance";

// ── Inputs ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct NewBatch {
    pub name: String,
    pub description: Option<String>,
    pub schedule: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct NewStudent {
    pub name: String,
    pub roll_number: String,
    pub batch: String,
    pub contact_number: Option<String>,
}

/// Partial update; `None` leaves a field unchanged. An empty
/// `contact_number` clears it.
#[derive(Debug, Clone, Default)]
pub struct StudentPatch {
    pub name: Option<String>,
    pub roll_number: Option<String>,
    pub batch: Option<String>,
    pub contact_number: Option<String>,
}

/// One roster line of a `(batch, date)` session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionRow {
    pub student: Student,
    pub status: Option<AttendanceStatus>,
}

/// Set the status of `student_id` within `rows`.
pub fn set_row_status(
    rows: &mut [SessionRow],
    student_id: &str,
    status: Option<AttendanceStatus>,
) -> Result<()> {
    let row = rows
        .iter_mut()
        .find(|row| row.student.id == student_id)
        .ok_or_else(|| AttendanceError::student_not_found(student_id))?;
    row.status = status;
    Ok(())
}

// ── AttendanceRepository ──────────────────────────────────────────────────────

pub struct AttendanceRepository<S: KeyValueStore> {
    store: S,
}

impl<S: KeyValueStore> AttendanceRepository<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_inner(self) -> S {
        self.store
    }

    // ── Reads ─────────────────────────────────────────────────────────────

    pub fn batches(&self) -> Result<Vec<Batch>> {
        self.load(BATCHES_KEY)
    }

    pub fn students(&self) -> Result<Vec<Student>> {
        self.load(STUDENTS_KEY)
    }

    pub fn attendance(&self) -> Result<AttendanceBook> {
        self.load(ATTENDANCE_KEY)
    }

    /// Everything in the store, for the aggregator.
    pub fn snapshot(&self) -> Result<Snapshot> {
        Ok(Snapshot {
            batches: self.batches()?,
            students: self.students()?,
            attendance: self.attendance()?,
        })
    }

    // ── Batches ───────────────────────────────────────────────────────────

    pub fn create_batch(&mut self, new: NewBatch) -> Result<Batch> {
        let name = required(&new.name, "batch name")?;
        let batch = Batch {
            id: Uuid::new_v4().to_string(),
            name,
            description: optional(new.description),
            schedule: optional(new.schedule).map(Schedule::Text),
        };

        let mut batches = self.batches()?;
        batches.push(batch.clone());
        self.save(BATCHES_KEY, &batches)?;

        info!(id = %batch.id, name = %batch.name, "batch created");
        Ok(batch)
    }

    /// Remove a batch. Students and attendance that reference it are kept.
    pub fn delete_batch(&mut self, id: &str) -> Result<Batch> {
        let mut batches = self.batches()?;
        let index = batches
            .iter()
            .position(|b| b.id == id)
            .ok_or_else(|| AttendanceError::batch_not_found(id))?;
        let removed = batches.remove(index);
        self.save(BATCHES_KEY, &batches)?;

        let dangling = self.students()?.iter().filter(|s| s.batch == id).count();
        if dangling > 0 {
            warn!(
                "Batch {} deleted while {} student(s) still reference it",
                id, dangling
            );
        }
        info!(id = %removed.id, "batch deleted");
        Ok(removed)
    }

    // ── Students ──────────────────────────────────────────────────────────

    pub fn create_student(&mut self, new: NewStudent) -> Result<Student> {
        let name = required(&new.name, "student name")?;
        let roll_number = required(&new.roll_number, "roll number")?;
        let batch = self.existing_batch_id(&new.batch)?;

        let student = Student {
            id: Uuid::new_v4().to_string(),
            name,
            roll_number,
            batch,
            contact_number: optional(new.contact_number),
        };

        let mut students = self.students()?;
        students.push(student.clone());
        self.save(STUDENTS_KEY, &students)?;

        info!(id = %student.id, batch = %student.batch, "student created");
        Ok(student)
    }

    /// Apply `patch` to a student. Past attendance keeps the batch it was
    /// recorded under.
    pub fn update_student(&mut self, id: &str, patch: StudentPatch) -> Result<Student> {
        let batch = match patch.batch.as_deref() {
            Some(batch_id) => Some(self.existing_batch_id(batch_id)?),
            None => None,
        };

        let mut students = self.students()?;
        let student = students
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| AttendanceError::student_not_found(id))?;

        if let Some(name) = patch.name.as_deref() {
            student.name = required(name, "student name")?;
        }
        if let Some(roll) = patch.roll_number.as_deref() {
            student.roll_number = required(roll, "roll number")?;
        }
        if let Some(batch) = batch {
            student.batch = batch;
        }
        if let Some(contact) = patch.contact_number {
            student.contact_number = optional(Some(contact));
        }

        let updated = student.clone();
        self.save(STUDENTS_KEY, &students)?;

        info!(id = %updated.id, "student updated");
        Ok(updated)
    }

    /// Remove a student from the roster. Saved sessions keep their entries.
    pub fn delete_student(&mut self, id: &str) -> Result<Student> {
        let mut students = self.students()?;
        let index = students
            .iter()
            .position(|s| s.id == id)
            .ok_or_else(|| AttendanceError::student_not_found(id))?;
        let removed = students.remove(index);
        self.save(STUDENTS_KEY, &students)?;

        info!(id = %removed.id, "student deleted");
        Ok(removed)
    }

    // ── Attendance ────────────────────────────────────────────────────────

    /// The batch's current roster joined with the statuses saved for `date`.
    ///
    /// Students with no saved entry for that day come back unmarked.
    pub fn session(&self, batch_id: &str, date: &str) -> Result<Vec<SessionRow>> {
        parse_date(date)?;
        self.existing_batch_id(batch_id)?;

        let attendance = self.attendance()?;
        let saved = attendance
            .get(batch_id)
            .and_then(|days| days.get(date))
            .map(Vec::as_slice)
            .unwrap_or_default();

        let rows = self
            .students()?
            .into_iter()
            .filter(|s| s.batch == batch_id)
            .map(|student| {
                let status = saved
                    .iter()
                    .find(|e| e.student_id == student.id)
                    .and_then(|e| e.status);
                SessionRow { student, status }
            })
            .collect();
        Ok(rows)
    }

    /// Replace the whole `(batch, date)` session with `rows`.
    ///
    /// Never merges with what was saved before; the last save wins.
    pub fn save_session(&mut self, batch_id: &str, date: &str, rows: &[SessionRow]) -> Result<()> {
        parse_date(date)?;
        self.existing_batch_id(batch_id)?;

        let mut seen = HashSet::new();
        for row in rows {
            if !seen.insert(row.student.id.as_str()) {
                return Err(AttendanceError::DuplicateStudent(row.student.id.clone()));
            }
        }

        let entries: Vec<AttendanceEntry> = rows
            .iter()
            .map(|row| AttendanceEntry::for_student(&row.student, row.status))
            .collect();

        let mut attendance = self.attendance()?;
        attendance
            .entry(batch_id.to_string())
            .or_default()
            .insert(date.to_string(), entries);
        self.save(ATTENDANCE_KEY, &attendance)?;

        info!(batch = %batch_id, date = %date, rows = rows.len(), "attendance saved");
        Ok(())
    }

    /// Delete every saved session.
    pub fn clear_attendance(&mut self) -> Result<()> {
        self.store.remove(ATTENDANCE_KEY)?;
        info!("attendance records cleared");
        Ok(())
    }

    // ── Private helpers ───────────────────────────────────────────────────

    fn load<T: DeserializeOwned + Default>(&self, key: &str) -> Result<T> {
        match self.store.get(key)? {
            None => {
                debug!("No value stored under \"{}\"; using empty", key);
                Ok(T::default())
            }
            Some(raw) if raw.trim().is_empty() => Ok(T::default()),
            Some(raw) => serde_json::from_str(&raw).map_err(|source| AttendanceError::Corrupt {
                key: key.to_string(),
                source,
            }),
        }
    }

    fn save<T: Serialize>(&mut self, key: &str, value: &T) -> Result<()> {
        let json = serde_json::to_string(value)?;
        self.store.set(key, &json)
    }

    fn existing_batch_id(&self, batch_id: &str) -> Result<String> {
        let batch_id = batch_id.trim();
        if self.batches()?.iter().any(|b| b.id == batch_id) {
            Ok(batch_id.to_string())
        } else {
            Err(AttendanceError::batch_not_found(batch_id))
        }
    }
}

/// Trimmed, non-empty value of a required field.
fn required(value: &str, field: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AttendanceError::Validation(format!("{} is required", field)));
    }
    Ok(trimmed.to_string())
}

/// Trimmed value, or `None` when missing or blank.
fn optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::AttendanceAggregator;
    use crate::store::{FileStore, MemoryStore};
    use attendance_core::models::AttendanceStatus::{Absent, Late, Present};
    use tempfile::TempDir;

    type Repo = AttendanceRepository<MemoryStore>;

    fn repo() -> Repo {
        AttendanceRepository::new(MemoryStore::new())
    }

    fn add_batch(repo: &mut Repo, name: &str) -> Batch {
        repo.create_batch(NewBatch {
            name: name.to_string(),
            ..Default::default()
        })
        .unwrap()
    }

    fn add_student(repo: &mut Repo, name: &str, roll: &str, batch: &str) -> Student {
        repo.create_student(NewStudent {
            name: name.to_string(),
            roll_number: roll.to_string(),
            batch: batch.to_string(),
            contact_number: None,
        })
        .unwrap()
    }

    // ── reads ─────────────────────────────────────────────────────────────────

    #[test]
    fn test_absent_keys_read_as_empty() {
        let repo = repo();
        assert_eq!(repo.snapshot().unwrap(), Snapshot::default());
    }

    #[test]
    fn test_corrupt_value_is_an_error() {
        let mut store = MemoryStore::new();
        store.set(STUDENTS_KEY, "[{\"_id\":").unwrap();
        let repo = AttendanceRepository::new(store);
        let err = repo.students().unwrap_err();
        assert!(matches!(err, AttendanceError::Corrupt { key, .. } if key == "students"));
    }

    #[test]
    fn test_reads_documents_in_stored_shape() {
        let mut store = MemoryStore::new();
        store
            .set(BATCHES_KEY, r#"[{"_id":"b1","name":"Batch A","description":"Morning"}]"#)
            .unwrap();
        store
            .set(
                STUDENTS_KEY,
                r#"[{"_id":"s1","name":"Aditi","rollNumber":1,"batch":"b1"}]"#,
            )
            .unwrap();
        store
            .set(
                ATTENDANCE_KEY,
                r#"{"b1":{"2025-03-05":[{"_id":"s1","name":"Aditi","rollNumber":"1","status":"LATE"}]}}"#,
            )
            .unwrap();

        let snapshot = AttendanceRepository::new(store).snapshot().unwrap();
        assert_eq!(snapshot.batches[0].description.as_deref(), Some("Morning"));
        assert_eq!(snapshot.students[0].roll_number, "1");
        assert_eq!(
            snapshot.attendance["b1"]["2025-03-05"][0].status,
            Some(Late)
        );
    }

    // ── batches ───────────────────────────────────────────────────────────────

    #[test]
    fn test_create_batch_trims_and_assigns_id() {
        let mut repo = repo();
        let batch = repo
            .create_batch(NewBatch {
                name: "  Batch A ".to_string(),
                description: Some("   ".to_string()),
                schedule: Some("Mon-Fri 5-7 PM".to_string()),
            })
            .unwrap();

        assert_eq!(batch.name, "Batch A");
        assert!(batch.description.is_none());
        assert_eq!(batch.schedule, Some(Schedule::Text("Mon-Fri 5-7 PM".to_string())));
        assert!(Uuid::parse_str(&batch.id).is_ok());
        assert_eq!(repo.batches().unwrap(), vec![batch]);
    }

    #[test]
    fn test_create_batch_requires_name() {
        let mut repo = repo();
        let err = repo
            .create_batch(NewBatch {
                name: "   ".to_string(),
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, AttendanceError::Validation(_)));
        assert!(repo.batches().unwrap().is_empty());
    }

    #[test]
    fn test_delete_batch_does_not_cascade() {
        let mut repo = repo();
        let batch = add_batch(&mut repo, "Batch A");
        let student = add_student(&mut repo, "Aditi", "1", &batch.id);
        let rows = repo.session(&batch.id, "2025-03-05").unwrap();
        repo.save_session(&batch.id, "2025-03-05", &rows).unwrap();

        let removed = repo.delete_batch(&batch.id).unwrap();
        assert_eq!(removed.id, batch.id);
        assert!(repo.batches().unwrap().is_empty());
        assert_eq!(repo.students().unwrap()[0].id, student.id);
        assert!(repo.attendance().unwrap().contains_key(&batch.id));
    }

    #[test]
    fn test_delete_unknown_batch() {
        let mut repo = repo();
        let err = repo.delete_batch("missing").unwrap_err();
        assert!(matches!(err, AttendanceError::NotFound { kind: "Batch", .. }));
    }

    // ── students ──────────────────────────────────────────────────────────────

    #[test]
    fn test_create_student_requires_existing_batch() {
        let mut repo = repo();
        let err = repo
            .create_student(NewStudent {
                name: "Aditi".to_string(),
                roll_number: "1".to_string(),
                batch: "nope".to_string(),
                contact_number: None,
            })
            .unwrap_err();
        assert!(matches!(err, AttendanceError::NotFound { kind: "Batch", .. }));
    }

    #[test]
    fn test_create_student_requires_roll_number() {
        let mut repo = repo();
        let batch = add_batch(&mut repo, "Batch A");
        let err = repo
            .create_student(NewStudent {
                name: "Aditi".to_string(),
                roll_number: " ".to_string(),
                batch: batch.id,
                contact_number: None,
            })
            .unwrap_err();
        assert!(matches!(err, AttendanceError::Validation(msg) if msg.contains("roll number")));
    }

    #[test]
    fn test_update_student_partial_fields() {
        let mut repo = repo();
        let a = add_batch(&mut repo, "Batch A");
        let b = add_batch(&mut repo, "Batch B");
        let student = repo
            .create_student(NewStudent {
                name: "Aditi".to_string(),
                roll_number: "1".to_string(),
                batch: a.id.clone(),
                contact_number: Some("555-0100".to_string()),
            })
            .unwrap();

        let updated = repo
            .update_student(
                &student.id,
                StudentPatch {
                    batch: Some(b.id.clone()),
                    contact_number: Some(String::new()),
                    ..Default::default()
                },
            )
            .unwrap();

        assert_eq!(updated.name, "Aditi");
        assert_eq!(updated.batch, b.id);
        assert!(updated.contact_number.is_none());
        assert_eq!(repo.students().unwrap(), vec![updated]);
    }

    #[test]
    fn test_update_student_rejects_unknown_batch_without_writing() {
        let mut repo = repo();
        let a = add_batch(&mut repo, "Batch A");
        let student = add_student(&mut repo, "Aditi", "1", &a.id);

        let err = repo
            .update_student(
                &student.id,
                StudentPatch {
                    batch: Some("ghost".to_string()),
                    name: Some("Renamed".to_string()),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, AttendanceError::NotFound { .. }));
        assert_eq!(repo.students().unwrap()[0].name, "Aditi");
    }

    #[test]
    fn test_delete_student_keeps_history() {
        let mut repo = repo();
        let batch = add_batch(&mut repo, "Batch A");
        let student = add_student(&mut repo, "Aditi", "1", &batch.id);
        let mut rows = repo.session(&batch.id, "2025-03-05").unwrap();
        set_row_status(&mut rows, &student.id, Some(Present)).unwrap();
        repo.save_session(&batch.id, "2025-03-05", &rows).unwrap();

        repo.delete_student(&student.id).unwrap();
        assert!(repo.students().unwrap().is_empty());

        let report = AttendanceAggregator::student_report(&student.id, &repo.attendance().unwrap());
        assert_eq!(report.present_count, 1);
        assert!(matches!(
            repo.delete_student(&student.id),
            Err(AttendanceError::NotFound { kind: "Student", .. })
        ));
    }

    // ── sessions ──────────────────────────────────────────────────────────────

    #[test]
    fn test_session_joins_roster_with_saved_statuses() {
        let mut repo = repo();
        let a = add_batch(&mut repo, "Batch A");
        let b = add_batch(&mut repo, "Batch B");
        let s1 = add_student(&mut repo, "Aditi", "1", &a.id);
        let _other = add_student(&mut repo, "Zed", "9", &b.id);
        let s2 = add_student(&mut repo, "Krish", "2", &a.id);

        let rows = repo.session(&a.id, "2025-03-05").unwrap();
        let ids: Vec<&str> = rows.iter().map(|r| r.student.id.as_str()).collect();
        assert_eq!(ids, vec![s1.id.as_str(), s2.id.as_str()]);
        assert!(rows.iter().all(|r| r.status.is_none()));

        let mut rows = rows;
        set_row_status(&mut rows, &s2.id, Some(Absent)).unwrap();
        repo.save_session(&a.id, "2025-03-05", &rows).unwrap();

        let reloaded = repo.session(&a.id, "2025-03-05").unwrap();
        assert_eq!(reloaded[0].status, None);
        assert_eq!(reloaded[1].status, Some(Absent));
        // Another day is untouched.
        assert!(repo
            .session(&a.id, "2025-03-06")
            .unwrap()
            .iter()
            .all(|r| r.status.is_none()));
    }

    #[test]
    fn test_save_session_replaces_whole_entry() {
        let mut repo = repo();
        let batch = add_batch(&mut repo, "Batch A");
        let s1 = add_student(&mut repo, "Aditi", "1", &batch.id);
        let s2 = add_student(&mut repo, "Krish", "2", &batch.id);

        let mut rows = repo.session(&batch.id, "2025-03-05").unwrap();
        set_row_status(&mut rows, &s1.id, Some(Present)).unwrap();
        set_row_status(&mut rows, &s2.id, Some(Late)).unwrap();
        repo.save_session(&batch.id, "2025-03-05", &rows).unwrap();

        // Second save with only s2 drops s1 entirely.
        let only_s2: Vec<SessionRow> = rows
            .into_iter()
            .filter(|r| r.student.id == s2.id)
            .map(|r| SessionRow {
                status: Some(Absent),
                ..r
            })
            .collect();
        repo.save_session(&batch.id, "2025-03-05", &only_s2).unwrap();

        let book = repo.attendance().unwrap();
        let entries = &book[&batch.id]["2025-03-05"];
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].student_id, s2.id);
        assert_eq!(entries[0].status, Some(Absent));
    }

    #[test]
    fn test_save_session_then_summary_matches_saved_statuses() {
        let mut repo = repo();
        let batch = add_batch(&mut repo, "Batch A");
        let statuses = [Some(Present), Some(Present), Some(Late), Some(Absent), None];
        let students: Vec<Student> = (0..statuses.len())
            .map(|i| add_student(&mut repo, &format!("S{}", i), &i.to_string(), &batch.id))
            .collect();

        let rows: Vec<SessionRow> = students
            .into_iter()
            .zip(statuses)
            .map(|(student, status)| SessionRow { student, status })
            .collect();
        repo.save_session(&batch.id, "2025-03-05", &rows).unwrap();

        let tally =
            AttendanceAggregator::batch_summary(&batch.id, "2025-03-05", &repo.attendance().unwrap())
                .unwrap();
        assert_eq!((tally.present, tally.absent, tally.late, tally.unmarked), (2, 1, 1, 1));
        assert_eq!(tally.total() as usize, rows.len());
    }

    #[test]
    fn test_save_session_rejects_duplicates_and_bad_input() {
        let mut repo = repo();
        let batch = add_batch(&mut repo, "Batch A");
        let student = add_student(&mut repo, "Aditi", "1", &batch.id);
        let row = SessionRow {
            student,
            status: Some(Present),
        };

        let err = repo
            .save_session(&batch.id, "2025-03-05", &[row.clone(), row.clone()])
            .unwrap_err();
        assert!(matches!(err, AttendanceError::DuplicateStudent(_)));

        let err = repo
            .save_session(&batch.id, "2025-3-5", std::slice::from_ref(&row))
            .unwrap_err();
        assert!(matches!(err, AttendanceError::InvalidDate(_)));

        let err = repo
            .save_session("ghost", "2025-03-05", std::slice::from_ref(&row))
            .unwrap_err();
        assert!(matches!(err, AttendanceError::NotFound { .. }));

        assert!(repo.attendance().unwrap().is_empty());
    }

    #[test]
    fn test_set_row_status_unknown_student() {
        let mut rows: Vec<SessionRow> = Vec::new();
        let err = set_row_status(&mut rows, "s1", Some(Present)).unwrap_err();
        assert!(matches!(err, AttendanceError::NotFound { kind: "Student", .. }));
    }

    #[test]
    fn test_clear_attendance_removes_every_session() {
        let mut repo = repo();
        let batch = add_batch(&mut repo, "Batch A");
        add_student(&mut repo, "Aditi", "1", &batch.id);
        let rows = repo.session(&batch.id, "2025-03-05").unwrap();
        repo.save_session(&batch.id, "2025-03-05", &rows).unwrap();

        repo.clear_attendance().unwrap();
        assert!(repo.attendance().unwrap().is_empty());
        assert_eq!(repo.store().get(ATTENDANCE_KEY).unwrap(), None);
        assert_eq!(repo.batches().unwrap().len(), 1);
    }

    // ── file-backed ───────────────────────────────────────────────────────────

    #[test]
    fn test_file_backed_repository_round_trip() {
        let tmp = TempDir::new().expect("tempdir");
        let batch_id = {
            let mut repo = AttendanceRepository::new(FileStore::open(tmp.path()).unwrap());
            let batch = repo
                .create_batch(NewBatch {
                    name: "Batch A".to_string(),
                    ..Default::default()
                })
                .unwrap();
            let student = repo
                .create_student(NewStudent {
                    name: "Aditi".to_string(),
                    roll_number: "1".to_string(),
                    batch: batch.id.clone(),
                    contact_number: None,
                })
                .unwrap();
            let mut rows = repo.session(&batch.id, "2025-03-05").unwrap();
            set_row_status(&mut rows, &student.id, Some(Late)).unwrap();
            repo.save_session(&batch.id, "2025-03-05", &rows).unwrap();
            batch.id
        };

        let repo = AttendanceRepository::new(FileStore::open(tmp.path()).unwrap());
        let snapshot = repo.snapshot().unwrap();
        assert_eq!(snapshot.batches.len(), 1);
        assert_eq!(snapshot.students.len(), 1);
        let tally =
            AttendanceAggregator::batch_summary(&batch_id, "2025-03-05", &snapshot.attendance)
                .unwrap();
        assert_eq!(tally.late, 1);
        assert_eq!(
            repo.into_inner().keys().unwrap(),
            vec![ATTENDANCE_KEY, BATCHES_KEY, STUDENTS_KEY]
        );
    }
}
