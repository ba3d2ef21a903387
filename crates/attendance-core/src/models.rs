use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::AttendanceError;

/// Status assigned to one student for one `(batch, date)` session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AttendanceStatus {
    Present,
    Absent,
    Late,
}

impl AttendanceStatus {
    /// Stored (wire) spelling, e.g. `"PRESENT"`.
    pub fn as_str(self) -> &'static str {
        match self {
            AttendanceStatus::Present => "PRESENT",
            AttendanceStatus::Absent => "ABSENT",
            AttendanceStatus::Late => "LATE",
        }
    }

    /// Human-readable label, e.g. `"Present"`.
    pub fn label(self) -> &'static str {
        match self {
            AttendanceStatus::Present => "Present",
            AttendanceStatus::Absent => "Absent",
            AttendanceStatus::Late => "Late",
        }
    }

    /// Interpret a stored status string.
    ///
    /// Anything other than the three stored spellings (including `""`) is
    /// treated as "not marked" rather than an error.
    pub fn from_stored(raw: &str) -> Option<AttendanceStatus> {
        match raw.trim() {
            "PRESENT" => Some(AttendanceStatus::Present),
            "ABSENT" => Some(AttendanceStatus::Absent),
            "LATE" => Some(AttendanceStatus::Late),
            _ => None,
        }
    }
}

impl fmt::Display for AttendanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Case-insensitive parsing of user input: `present`, `p`, `ABSENT`, `l`, ...
impl FromStr for AttendanceStatus {
    type Err = AttendanceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "present" | "p" => Ok(AttendanceStatus::Present),
            "absent" | "a" => Ok(AttendanceStatus::Absent),
            "late" | "l" => Ok(AttendanceStatus::Late),
            _ => Err(AttendanceError::InvalidStatus(s.to_string())),
        }
    }
}

/// When a batch meets. Older documents store free text, newer ones a
/// `{ "time": ... }` object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Schedule {
    Text(String),
    Structured { time: String },
}

impl Schedule {
    pub fn describe(&self) -> &str {
        match self {
            Schedule::Text(text) => text,
            Schedule::Structured { time } => time,
        }
    }
}

/// A class or cohort that shares an attendance schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Batch {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<Schedule>,
}

/// A student on the roster. `batch` is a weak reference to [`Batch::id`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    /// Free-form roll number; not guaranteed numeric or unique.
    #[serde(default, deserialize_with = "string_or_number")]
    pub roll_number: String,
    #[serde(default)]
    pub batch: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_number: Option<String>,
}

/// One student's mark inside a `(batch, date)` session.
///
/// `name` and `roll_number` are copied from the roster at save time so the
/// session stays readable after the student is edited or removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceEntry {
    #[serde(rename = "_id")]
    pub student_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, deserialize_with = "string_or_number")]
    pub roll_number: String,
    #[serde(default, with = "status_field")]
    pub status: Option<AttendanceStatus>,
}

impl AttendanceEntry {
    pub fn for_student(student: &Student, status: Option<AttendanceStatus>) -> Self {
        Self {
            student_id: student.id.clone(),
            name: student.name.clone(),
            roll_number: student.roll_number.clone(),
            status,
        }
    }
}

/// Batch id → date (`YYYY-MM-DD`) → ordered session entries.
pub type AttendanceBook = BTreeMap<String, BTreeMap<String, Vec<AttendanceEntry>>>;

/// Fully materialized copy of everything in the store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub batches: Vec<Batch>,
    pub students: Vec<Student>,
    pub attendance: AttendanceBook,
}

impl Snapshot {
    pub fn batch(&self, id: &str) -> Option<&Batch> {
        self.batches.iter().find(|b| b.id == id)
    }

    pub fn student(&self, id: &str) -> Option<&Student> {
        self.students.iter().find(|s| s.id == id)
    }

    /// Students currently enrolled in `batch_id`, in roster order.
    pub fn students_in<'a>(&'a self, batch_id: &'a str) -> impl Iterator<Item = &'a Student> + 'a {
        self.students.iter().filter(move |s| s.batch == batch_id)
    }
}

/// Accept `"21"` or `21` (older documents stored numbers).
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        serde_json::Value::Null => Ok(String::new()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number, got {}",
            other
        ))),
    }
}

/// `Option<AttendanceStatus>` stored as `"PRESENT"`, ..., or `""` when unset.
mod status_field {
    use super::AttendanceStatus;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(status: &Option<AttendanceStatus>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(status.map(AttendanceStatus::as_str).unwrap_or(""))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<AttendanceStatus>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw.as_deref().and_then(AttendanceStatus::from_stored))
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────
