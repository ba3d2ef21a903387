use std::path::PathBuf;
use thiserror::Error;

/// All errors produced by the attendance crates.
#[derive(Error, Debug)]
pub enum AttendanceError {
    /// A store file could not be read, written or renamed.
    #[error("Failed to access {path}: {source}")]
    FileAccess {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A value could not be serialized to JSON.
    #[error("Failed to serialize JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// A stored document exists but does not parse as the expected shape.
    #[error("Stored value under \"{key}\" is corrupt: {source}")]
    Corrupt {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// A store key contains characters outside `[A-Za-z0-9_-]`.
    #[error("Invalid store key: {0:?}")]
    InvalidKey(String),

    /// A date string is not in canonical `YYYY-MM-DD` form.
    #[error("Invalid date (expected YYYY-MM-DD): {0}")]
    InvalidDate(String),

    /// A status string is not one of the recognised attendance statuses.
    #[error("Invalid attendance status: {0}")]
    InvalidStatus(String),

    /// A referenced batch or student does not exist.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// The same student appears twice in one session roster.
    #[error("Student {0} appears more than once in the session roster")]
    DuplicateStudent(String),

    /// User input failed a field-level check.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Pass-through for any raw I/O error that does not carry a path.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl AttendanceError {
    pub fn batch_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "Batch",
            id: id.into(),
        }
    }

    pub fn student_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "Student",
            id: id.into(),
        }
    }
}

/// Convenience alias used throughout the attendance crates.
pub type Result<T> = std::result::Result<T, AttendanceError>;
