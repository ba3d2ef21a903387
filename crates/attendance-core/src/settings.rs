use clap::{CommandFactory, FromArgMatches, Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::models::AttendanceStatus;

/// Name of the per-user application directory under `$HOME`.
pub const APP_DIR_NAME: &str = ".classcheck";

// ── Settings (CLI) ─────────────────────────────────────────────────────────────

/// Batch attendance tracking with student reports and defaulter lists
#[derive(Parser, Debug, Clone)]
#[command(
    name = "classcheck",
    about = "Batch attendance tracking with student reports and defaulter lists",
    version
)]
pub struct Settings {
    /// Directory holding the batches, students and attendance documents
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Timezone used to decide today's date (auto-detected if not specified)
    #[arg(long, default_value = "auto")]
    pub timezone: String,

    /// Output format
    #[arg(long, default_value = "table", value_parser = ["table", "json"])]
    pub format: String,

    /// Logging level
    #[arg(long, default_value = "WARNING", value_parser = ["DEBUG", "INFO", "WARNING", "ERROR", "CRITICAL"])]
    pub log_level: String,

    /// Log file path
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,

    /// Clear saved configuration
    #[arg(long)]
    pub clear: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Create, list and delete batches
    #[command(subcommand)]
    Batch(BatchCommand),
    /// Enroll, edit and remove students
    #[command(subcommand)]
    Student(StudentCommand),
    /// Mark and review a day's attendance for a batch
    #[command(subcommand)]
    Attendance(AttendanceCommand),
    /// Student history, daily batch summary and defaulter list
    #[command(subcommand)]
    Report(ReportCommand),
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum BatchCommand {
    /// Create a batch
    Add {
        #[arg(long)]
        name: String,
        #[arg(long)]
        description: Option<String>,
        /// Free-text schedule, e.g. "Mon-Fri 5-7 PM"
        #[arg(long)]
        schedule: Option<String>,
    },
    /// List all batches
    List,
    /// Delete a batch (students and attendance are kept)
    Delete { id: String },
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum StudentCommand {
    /// Enroll a student into a batch
    Add {
        #[arg(long)]
        name: String,
        #[arg(long = "roll")]
        roll_number: String,
        #[arg(long)]
        batch: String,
        #[arg(long)]
        contact: Option<String>,
    },
    /// List students, optionally only one batch
    List {
        #[arg(long)]
        batch: Option<String>,
    },
    /// Change a student's details or batch
    Update {
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long = "roll")]
        roll_number: Option<String>,
        #[arg(long)]
        batch: Option<String>,
        #[arg(long)]
        contact: Option<String>,
    },
    /// Remove a student from the roster
    Delete { id: String },
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum AttendanceCommand {
    /// Show the batch roster with the statuses saved for a date
    Show {
        #[arg(long)]
        batch: String,
        /// Session date, YYYY-MM-DD (defaults to today)
        #[arg(long)]
        date: Option<String>,
    },
    /// Mark statuses and save the whole roster for a date
    Mark {
        #[arg(long)]
        batch: String,
        /// Session date, YYYY-MM-DD (defaults to today)
        #[arg(long)]
        date: Option<String>,
        /// Status applied to every student before individual marks
        #[arg(long, value_name = "STATUS", value_parser = parse_bulk_mark)]
        all: Option<BulkMark>,
        /// Individual mark, e.g. --set s1=present (repeatable)
        #[arg(long = "set", value_name = "ID=STATUS", value_parser = parse_status_mark)]
        marks: Vec<StatusMark>,
    },
    /// Delete every attendance record
    Clear,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum ReportCommand {
    /// Attendance percentage and history for one student
    Student { id: String },
    /// Status tally for one batch on one date
    Batch {
        #[arg(long)]
        batch: String,
        /// Session date, YYYY-MM-DD (defaults to today)
        #[arg(long)]
        date: Option<String>,
    },
    /// Students below a monthly attendance threshold
    Defaulters {
        /// Restrict to one batch (all batches when omitted)
        #[arg(long)]
        batch: Option<String>,
        /// Month, 1-12 (defaults to the current month)
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..=12))]
        month: Option<u32>,
        /// Four-digit year (defaults to the current year)
        #[arg(long, value_parser = clap::value_parser!(i32).range(1000..=9999))]
        year: Option<i32>,
        /// Threshold percentage, 0-100 (defaults to the last used value, else 75)
        #[arg(long, value_parser = clap::value_parser!(u8).range(0..=100))]
        threshold: Option<u8>,
    },
}

// ── Mark values ────────────────────────────────────────────────────────────────

/// Status given to every row by `attendance mark --all`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BulkMark(pub Option<AttendanceStatus>);

/// One `ID=STATUS` pair from `attendance mark --set`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusMark {
    pub student_id: String,
    pub status: Option<AttendanceStatus>,
}

/// Parse a status for marking; `none`, `unset` and `-` clear the mark.
pub fn parse_mark_status(raw: &str) -> Result<Option<AttendanceStatus>, String> {
    match raw.trim().to_lowercase().as_str() {
        "none" | "unset" | "-" => Ok(None),
        _ => raw
            .parse::<AttendanceStatus>()
            .map(Some)
            .map_err(|e| e.to_string()),
    }
}

fn parse_bulk_mark(raw: &str) -> Result<BulkMark, String> {
    parse_mark_status(raw).map(BulkMark)
}

fn parse_status_mark(raw: &str) -> Result<StatusMark, String> {
    let Some((id, status)) = raw.split_once('=') else {
        return Err(format!("expected ID=STATUS, got {:?}", raw));
    };
    let student_id = id.trim();
    if student_id.is_empty() {
        return Err(format!("missing student id in {:?}", raw));
    }
    Ok(StatusMark {
        student_id: student_id.to_string(),
        status: parse_mark_status(status)?,
    })
}

// ── LastUsedParams ─────────────────────────────────────────────────────────────

/// Persisted last-used parameters saved to `~/.classcheck/last_used.json`.
#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq, Eq)]
pub struct LastUsedParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threshold: Option<u8>,
}

impl LastUsedParams {
    /// Return the default path to the persisted config file.
    pub fn config_path() -> PathBuf {
        Self::config_path_in(&home_dir())
    }

    /// Return the config path rooted at `base_dir` (used for testing).
    pub fn config_path_in(base_dir: &Path) -> PathBuf {
        base_dir.join(APP_DIR_NAME).join("last_used.json")
    }

    /// Load persisted params from `path`.
    /// Returns `Default` when the file is absent or cannot be parsed.
    pub fn load_from(path: &Path) -> Self {
        let Ok(content) = std::fs::read_to_string(path) else {
            return Self::default();
        };
        serde_json::from_str(&content).unwrap_or_default()
    }

    /// Atomically write params to `path`, creating parent directories if
    /// needed.
    ///
    /// Each write goes through its own uniquely named temp file in the same
    /// directory, so concurrent runs never share a half-written file.
    pub fn save_to(&self, path: &Path) -> Result<(), std::io::Error> {
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir)?;

        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;

        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(json.as_bytes())?;
        tmp.persist(path).map_err(|e| e.error)?;

        Ok(())
    }

    /// Delete the config file at an explicit path if it exists.
    pub fn clear_at(path: &Path) -> Result<(), std::io::Error> {
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }
}

// ── Settings impl ──────────────────────────────────────────────────────────────

impl Settings {
    /// Parse CLI arguments, merge with last-used params where no explicit CLI
    /// value was provided, resolve `"auto"` values, and persist the result.
    pub fn load_with_last_used() -> Self {
        Self::load_with_last_used_impl(
            std::env::args_os().collect(),
            &LastUsedParams::config_path(),
        )
    }

    /// Full implementation; accepts args and an explicit config path so that
    /// tests can redirect to a temporary directory.
    pub fn load_with_last_used_impl(args: Vec<std::ffi::OsString>, config_path: &Path) -> Self {
        let matches = Settings::command().get_matches_from(args);
        let mut settings = Settings::from_arg_matches(&matches).unwrap_or_else(|e| e.exit());

        if settings.clear {
            let _ = LastUsedParams::clear_at(config_path);
            return Self::resolve_auto_values(settings, None);
        }

        let last = LastUsedParams::load_from(config_path);

        // CLI always wins over persisted values.
        if !is_arg_explicitly_set(&matches, "data_dir") && settings.data_dir.is_none() {
            settings.data_dir = last.data_dir.clone();
        }
        if !is_arg_explicitly_set(&matches, "timezone") {
            if let Some(v) = last.timezone.clone() {
                settings.timezone = v;
            }
        }
        if !is_arg_explicitly_set(&matches, "format") {
            if let Some(v) = last.format.clone() {
                settings.format = v;
            }
        }

        // Persist before "auto" is resolved so the next run detects again.
        let params = LastUsedParams::merged(&settings, &last);
        let _ = params.save_to(config_path);

        Self::resolve_auto_values(settings, last.threshold)
    }

    /// Resolve `"auto"` and unset values and apply the `--debug` flag.
    fn resolve_auto_values(mut settings: Settings, last_threshold: Option<u8>) -> Settings {
        if settings.timezone == "auto" {
            settings.timezone = crate::time_utils::get_system_timezone();
        }

        if settings.data_dir.is_none() {
            settings.data_dir = Some(Self::default_data_dir());
        }

        if let Some(Command::Report(ReportCommand::Defaulters { threshold, .. })) =
            settings.command.as_mut()
        {
            if threshold.is_none() {
                *threshold = Some(
                    last_threshold.unwrap_or(crate::calculations::DEFAULT_THRESHOLD_PERCENT),
                );
            }
        }

        // --debug overrides log level.
        if settings.debug {
            settings.log_level = "DEBUG".to_string();
        }

        settings
    }

    /// `~/.classcheck/data`.
    pub fn default_data_dir() -> PathBuf {
        home_dir().join(APP_DIR_NAME).join("data")
    }

    /// The resolved data directory.
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(Self::default_data_dir)
    }

    pub fn wants_json(&self) -> bool {
        self.format == "json"
    }
}

// ── Conversion ─────────────────────────────────────────────────────────────────

impl LastUsedParams {
    /// Params to persist after a run: this run's values, keeping the
    /// previous threshold unless one was given explicitly.
    fn merged(settings: &Settings, previous: &LastUsedParams) -> Self {
        let threshold = match &settings.command {
            Some(Command::Report(ReportCommand::Defaulters {
                threshold: Some(t), ..
            })) => Some(*t),
            _ => previous.threshold,
        };
        LastUsedParams {
            data_dir: settings.data_dir.clone(),
            timezone: Some(settings.timezone.clone()),
            format: Some(settings.format.clone()),
            threshold,
        }
    }
}

// ── Helpers ────────────────────────────────────────────────────────────────────

fn home_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("."))
}

/// Returns `true` when `name` was supplied explicitly on the command line
/// (not via default value or environment variable).
fn is_arg_explicitly_set(matches: &clap::ArgMatches, name: &str) -> bool {
    matches.value_source(name) == Some(clap::parser::ValueSource::CommandLine)
}

// ── Tests ──────────────────────────────────────────────────────────────────────
