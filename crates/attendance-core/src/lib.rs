//! Core types for ClassCheck.
//!
//! Holds the batch, student and attendance data model, the shared error
//! type, percentage arithmetic, date helpers, display formatting and the
//! command-line settings.

pub mod calculations;
pub mod error;
pub mod formatting;
pub mod models;
pub mod settings;
pub mod time_utils;

pub use error::{AttendanceError, Result};
