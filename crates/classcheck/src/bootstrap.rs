use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::Context;
use attendance_core::settings::APP_DIR_NAME;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

// ── Directory bootstrap ────────────────────────────────────────────────────────

/// Ensure the standard `~/.classcheck/` directory hierarchy exists.
///
/// Creates the following directories if absent (including any missing parents):
/// - `~/.classcheck/`
/// - `~/.classcheck/logs/`
///
/// The data directory is created by the store when it is opened, since it
/// may live elsewhere (`--data-dir`).
pub fn ensure_directories() -> anyhow::Result<PathBuf> {
    let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
    ensure_directories_in(&home)
}

fn ensure_directories_in(home: &Path) -> anyhow::Result<PathBuf> {
    let app_dir = home.join(APP_DIR_NAME);
    std::fs::create_dir_all(app_dir.join("logs"))
        .with_context(|| format!("creating {}", app_dir.display()))?;
    Ok(app_dir)
}

// ── Logging bootstrap ──────────────────────────────────────────────────────────

/// Map a CLI log-level name to an [`EnvFilter`] directive.
///
/// Unrecognised names are passed through so that full directives such as
/// `attendance_data=debug` still work.
fn level_directive(log_level: &str) -> String {
    match log_level.to_uppercase().as_str() {
        "DEBUG" => "debug".to_string(),
        "INFO" => "info".to_string(),
        "WARNING" => "warn".to_string(),
        "ERROR" | "CRITICAL" => "error".to_string(),
        _ => log_level.to_string(),
    }
}

/// Initialise the global `tracing` subscriber.
///
/// Output goes to stderr, or is appended to `log_file` (without ANSI colours)
/// when one is given. Falls back to `"warn"` if the level is not a valid
/// filter directive.
pub fn setup_logging(log_level: &str, log_file: Option<&PathBuf>) -> anyhow::Result<()> {
    let filter =
        EnvFilter::try_new(level_directive(log_level)).unwrap_or_else(|_| EnvFilter::new("warn"));

    let file_layer = match log_file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("creating {}", parent.display()))?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("opening log file {}", path.display()))?;
            Some(
                fmt::layer()
                    .with_writer(Mutex::new(file))
                    .with_ansi(false)
                    .with_target(false),
            )
        }
        None => None,
    };

    let stderr_layer = file_layer.is_none().then(|| {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_thread_ids(false)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();

    Ok(())
}

// ── Tests ──────────────────────────────────────────────────────────────────────
