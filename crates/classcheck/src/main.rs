mod bootstrap;
mod commands;
mod render;

use anyhow::Result;
use attendance_core::settings::Settings;

fn main() -> Result<()> {
    let settings = Settings::load_with_last_used();

    bootstrap::ensure_directories()?;
    bootstrap::setup_logging(&settings.log_level, settings.log_file.as_ref())?;

    tracing::info!("classcheck v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::debug!(
        "Data dir: {}, timezone: {}, format: {}",
        settings.data_dir().display(),
        settings.timezone,
        settings.format
    );

    let output = commands::run(&settings)?;
    println!("{}", output);

    Ok(())
}
