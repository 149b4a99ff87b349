mod config;
pub mod database;
mod queue_file;

pub use config::{ChainConfig, ClockConfig, EngineConfig, QueueConfig, SnoozeConfig};
pub use database::Database;
pub use queue_file::FileQueueStore;

use std::path::PathBuf;

/// Returns `~/.config/alarmchain[-dev]/` based on ALARMCHAIN_ENV.
///
/// Set ALARMCHAIN_ENV=dev to use the development data directory.
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> std::io::Result<PathBuf> {
    let base_dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config");

    let env = std::env::var("ALARMCHAIN_ENV").unwrap_or_else(|_| "production".to_string());

    let dir = if env == "dev" {
        base_dir.join("alarmchain-dev")
    } else {
        base_dir.join("alarmchain")
    };

    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}
