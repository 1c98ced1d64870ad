//! Cross-Platform Path Utilities
//!
//! Resolves where the settings file lives.

use std::path::{Path, PathBuf};

use crate::utils::error::{AppError, AppResult};

/// Directory name under the platform config dir
pub const APP_DIR_NAME: &str = "plan-pipeline";

/// Get the platform config directory (e.g. ~/.config on Linux)
pub fn config_dir() -> AppResult<PathBuf> {
    dirs::config_dir().ok_or_else(|| AppError::config("Could not determine config directory"))
}

/// Get the application directory (<config_dir>/plan-pipeline/)
pub fn app_dir() -> AppResult<PathBuf> {
    Ok(config_dir()?.join(APP_DIR_NAME))
}

/// Get the config file path (<config_dir>/plan-pipeline/config.json)
pub fn config_path() -> AppResult<PathBuf> {
    Ok(app_dir()?.join("config.json"))
}

/// Ensure a directory exists, creating it if necessary
pub fn ensure_dir(path: &Path) -> AppResult<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }
    Ok(())
}
