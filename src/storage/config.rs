//! JSON Configuration Management
//!
//! Reads and writes the settings file. A missing file is not an error: the
//! service falls back to defaults and only writes once asked to save.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::models::settings::{PipelineSettings, SettingsUpdate};
use crate::utils::error::{AppError, AppResult};
use crate::utils::paths::{config_path, ensure_dir};

/// Configuration service for the pipeline settings
#[derive(Debug)]
pub struct ConfigService {
    config_path: PathBuf,
    config: PipelineSettings,
}

impl ConfigService {
    /// Load from the default location
    pub fn new() -> AppResult<Self> {
        Self::open(config_path()?)
    }

    /// Load from an explicit path, using defaults when the file does not exist
    pub fn open(path: impl Into<PathBuf>) -> AppResult<Self> {
        let config_path = path.into();
        let config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            debug!(path = %config_path.display(), "no settings file, using defaults");
            PipelineSettings::default()
        };

        Ok(Self {
            config_path,
            config,
        })
    }

    /// Load settings from a file
    fn load_from_file(path: &Path) -> AppResult<PipelineSettings> {
        let content = fs::read_to_string(path)?;
        let config: PipelineSettings = serde_json::from_str(&content)?;
        config.validate().map_err(AppError::validation)?;
        Ok(config)
    }

    /// Save settings to a file with pretty formatting
    fn save_to_file(path: &Path, config: &PipelineSettings) -> AppResult<()> {
        config.validate().map_err(AppError::validation)?;
        if let Some(parent) = path.parent() {
            ensure_dir(parent)?;
        }
        let content = serde_json::to_string_pretty(config)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Get the current settings
    pub fn get_config(&self) -> &PipelineSettings {
        &self.config
    }

    /// Settings with the environment override applied
    pub fn effective_config(&self) -> AppResult<PipelineSettings> {
        let mut config = self.config.clone();
        config.apply_env();
        config.validate().map_err(AppError::config)?;
        Ok(config)
    }

    pub fn path(&self) -> &Path {
        &self.config_path
    }

    /// Update the settings with a partial update and persist them
    pub fn update_config(&mut self, update: SettingsUpdate) -> AppResult<PipelineSettings> {
        let mut next = self.config.clone();
        next.apply_update(update);
        Self::save_to_file(&self.config_path, &next)?;
        self.config = next;
        Ok(self.config.clone())
    }

    /// Save the current settings to disk
    pub fn save(&self) -> AppResult<()> {
        Self::save_to_file(&self.config_path, &self.config)
    }

    /// Reload settings from disk
    pub fn reload(&mut self) -> AppResult<()> {
        self.config = Self::load_from_file(&self.config_path)?;
        Ok(())
    }

    /// Reset settings to defaults
    pub fn reset(&mut self) -> AppResult<()> {
        self.config = PipelineSettings::default();
        self.save()
    }
}
