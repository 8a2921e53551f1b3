//! Settings file of the application
//!
//! One TOML file with a table per subsystem. Missing keys fall back to their
//! defaults, a missing file is created with the defaults on first start.

use crate::controller::controller_handle::ControllerSettings;
use crate::dispatch::OutputConfig;
use crate::translator::JoystickConfig;
use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const CONFIG_DIR: &str = "stagepad";
const CONFIG_FILE: &str = "config.toml";
const CONFIG_ENV: &str = "STAGEPAD_CONFIG";

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub controller: ControllerSettings,
    pub joystick: JoystickConfig,
    pub output: OutputConfig,
}

impl AppConfig {
    /// `$STAGEPAD_CONFIG` if set, the user config directory otherwise
    pub fn path() -> PathBuf {
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            return PathBuf::from(path);
        }

        let mut base_path = dirs::config_dir().unwrap_or_else(|| {
            warn!("Could not determine config directory, using current directory");
            PathBuf::from(".")
        });
        base_path.push(CONFIG_DIR);
        base_path.push(CONFIG_FILE);
        base_path
    }

    pub async fn load_or_default() -> Result<Self> {
        Self::load_or_create(&Self::path()).await
    }

    /// Reads `path`, writing the defaults there first if it does not exist
    pub async fn load_or_create(path: &Path) -> Result<Self> {
        if !tokio::fs::try_exists(path)
            .await
            .map_err(|e| eyre!("Failed to check if config file exists: {}", e))?
        {
            info!("Creating default configuration at {}", path.display());
            let config = Self::default();
            config.save(path).await?;
            return Ok(config);
        }

        Self::load(path).await
    }

    pub async fn load(path: &Path) -> Result<Self> {
        debug!("Loading configuration from {}", path.display());
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

        toml::from_str(&content)
            .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| eyre!("Failed to create config directory: {}", e))?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| eyre!("Failed to serialize configuration: {}", e))?;

        tokio::fs::write(path, content)
            .await
            .map_err(|e| eyre!("Failed to write config file {}: {}", path.display(), e))?;
        Ok(())
    }
}
