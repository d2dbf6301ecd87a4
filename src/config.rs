//! On-disk settings.
//!
//! One flat TOML file at `<config_dir>/padlink/config.toml`. A default
//! file is written on first run so users have something to edit; the
//! device slug is generated on first load and persisted, keeping the
//! device tag stable across sessions.

use crate::bridge::gamepad::BridgeSettings;
use crate::device::generate_slug;
use crate::input::tilt::TiltConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("No platform config directory available")]
    NoConfigDir,

    #[error("Failed to access configuration file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// WebSocket URL of the signaling server.
    pub signaler_url: String,

    /// Persisted device slug; generated on first load when empty.
    pub device_slug: String,

    /// Tilt tuning, handed to the tilt pipeline when a control surface
    /// starts it.
    pub tilt: TiltConfig,

    pub bridge: BridgeSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            signaler_url: "ws://127.0.0.1:5174/ws".to_string(),
            device_slug: String::new(),
            tilt: TiltConfig::default(),
            bridge: BridgeSettings::default(),
        }
    }
}

impl Settings {
    pub fn config_path() -> Result<PathBuf, ConfigError> {
        let base = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(base.join("padlink").join("config.toml"))
    }

    /// Load settings, creating a default file (with a fresh slug) when
    /// none exists yet.
    pub fn load_or_create() -> Result<Self, ConfigError> {
        let path = Self::config_path()?;
        if !path.exists() {
            let mut settings = Settings::default();
            settings.device_slug = generate_slug();
            settings.save()?;
            info!("Wrote default configuration to {}", path.display());
            return Ok(settings);
        }

        debug!("Loading configuration from {}", path.display());
        let text = fs::read_to_string(&path)?;
        let mut settings: Settings = toml::from_str(&text)?;

        if settings.device_slug.is_empty() {
            settings.device_slug = generate_slug();
            settings.save()?;
            info!("Assigned device slug {}", settings.device_slug);
        }
        Ok(settings)
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let text = toml::to_string_pretty(self)?;
        fs::write(&path, text)?;
        Ok(())
    }
}
