use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;
use crate::plants::DEFAULT_PLANT_ID;

pub const DEFAULT_REFRESH_MS: u64 = 2500;
pub const DEFAULT_SENSOR_URL: &str = "http://localhost:8080/latest.json";
pub const DEFAULT_CHAT_URL: &str = "http://localhost:54321/functions/v1/chat";

pub const ENV_SENSOR_URL: &str = "GROWCAB_SENSOR_URL";
pub const ENV_SENSOR_REFRESH_MS: &str = "GROWCAB_SENSOR_REFRESH_MS";
pub const ENV_CHAT_URL: &str = "GROWCAB_CHAT_URL";
pub const ENV_CHAT_API_KEY: &str = "GROWCAB_CHAT_API_KEY";

/// Parse a refresh interval in milliseconds. Missing, non-numeric and
/// non-positive values fall back to [`DEFAULT_REFRESH_MS`].
pub fn parse_refresh_interval(value: Option<&str>) -> Duration {
    let millis = value
        .and_then(|v| v.trim().parse::<i64>().ok())
        .filter(|ms| *ms > 0)
        .map(|ms| ms as u64)
        .unwrap_or(DEFAULT_REFRESH_MS);
    Duration::from_millis(millis)
}

/// On-disk configuration. Every field is optional; [`Settings::resolve`] fills the gaps.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Config {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sensor_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sensor_refresh_ms: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_plant: Option<String>,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::get_config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::new());
        }

        let config_content = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&config_content)?;
        Ok(config)
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::get_config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let config_content = serde_json::to_string_pretty(self)?;
        fs::write(path, config_content)?;
        Ok(())
    }

    pub fn save_default_plant(plant_id: &str) -> Result<(), ConfigError> {
        Self::save_default_plant_to(&Self::get_config_path()?, plant_id)
    }

    /// Record `plant_id` as the default, keeping every other setting. A file
    /// that cannot be read is left untouched and the error returned.
    pub fn save_default_plant_to(path: &Path, plant_id: &str) -> Result<(), ConfigError> {
        let mut config = Self::load_from(path)?;
        config.default_plant = Some(plant_id.to_string());
        config.save_to(path)
    }

    pub fn get_config_path() -> Result<PathBuf, ConfigError> {
        let config_dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(config_dir.join("growcab").join("config.json"))
    }
}

/// Effective settings, read once at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub sensor_url: String,
    pub refresh: Duration,
    pub chat_url: String,
    pub chat_api_key: Option<String>,
    pub default_plant: String,
}

impl Settings {
    /// Resolve settings from the process environment layered over `config`.
    pub fn from_env(config: &Config) -> Self {
        Self::resolve(config, |key| std::env::var(key).ok())
    }

    /// Resolve settings with an explicit environment lookup. Environment values win
    /// over the file; blank values count as unset.
    pub fn resolve<F>(config: &Config, env: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = |key: &str| env(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let sensor_url = env(ENV_SENSOR_URL)
            .or_else(|| config.sensor_url.clone())
            .unwrap_or_else(|| DEFAULT_SENSOR_URL.to_string());

        let refresh = match env(ENV_SENSOR_REFRESH_MS) {
            Some(raw) => parse_refresh_interval(Some(&raw)),
            None => parse_refresh_interval(config.sensor_refresh_ms.map(|ms| ms.to_string()).as_deref()),
        };

        let chat_url = env(ENV_CHAT_URL)
            .or_else(|| config.chat_url.clone())
            .unwrap_or_else(|| DEFAULT_CHAT_URL.to_string());

        let chat_api_key = env(ENV_CHAT_API_KEY).or_else(|| config.chat_api_key.clone());

        let default_plant = config
            .default_plant
            .clone()
            .unwrap_or_else(|| DEFAULT_PLANT_ID.to_string());

        Self {
            sensor_url,
            refresh,
            chat_url,
            chat_api_key,
            default_plant,
        }
    }
}
