use crate::managers::RefreshConfig;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Overrides `backend_endpoint` when set.
pub const BACKEND_ENDPOINT_ENV: &str = "FER_BE_ENDPOINT";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct FloatingDisplaySettings {
    #[serde(default = "default_floating_width")]
    pub width: f64,
    #[serde(default = "default_floating_height")]
    pub height: f64,
    #[serde(default = "default_floating_always_on_top")]
    pub always_on_top: bool,
}

impl Default for FloatingDisplaySettings {
    fn default() -> Self {
        Self {
            width: default_floating_width(),
            height: default_floating_height(),
            always_on_top: default_floating_always_on_top(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DashboardSettings {
    #[serde(default = "default_backend_endpoint")]
    pub backend_endpoint: String,
    /// Push broker base URL; the backend endpoint when unset
    #[serde(default)]
    pub push_endpoint: Option<String>,
    #[serde(default = "default_recognition_stream_limit")]
    pub recognition_stream_limit: u32,
    /// Unlimited when unset
    #[serde(default)]
    pub participant_stream_limit: Option<u32>,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub intent_store_path: Option<PathBuf>,
    #[serde(default)]
    pub floating_display: FloatingDisplaySettings,
}

fn default_backend_endpoint() -> String {
    "http://localhost:5000".to_string()
}

fn default_recognition_stream_limit() -> u32 {
    10
}

fn default_request_timeout_secs() -> u64 {
    15
}

fn default_floating_width() -> f64 {
    420.0
}

fn default_floating_height() -> f64 {
    320.0
}

fn default_floating_always_on_top() -> bool {
    true
}

impl Default for DashboardSettings {
    fn default() -> Self {
        Self {
            backend_endpoint: default_backend_endpoint(),
            push_endpoint: None,
            recognition_stream_limit: default_recognition_stream_limit(),
            participant_stream_limit: None,
            request_timeout_secs: default_request_timeout_secs(),
            intent_store_path: None,
            floating_display: FloatingDisplaySettings::default(),
        }
    }
}

impl DashboardSettings {
    pub fn push_endpoint(&self) -> &str {
        self.push_endpoint
            .as_deref()
            .unwrap_or(&self.backend_endpoint)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn refresh_config(&self) -> RefreshConfig {
        RefreshConfig {
            recognition_limit: Some(self.recognition_stream_limit),
            participant_limit: self.participant_stream_limit,
        }
    }

    fn apply_env(mut self, endpoint: Option<String>) -> Self {
        if let Some(endpoint) = endpoint.filter(|e| !e.trim().is_empty()) {
            log::info!("Using backend endpoint from {}: {}", BACKEND_ENDPOINT_ENV, endpoint);
            self.backend_endpoint = endpoint;
        }
        self
    }
}

pub fn get_default_settings() -> DashboardSettings {
    DashboardSettings::default()
}

/// `<config_dir>/ferdash/settings.toml`
pub fn default_settings_path() -> Result<PathBuf> {
    let config = dirs::config_dir().context("Could not determine config directory")?;
    Ok(config.join("ferdash").join("settings.toml"))
}

pub fn write_settings(path: &Path, settings: &DashboardSettings) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let body = toml::to_string_pretty(settings).context("Failed to serialize settings")?;
    fs::write(path, body).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

/// Read the settings file, creating it with defaults when missing.
/// A file that fails to parse is replaced by defaults.
pub fn load_or_create_settings(path: &Path) -> Result<DashboardSettings> {
    let settings = if path.exists() {
        let body = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        match toml::from_str::<DashboardSettings>(&body) {
            Ok(settings) => {
                log::debug!("Loaded settings from {}", path.display());
                settings
            }
            Err(e) => {
                log::warn!("Failed to parse settings ({}), falling back to defaults", e);
                let default_settings = get_default_settings();
                write_settings(path, &default_settings)?;
                default_settings
            }
        }
    } else {
        let default_settings = get_default_settings();
        write_settings(path, &default_settings)?;
        log::info!("Created default settings at {}", path.display());
        default_settings
    };

    Ok(settings.apply_env(std::env::var(BACKEND_ENDPOINT_ENV).ok()))
}
