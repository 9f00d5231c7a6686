//! Settings file management
//!
//! Settings live in a YAML or JSON file chosen by extension. A missing file is
//! created with defaults on first load, and a few environment variables
//! override the schedule and submit switches.

use std::fs;
use std::path::{Path, PathBuf};

use autopilot_core_types::Settings;
use autopilot_scheduler::SettingsProvider;
use parking_lot::RwLock;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

pub const APP_DIR: &str = "ticket-autopilot";
pub const SETTINGS_FILE: &str = "settings.yaml";

pub const ENV_START_DATE: &str = "AUTOPILOT_START_DATE";
pub const ENV_START_TIME: &str = "AUTOPILOT_START_TIME";
pub const ENV_AUTO_SUBMIT: &str = "AUTOPILOT_AUTO_SUBMIT";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no configuration directory on this platform")]
    NoConfigDir,

    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("failed to serialize settings: {0}")]
    Serialize(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfigFormat {
    Yaml,
    Json,
}

impl ConfigFormat {
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => ConfigFormat::Json,
            _ => ConfigFormat::Yaml,
        }
    }
}

/// `<config dir>/ticket-autopilot/settings.yaml`
pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    let mut path = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
    path.push(APP_DIR);
    path.push(SETTINGS_FILE);
    Ok(path)
}

pub fn resolve_config_path(explicit: Option<&Path>) -> Result<PathBuf, ConfigError> {
    match explicit {
        Some(path) => Ok(path.to_path_buf()),
        None => default_config_path(),
    }
}

/// Parse settings text. Unknown or malformed fields fall back to defaults.
pub fn parse_settings(text: &str, format: ConfigFormat, path: &Path) -> Result<Settings, ConfigError> {
    let parse_error = |message: String| ConfigError::Parse {
        path: path.to_path_buf(),
        message,
    };
    let raw: Value = match format {
        ConfigFormat::Yaml => serde_yaml::from_str(text).map_err(|err| parse_error(err.to_string()))?,
        ConfigFormat::Json => serde_json::from_str(text).map_err(|err| parse_error(err.to_string()))?,
    };
    Ok(Settings::normalize(&raw))
}

pub fn load_settings(path: &Path) -> Result<Settings, ConfigError> {
    let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let settings = parse_settings(&text, ConfigFormat::from_path(path), path)?;
    debug!(path = %path.display(), "settings loaded");
    Ok(settings)
}

pub fn save_settings(path: &Path, settings: &Settings) -> Result<(), ConfigError> {
    let io_error = |source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_error)?;
    }
    let text = match ConfigFormat::from_path(path) {
        ConfigFormat::Yaml => {
            serde_yaml::to_string(settings).map_err(|err| ConfigError::Serialize(err.to_string()))?
        }
        ConfigFormat::Json => serde_json::to_string_pretty(settings)
            .map_err(|err| ConfigError::Serialize(err.to_string()))?,
    };
    fs::write(path, text).map_err(io_error)
}

/// Load the settings file, writing defaults first when it does not exist yet.
pub fn load_or_init(path: &Path) -> Result<Settings, ConfigError> {
    if path.exists() {
        let settings = load_settings(path)?;
        info!("Loaded settings from: {}", path.display());
        return Ok(settings);
    }
    let settings = Settings::default();
    save_settings(path, &settings)?;
    warn!("Settings file not found, wrote defaults to: {}", path.display());
    Ok(settings)
}

/// Apply overrides from `lookup`, which maps a variable name to its value.
pub fn apply_overrides<F>(settings: &Settings, lookup: F) -> Settings
where
    F: Fn(&str) -> Option<String>,
{
    let start_date = lookup(ENV_START_DATE);
    let start_time = lookup(ENV_START_TIME);
    let auto_submit = lookup(ENV_AUTO_SUBMIT);
    if start_date.is_none() && start_time.is_none() && auto_submit.is_none() {
        return settings.clone();
    }

    let Ok(mut raw) = serde_json::to_value(settings) else {
        return settings.clone();
    };
    if let Some(date) = start_date {
        raw["common"]["startDate"] = Value::String(date);
    }
    if let Some(time) = start_time {
        raw["common"]["startTime"] = Value::String(time);
    }
    if let Some(flag) = auto_submit {
        let flag = matches!(flag.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on");
        raw["apply"]["autoSubmit"] = Value::Bool(flag);
    }
    Settings::normalize(&raw)
}

pub fn apply_env_overrides(settings: &Settings) -> Settings {
    apply_overrides(settings, |key| std::env::var(key).ok())
}

/// Settings re-read from disk on every dispatch, so edits apply to the next
/// navigation. A file that fails to load keeps the last good settings.
pub struct FileSettingsProvider {
    path: PathBuf,
    last_good: RwLock<Settings>,
}

impl FileSettingsProvider {
    pub fn new(path: impl Into<PathBuf>, initial: Settings) -> Self {
        Self {
            path: path.into(),
            last_good: RwLock::new(initial),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SettingsProvider for FileSettingsProvider {
    fn load(&self) -> Settings {
        match load_settings(&self.path) {
            Ok(settings) => {
                let settings = apply_env_overrides(&settings);
                *self.last_good.write() = settings.clone();
                settings
            }
            Err(err) => {
                warn!(error = %err, "keeping previous settings");
                self.last_good.read().clone()
            }
        }
    }
}
