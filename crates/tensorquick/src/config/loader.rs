use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::config::schema::Settings;
use crate::error::ConfigError;

/// Environment variable overriding the settings file location.
pub const CONFIG_PATH_ENV: &str = "TENSORQUICK_CONFIG_PATH";

const DEFAULT_SETTINGS_FILE: &str = ".tensorquick.yaml";

/// Returns the settings path: `$TENSORQUICK_CONFIG_PATH`, else `~/.tensorquick.yaml`.
pub fn default_settings_path() -> PathBuf {
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(DEFAULT_SETTINGS_FILE)
}

/// Loads settings from a YAML file. A missing file yields the defaults.
pub fn load_settings<P: AsRef<Path>>(path: P) -> Result<Settings, ConfigError> {
    let path = path.as_ref();
    if !path.exists() {
        log::debug!("Settings file {} not found, using defaults", path.display());
        return Ok(Settings::default());
    }

    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_settings_from_str(&content)
}

pub fn load_settings_from_str(content: &str) -> Result<Settings, ConfigError> {
    if content.trim().is_empty() {
        return Ok(Settings::default());
    }

    let settings: Settings = serde_yaml::from_str(content)?;

    validate_settings(&settings)?;

    Ok(settings)
}

/// Writes settings back to disk, creating the parent directory if needed.
pub fn save_settings<P: AsRef<Path>>(path: P, settings: &Settings) -> Result<(), ConfigError> {
    let path = path.as_ref();
    validate_settings(settings)?;

    let yaml = serde_yaml::to_string(settings)?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::WriteFile {
                path: path.to_path_buf(),
                source: e,
            })?;
        }
    }

    std::fs::write(path, yaml).map_err(|e| ConfigError::WriteFile {
        path: path.to_path_buf(),
        source: e,
    })
}

fn validate_settings(settings: &Settings) -> Result<(), ConfigError> {
    if settings.deploy_tool.program.trim().is_empty() {
        return Err(ConfigError::Validation {
            message: "deploy_tool.program must not be empty".to_string(),
        });
    }

    if settings.terminate_grace_secs == 0 {
        return Err(ConfigError::Validation {
            message: "terminate_grace_secs must be greater than 0".to_string(),
        });
    }

    if settings.request_timeout_secs == 0 {
        return Err(ConfigError::Validation {
            message: "request_timeout_secs must be greater than 0".to_string(),
        });
    }

    for list in [&settings.models, &settings.deployed_models] {
        let mut seen = HashSet::new();
        for model in list {
            if model.code_name.trim().is_empty() {
                return Err(ConfigError::Validation {
                    message: format!("Model '{}' has an empty code_name", model.name),
                });
            }
            if !seen.insert(model.code_name.as_str()) {
                return Err(ConfigError::DuplicateModel(model.code_name.clone()));
            }
        }
    }

    Ok(())
}
