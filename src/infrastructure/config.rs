//! Configuration file management.
//!
//! Handles loading and saving TOML configuration files.

use std::fs;
use std::path::{Path, PathBuf};

use crate::domain::{AppConfig, AppError, Result};

/// Default configuration file content.
const DEFAULT_CONFIG: &str = r#"# Thread Archive Configuration
# Auto-generated - edit as needed

[export]
# Idle time of the export worker between polls, in milliseconds
poll_interval_ms = 500

# PDF converters tried in order (pandoc, weasyprint, wkhtmltopdf)
pdf_converters = ["pandoc", "weasyprint"]

[paths]
# Custom data directory (optional, defaults to ~/.thread-archive)
# data_dir = "/custom/path"
"#;

/// Load configuration from `<data_dir>/config.toml`, or defaults if absent.
///
/// `data_dir` overrides both the default location and any `paths.data_dir`
/// in the file.
///
/// # Errors
/// Returns error if file exists but cannot be read or parsed.
pub fn load_config(data_dir: Option<&Path>) -> Result<AppConfig> {
    let config_path = config_file_path(data_dir);

    let mut config = if config_path.exists() {
        load_config_from_file(&config_path)?
    } else {
        AppConfig::default()
    };

    if let Some(dir) = data_dir {
        config.paths.data_dir = Some(dir.to_path_buf());
    }

    tracing::debug!(path = %config_path.display(), data_dir = %config.data_dir().display(), "Loaded configuration");
    Ok(config)
}

/// Load configuration from a specific file.
///
/// # Errors
/// Returns error if file cannot be read or parsed.
pub fn load_config_from_file(path: &Path) -> Result<AppConfig> {
    let content = fs::read_to_string(path)
        .map_err(|e| AppError::io(format!("Failed to read config file: {}", path.display()), e))?;

    toml::from_str(&content).map_err(|e| AppError::Config {
        message: format!("Failed to parse config file: {e}"),
    })
}

/// Save configuration to file.
///
/// # Errors
/// Returns error if file cannot be written.
pub fn save_config(config: &AppConfig) -> Result<()> {
    let config_path = config.config_file_path();

    // Ensure parent directory exists
    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| AppError::io("Failed to create config directory", e))?;
    }

    let content = toml::to_string_pretty(config).map_err(|e| AppError::Config {
        message: format!("Failed to serialize config: {e}"),
    })?;

    fs::write(&config_path, content)
        .map_err(|e| AppError::io(format!("Failed to write config file: {}", config_path.display()), e))?;

    tracing::info!(path = %config_path.display(), "Configuration saved");

    Ok(())
}

/// Create default configuration file if it doesn't exist.
///
/// Returns the config path and whether it was created.
///
/// # Errors
/// Returns error if file cannot be created.
pub fn ensure_config_exists(data_dir: Option<&Path>) -> Result<(PathBuf, bool)> {
    let config_path = config_file_path(data_dir);

    if config_path.exists() {
        return Ok((config_path, false));
    }

    // Ensure parent directory exists
    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| AppError::io("Failed to create config directory", e))?;
    }

    fs::write(&config_path, DEFAULT_CONFIG)
        .map_err(|e| AppError::io("Failed to create default config", e))?;

    tracing::info!(path = %config_path.display(), "Created default configuration");

    Ok((config_path, true))
}

/// Get the path to the configuration file.
#[must_use]
pub fn config_file_path(data_dir: Option<&Path>) -> PathBuf {
    data_dir
        .map_or_else(AppConfig::default_data_dir, Path::to_path_buf)
        .join("config.toml")
}
