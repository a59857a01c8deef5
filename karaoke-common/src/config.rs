//! Configuration file discovery and TOML loading
//!
//! Config file resolution priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. Platform config directory (`<config_dir>/karaoke/config.toml`)
//! 4. None: callers fall back to compiled defaults
//!
//! A missing config file is never fatal.

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "KARAOKE_CONFIG";

/// Application folder name under the platform config directory
pub const APP_DIR_NAME: &str = "karaoke";

/// Resolve which config file to read, if any
///
/// An explicitly requested file (CLI or environment) is returned even when it
/// does not exist so the caller can report it; the platform default is only
/// returned when present.
pub fn resolve_config_path(cli_arg: Option<&Path>, env_var_name: &str) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        if !path.is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3: Platform config directory
    default_config_path().filter(|p| p.exists())
}

/// Platform config file location (`~/.config/karaoke/config.toml` on Linux)
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_DIR_NAME).join("config.toml"))
}

/// Read and parse a TOML file
pub fn load_toml_file<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;
    let parsed = toml::from_str(&content)?;
    info!("Loaded configuration from {}", path.display());
    Ok(parsed)
}

/// Read a TOML file if one resolves, otherwise use defaults
///
/// A file that exists but fails to parse is an error; a file that is absent
/// only logs a warning.
pub fn load_toml_or_default<T: DeserializeOwned + Default>(path: Option<&Path>) -> Result<T> {
    match path {
        Some(p) if p.exists() => load_toml_file(p),
        Some(p) => {
            warn!("Config file {} not found, using built-in defaults", p.display());
            Ok(T::default())
        }
        None => {
            info!("No config file found, using built-in defaults");
            Ok(T::default())
        }
    }
}
