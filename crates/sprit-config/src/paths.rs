//! Where configuration lives on disk.
//!
//! - **User config**: `~/.config/sprit/` (Linux),
//!   `~/Library/Application Support/sprit/` (macOS), `%APPDATA%\sprit\` (Windows)
//! - **Default parameters**: `params.toml` inside the user config directory

use crate::error::ConfigError;
use sprit_core::HvsrParams;
use std::path::PathBuf;

/// Application name used for directory paths.
const APP_NAME: &str = "sprit";

/// File name of the user's default parameter set.
const DEFAULT_PARAMS_FILE: &str = "params.toml";

/// Returns the user-specific configuration directory.
///
/// Returns a fallback path if the config directory cannot be determined.
pub fn user_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

/// Path of the user's default parameter file. It need not exist.
pub fn default_params_path() -> PathBuf {
    user_config_dir().join(DEFAULT_PARAMS_FILE)
}

/// Ensure the user config directory exists.
pub fn ensure_user_config_dir() -> Result<PathBuf, ConfigError> {
    let dir = user_config_dir();

    if !dir.exists() {
        std::fs::create_dir_all(&dir).map_err(|e| ConfigError::create_dir(&dir, e))?;
    }

    Ok(dir)
}

/// Find a configuration file by name.
///
/// `name` may be a path to an existing file, or a bare name (with or
/// without `.toml`) looked up in the user config directory.
pub fn find_config(name: &str) -> Option<PathBuf> {
    let path = PathBuf::from(name);
    if path.is_file() {
        return Some(path);
    }

    let filename = if name.ends_with(".toml") {
        name.to_string()
    } else {
        format!("{name}.toml")
    };
    let user_path = user_config_dir().join(filename);
    user_path.is_file().then_some(user_path)
}

/// Parameters from `path`, or built-in defaults when the file is missing.
/// Keys absent from the file keep their defaults.
pub fn load_params(path: &std::path::Path) -> Result<HvsrParams, ConfigError> {
    if !path.is_file() {
        tracing::debug!(path = %path.display(), "no parameter file, using defaults");
        return Ok(HvsrParams::default());
    }
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::read_file(path, e))?;
    Ok(toml::from_str(&content)?)
}

/// The user's default parameters; see [`default_params_path`].
pub fn load_default_params() -> Result<HvsrParams, ConfigError> {
    load_params(&default_params_path())
}

/// Write `params` as pretty TOML, creating parent directories.
pub fn save_params(params: &HvsrParams, path: &std::path::Path) -> Result<(), ConfigError> {
    crate::batch::save_toml(path, &toml::to_string_pretty(params)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_dir_ends_with_app_name() {
        assert!(user_config_dir().ends_with(APP_NAME));
        assert!(default_params_path().ends_with("sprit/params.toml"));
    }

    #[test]
    fn missing_file_gives_defaults() {
        let params = load_params(std::path::Path::new("/nonexistent/sprit/params.toml")).unwrap();
        assert_eq!(params, HvsrParams::default());
    }

    #[test]
    fn find_config_misses_unknown_names() {
        assert!(find_config("surely-not-a-real-sprit-config-name").is_none());
    }
}
