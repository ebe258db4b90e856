// src/core/paths.rs

use crate::constants::{APP_DIR_NAME, USER_CONFIG_FILENAME};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised while locating directories.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    /// The platform has no config directory.
    #[error("Could not find system config directory.")]
    ConfigDirNotFound,
    /// Neither a cache directory nor a home directory exists.
    #[error("Could not find a cache directory (no system cache dir and no home directory).")]
    CacheDirNotFound,
    /// A `~` or `$VAR` could not be expanded.
    #[error("Failed to expand path '{path}': {message}")]
    Expansion { path: String, message: String },
}

/// Returns the runsh configuration directory (`~/.config/runsh` on Linux).
/// The directory is not created.
pub fn config_dir() -> Result<PathBuf, PathError> {
    dirs::config_dir()
        .map(|dir| dir.join(APP_DIR_NAME))
        .ok_or(PathError::ConfigDirNotFound)
}

/// Returns the path of the user-level `config.toml`.
pub fn user_config_path() -> Result<PathBuf, PathError> {
    config_dir().map(|dir| dir.join(USER_CONFIG_FILENAME))
}

/// Returns the default cache root: the platform cache directory plus `runsh`,
/// falling back to `~/.cache/runsh`.
pub fn default_cache_root() -> Result<PathBuf, PathError> {
    if let Some(dir) = dirs::cache_dir() {
        return Ok(dir.join(APP_DIR_NAME));
    }
    dirs::home_dir()
        .map(|home| home.join(".cache").join(APP_DIR_NAME))
        .ok_or(PathError::CacheDirNotFound)
}

/// Expands `~` and environment variables in `template`, then resolves a
/// relative result against `base`.
pub fn expand_path(template: &str, base: &Path) -> Result<PathBuf, PathError> {
    let expanded = shellexpand::full(template).map_err(|e| PathError::Expansion {
        path: template.to_string(),
        message: e.to_string(),
    })?;
    let path = PathBuf::from(expanded.as_ref());
    Ok(if path.is_absolute() {
        path
    } else {
        base.join(path)
    })
}
