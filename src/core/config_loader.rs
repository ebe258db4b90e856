//! # Config Loader
//!
//! Finds and reads the `runsh` TOML configuration, applies environment
//! overrides and resolves the scripts source into a [`SourceDescriptor`].
//!
//! Lookup order, first match wins:
//!
//! 1. `--config <path>`
//! 2. `RUNSH_CONFIG`
//! 3. `./runsh.toml`
//! 4. `<config_dir>/runsh/config.toml`
//! 5. built-in defaults
//!
//! `RUNSH_SCRIPTS_DIR`, `RUNSH_SHELL` and `RUNSH_CACHE_DIR` override the
//! matching keys afterwards. Relative paths from a file are resolved against
//! that file's directory; relative paths from the environment or the defaults
//! are resolved against the working directory.

use crate::constants::{
    DEFAULT_FETCH_TIMEOUT, DEFAULT_GITHUB_API_BASE, DEFAULT_GITHUB_TOKEN_ENV, DEFAULT_SCRIPTS_DIR,
    DEFAULT_SHELL, PROJECT_CONFIG_FILENAME,
};
use crate::core::paths::{self, PathError};
use crate::core::source::{DescriptorError, SourceDescriptor, resolve_source_in};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Path of the configuration file to use.
pub const ENV_CONFIG: &str = "RUNSH_CONFIG";
/// Overrides `scripts_dir`.
pub const ENV_SCRIPTS_DIR: &str = "RUNSH_SCRIPTS_DIR";
/// Overrides `shell`.
pub const ENV_SHELL: &str = "RUNSH_SHELL";
/// Overrides `cache_dir`.
pub const ENV_CACHE_DIR: &str = "RUNSH_CACHE_DIR";

/// Errors raised while loading the configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// An explicitly requested file does not exist.
    #[error("Config file '{0}' does not exist.")]
    NotFound(PathBuf),
    /// The file exists but could not be read.
    #[error("Failed to read config file '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The file is not valid TOML for this schema.
    #[error("Failed to parse config file '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    /// `scripts_dir` is neither a directory nor a GitHub tree URL.
    #[error("Invalid scripts source '{source_str}': {source}")]
    Descriptor {
        source_str: String,
        #[source]
        source: DescriptorError,
    },
    /// A path could not be located or expanded.
    #[error(transparent)]
    Path(#[from] PathError),
}

/// The `[github]` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GithubSettings {
    /// Base URL of the REST API.
    pub api_base: String,
    /// Name of the environment variable holding the API token.
    pub token_env: String,
    /// Per-request timeout.
    pub timeout_secs: u64,
}

impl Default for GithubSettings {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_GITHUB_API_BASE.to_string(),
            token_env: DEFAULT_GITHUB_TOKEN_ENV.to_string(),
            timeout_secs: DEFAULT_FETCH_TIMEOUT.as_secs(),
        }
    }
}

impl GithubSettings {
    /// The request timeout, at least one second.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

/// The on-disk configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunshConfig {
    /// A directory path or a GitHub tree URL.
    pub scripts_dir: String,
    /// Extra local scripts layered over a remote source.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_dir: Option<String>,
    /// Interpreter command line, split with shell rules (`"bash -e"`).
    pub shell: String,
    /// Cache root. Defaults to the system cache directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<String>,
    /// GitHub API settings.
    pub github: GithubSettings,
}

impl Default for RunshConfig {
    fn default() -> Self {
        Self {
            scripts_dir: DEFAULT_SCRIPTS_DIR.to_string(),
            local_dir: None,
            shell: DEFAULT_SHELL.to_string(),
            cache_dir: None,
            github: GithubSettings::default(),
        }
    }
}

/// Where the effective configuration came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigOrigin {
    /// `--config`.
    Flag(PathBuf),
    /// `$RUNSH_CONFIG`.
    Env(PathBuf),
    /// `runsh.toml` in the working directory.
    Project(PathBuf),
    /// The file in the user config directory.
    User(PathBuf),
    /// No file was found.
    Defaults,
}

impl ConfigOrigin {
    /// The file the configuration was read from, if any.
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Flag(p) | Self::Env(p) | Self::Project(p) | Self::User(p) => Some(p),
            Self::Defaults => None,
        }
    }
}

impl fmt::Display for ConfigOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Flag(p) => write!(f, "{} (--config)", p.display()),
            Self::Env(p) => write!(f, "{} (${})", p.display(), ENV_CONFIG),
            Self::Project(p) => write!(f, "{} (project)", p.display()),
            Self::User(p) => write!(f, "{} (user)", p.display()),
            Self::Defaults => write!(f, "built-in defaults"),
        }
    }
}

/// The effective configuration with every path resolved.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// The configuration with env overrides applied.
    pub config: RunshConfig,
    /// Where it was read from.
    pub origin: ConfigOrigin,
    /// The resolved `scripts_dir`.
    pub descriptor: SourceDescriptor,
    /// Local scripts merged over a remote source. Always `None` for local sources.
    pub local_overlay: Option<PathBuf>,
    /// Expanded cache root.
    pub cache_root: PathBuf,
}

/// Loads the configuration of the current process.
pub fn load(explicit: Option<&Path>) -> Result<LoadedConfig, ConfigError> {
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let user_config = paths::user_config_path().ok();
    load_from(
        explicit,
        |key| std::env::var(key).ok(),
        &cwd,
        user_config.as_deref(),
    )
}

/// Loads the configuration with an injected environment, working directory
/// and user config location.
pub fn load_from<E>(
    explicit: Option<&Path>,
    env: E,
    cwd: &Path,
    user_config: Option<&Path>,
) -> Result<LoadedConfig, ConfigError>
where
    E: Fn(&str) -> Option<String>,
{
    let env = |key: &str| env(key).filter(|v| !v.trim().is_empty());

    let origin = locate(explicit, env(ENV_CONFIG), cwd, user_config)?;
    let mut config = match origin.path() {
        Some(path) => read_config(path)?,
        None => RunshConfig::default(),
    };
    log::debug!("Using configuration from {}", origin);

    let file_base = origin
        .path()
        .and_then(Path::parent)
        .map_or_else(|| cwd.to_path_buf(), Path::to_path_buf);

    let mut scripts_base = file_base.clone();
    if let Some(dir) = env(ENV_SCRIPTS_DIR) {
        config.scripts_dir = dir;
        scripts_base = cwd.to_path_buf();
    }
    if let Some(shell) = env(ENV_SHELL) {
        config.shell = shell;
    }
    let mut cache_base = file_base.clone();
    if let Some(dir) = env(ENV_CACHE_DIR) {
        config.cache_dir = Some(dir);
        cache_base = cwd.to_path_buf();
    }
    let descriptor = resolve_source_in(&config.scripts_dir, &scripts_base).map_err(|source| {
        ConfigError::Descriptor {
            source_str: config.scripts_dir.clone(),
            source,
        }
    })?;

    let local_overlay = match (&descriptor, &config.local_dir) {
        (SourceDescriptor::Remote(_), Some(dir)) => Some(paths::expand_path(dir, &file_base)?),
        (SourceDescriptor::Local { .. }, Some(dir)) => {
            log::debug!("Ignoring local_dir '{}' for a local scripts source", dir);
            None
        }
        (_, None) => None,
    };

    let cache_root = match &config.cache_dir {
        Some(dir) => paths::expand_path(dir, &cache_base)?,
        None => paths::default_cache_root()?,
    };

    Ok(LoadedConfig {
        config,
        origin,
        descriptor,
        local_overlay,
        cache_root,
    })
}

fn locate(
    explicit: Option<&Path>,
    env_path: Option<String>,
    cwd: &Path,
    user_config: Option<&Path>,
) -> Result<ConfigOrigin, ConfigError> {
    if let Some(path) = explicit {
        let path = absolutize(path, cwd);
        return if path.is_file() {
            Ok(ConfigOrigin::Flag(path))
        } else {
            Err(ConfigError::NotFound(path))
        };
    }
    if let Some(path) = env_path {
        let path = absolutize(Path::new(&path), cwd);
        return if path.is_file() {
            Ok(ConfigOrigin::Env(path))
        } else {
            Err(ConfigError::NotFound(path))
        };
    }
    let project = cwd.join(PROJECT_CONFIG_FILENAME);
    if project.is_file() {
        return Ok(ConfigOrigin::Project(project));
    }
    if let Some(user) = user_config.filter(|p| p.is_file()) {
        return Ok(ConfigOrigin::User(user.to_path_buf()));
    }
    Ok(ConfigOrigin::Defaults)
}

fn absolutize(path: &Path, cwd: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        cwd.join(path)
    }
}

fn read_config(path: &Path) -> Result<RunshConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

// MARK: --- UNIT TESTS ---
