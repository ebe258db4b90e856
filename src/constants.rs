// src/constants.rs

use std::time::Duration;

/// The extension a file must carry to be discovered as a script.
pub const SCRIPT_EXTENSION: &str = "sh";

/// The name of the per-project configuration file (looked up in the working directory).
pub const PROJECT_CONFIG_FILENAME: &str = "runsh.toml";

/// The name of the user-level configuration file (inside `~/.config/runsh/`).
pub const USER_CONFIG_FILENAME: &str = "config.toml";

/// The name of the directory used under the system config and cache directories.
pub const APP_DIR_NAME: &str = "runsh";

/// The metadata record written next to the scripts of every cache entry.
pub const CACHE_META_FILENAME: &str = ".runsh-meta.json";

/// Source string used when nothing is configured.
pub const DEFAULT_SCRIPTS_DIR: &str = "./scripts";

/// Shell used to run scripts when nothing is configured.
pub const DEFAULT_SHELL: &str = "bash";

/// Base URL of the GitHub REST API.
pub const DEFAULT_GITHUB_API_BASE: &str = "https://api.github.com";

/// Environment variable holding the GitHub token, unless configured otherwise.
pub const DEFAULT_GITHUB_TOKEN_ENV: &str = "GITHUB_TOKEN";

/// How long a cache entry is served without contacting the remote.
pub const CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Timeout for every remote request.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Upper bound on concurrent content fetches during one refresh.
pub const MAX_PARALLEL_FETCHES: usize = 4;

/// Value a flag option is bound to when present.
pub const FLAG_ON: &str = "1";

/// Value a flag option is bound to when absent.
pub const FLAG_OFF: &str = "0";
