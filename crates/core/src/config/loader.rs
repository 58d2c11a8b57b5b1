use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use std::path::{Path, PathBuf};

use super::{types::Config, ConfigError};

/// Environment variable prefix for overrides, e.g. `REELFORGE_PASSCODE__SECRET`.
pub const ENV_PREFIX: &str = "REELFORGE_";

/// Names the config file; unset means [`DEFAULT_CONFIG_PATH`].
pub const CONFIG_PATH_VAR: &str = "REELFORGE_CONFIG";

pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// The config file to load, from `REELFORGE_CONFIG` or the default.
pub fn config_path_from_env() -> PathBuf {
    std::env::var_os(CONFIG_PATH_VAR)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Read `path` and layer `REELFORGE_*` variables over it.
///
/// Nested keys use a double underscore: `REELFORGE_RATE_LIMIT__API__MAX_REQUESTS`.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.is_file() {
        return Err(ConfigError::FileNotFound(path.to_path_buf()));
    }

    Figment::new()
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).ignore(&["CONFIG", "LOG_FORMAT"]).split("__"))
        .extract()
        .map_err(|e| ConfigError::ParseError(e.to_string()))
}

/// Parse a config without touching the environment. Tests build their
/// configs this way.
pub fn load_config_from_str(toml_str: &str) -> Result<Config, ConfigError> {
    toml::from_str(toml_str).map_err(|e| ConfigError::ParseError(e.to_string()))
}
