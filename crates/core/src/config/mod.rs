//! Server configuration: one TOML file, overridable from `REELFORGE_*`
//! environment variables, checked by [`validate_config`] before startup.

mod loader;
mod types;
mod validate;

pub use loader::*;
pub use types::*;
pub use validate::*;

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Parsed fine but describes a server that cannot run.
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}
