//! Configuration loading from disk and flags.

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::cli::Cli;
use crate::config::schema::{FileConfig, StartupConfig};
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid configuration: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load a TOML config file.
pub fn load_file(path: &Path) -> Result<FileConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Combine the optional config file with the command line and validate.
pub fn load_config(cli: &Cli) -> Result<StartupConfig, ConfigError> {
    let base = match &cli.config {
        Some(path) => load_file(path)?,
        None => FileConfig::default(),
    };
    let raw = base.merge(cli.overrides());

    validate_config(&raw, cli.graceful).map_err(ConfigError::Validation)
}
