//! Configuration loading from disk.
//!
//! Documents are JSON or TOML, chosen by file extension, and are always
//! parsed into a generic [`serde_json::Value`] tree so the configurator can
//! merge them regardless of source format.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;

use crate::error::ConfigError;

/// Application configuration file names, probed in order.
pub const CONFIG_CANDIDATES: [&str; 2] = ["config.json", "config.toml"];

/// Route file names, probed in order.
pub const ROUTES_CANDIDATES: [&str; 2] = ["routes.json", "routes.toml"];

/// Framework defaults layered underneath every application configuration.
const SYSTEM_DEFAULTS: &str = include_str!("defaults.json");

/// Supported document formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Json,
    Toml,
}

impl Format {
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Some(Format::Json),
            Some("toml") => Some(Format::Toml),
            _ => None,
        }
    }
}

/// First existing file among `names` inside `dir`.
pub fn first_existing(dir: &Path, names: &[&str]) -> Option<PathBuf> {
    names
        .iter()
        .map(|name| dir.join(name))
        .find(|path| path.is_file())
}

/// Like [`first_existing`], reporting every probed path when nothing exists.
pub fn locate(dir: &Path, names: &[&str]) -> Result<PathBuf, ConfigError> {
    first_existing(dir, names).ok_or_else(|| ConfigError::NotFound {
        candidates: names.iter().map(|name| dir.join(name)).collect(),
    })
}

/// Parse document text according to the format implied by `path`.
pub fn parse_document(path: &Path, content: &str) -> Result<Value, ConfigError> {
    let parse_error = |message: String| ConfigError::Parse {
        path: path.to_path_buf(),
        message,
    };

    match Format::from_path(path) {
        Some(Format::Json) => serde_json::from_str(content).map_err(|e| parse_error(e.to_string())),
        Some(Format::Toml) => toml::from_str(content).map_err(|e| parse_error(e.to_string())),
        None => Err(ConfigError::UnsupportedFormat(path.to_path_buf())),
    }
}

/// Load and parse a document.
pub fn load_document(path: &Path) -> Result<Value, ConfigError> {
    let content = fs::read_to_string(path).map_err(|e| io_error(path, e))?;
    parse_document(path, &content)
}

/// Async counterpart of [`load_document`].
pub async fn load_document_async(path: &Path) -> Result<Value, ConfigError> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| io_error(path, e))?;
    parse_document(path, &content)
}

/// The embedded framework defaults, still keyed by environment.
pub fn system_defaults() -> Result<Value, ConfigError> {
    serde_json::from_str(SYSTEM_DEFAULTS).map_err(|e| ConfigError::Parse {
        path: PathBuf::from("defaults.json"),
        message: e.to_string(),
    })
}

fn io_error(path: &Path, source: std::io::Error) -> ConfigError {
    ConfigError::Io {
        path: path.to_path_buf(),
        source: Arc::new(source),
    }
}
