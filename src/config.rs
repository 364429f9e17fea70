//! Logger options and validation

use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::LogError;

/// Options accepted by [`Logger::init`](crate::Logger::init)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggerOptions {
    /// Log file; `None` disables persistence
    pub path: Option<PathBuf>,

    /// Truncate the file on init instead of appending a blank-line separator
    pub clear: bool,
}

impl LoggerOptions {
    /// Options persisting to `path`
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            clear: false,
        }
    }

    /// Set the truncate-on-init flag
    pub fn clear(mut self, clear: bool) -> Self {
        self.clear = clear;
        self
    }

    /// Parse options from a JSON value, which must be an object
    pub fn from_json(value: &serde_json::Value) -> Result<Self, LogError> {
        if !value.is_object() {
            return Err(LogError::Config(format!(
                "expected an object, got {}",
                json_kind(value)
            )));
        }
        serde_json::from_value(value.clone()).map_err(|e| LogError::Config(e.to_string()))
    }

    /// Parse options from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, LogError> {
        toml::from_str(content).map_err(|e| LogError::Config(e.to_string()))
    }

    /// Load options from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read logger options {}", path.display()))?;
        Self::from_toml_str(&content).context("Failed to parse logger options")
    }
}

/// Validated, immutable logger configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoggerConfig {
    pub target_path: Option<PathBuf>,
    pub truncate_on_init: bool,
}

impl LoggerConfig {
    /// Validate options into a configuration
    pub fn from_options(options: &LoggerOptions) -> Result<Self, LogError> {
        let target_path = match &options.path {
            Some(path) => Some(validate_path(path)?.to_path_buf()),
            None => None,
        };
        Ok(Self {
            target_path,
            truncate_on_init: options.clear,
        })
    }

    /// Configuration with persistence disabled
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Check if a target file is configured
    pub fn persists(&self) -> bool {
        self.target_path.is_some()
    }
}

/// Accept only conservative, absolute file paths
///
/// Rejects empty paths, relative paths (drive-letter form on Windows, leading
/// `/` elsewhere), `..` components, control characters and paths ending in a
/// separator.
pub fn validate_path(path: &Path) -> Result<&Path, LogError> {
    let invalid = || LogError::InvalidPath(path.to_path_buf());

    let text = path.to_str().ok_or_else(invalid)?;
    if text.is_empty() || text.chars().any(char::is_control) {
        return Err(invalid());
    }
    if text.ends_with('/') || text.ends_with(std::path::MAIN_SEPARATOR) {
        return Err(invalid());
    }
    if !has_absolute_form(text) {
        return Err(invalid());
    }
    if path.components().any(|c| matches!(c, Component::ParentDir)) {
        return Err(invalid());
    }
    if path.file_name().is_none() {
        return Err(invalid());
    }
    Ok(path)
}

#[cfg(windows)]
fn has_absolute_form(text: &str) -> bool {
    let bytes = text.as_bytes();
    bytes.len() > 3
        && bytes[0].is_ascii_alphabetic()
        && bytes[1] == b':'
        && (bytes[2] == b'\\' || bytes[2] == b'/')
}

#[cfg(not(windows))]
fn has_absolute_form(text: &str) -> bool {
    text.starts_with('/') && text.len() > 1
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}
