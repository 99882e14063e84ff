//! Error types for schema parsing, conversion, loading and persistence.

use serde_json::Value;
use std::path::PathBuf;
use thiserror::Error;

/// Convenience result alias used across the crate.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Broad error classes callers can match on without naming every variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The schema declaration itself is malformed.
    Structural,
    /// A raw value could not be coerced into its declared format.
    Conversion,
    /// A value failed a semantic check, or several properties failed at once.
    Validation,
    /// Reading, parsing or writing a file failed.
    File,
    /// An external loader failed.
    Loader,
}

/// Errors returned while building, reading, mutating or persisting a store.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The schema declaration is malformed at `path`.
    #[error("invalid schema at {path}: {message}")]
    Schema { path: String, message: String },
    /// A raw value could not be converted into the declared format.
    #[error("{message}")]
    Conversion {
        path: String,
        value: Value,
        message: String,
    },
    /// A value failed validation (pattern mismatch, missing, unknown key).
    #[error("{message}")]
    Validation {
        path: String,
        value: Option<Value>,
        message: String,
    },
    /// A read targeted a property that has no stored value.
    #[error("{message}")]
    NotDefined { path: String, message: String },
    /// Several failures collected in one operation.
    #[error("{message}")]
    Aggregate {
        message: String,
        keys: Vec<String>,
        errors: Vec<ConfigError>,
    },
    /// Reading a file failed.
    #[error("failed to read config file {}: {source}", path.display())]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// A file was read but its contents are not valid structured data.
    #[error("failed to parse config file {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },
    /// An external loader rejected.
    #[error("loader {loader} failed: {message}")]
    Loader { loader: String, message: String },
    /// Persisting the store failed.
    #[error("failed to write config to {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ConfigError {
    /// Classify the error according to the error taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Schema { .. } => ErrorKind::Structural,
            Self::Conversion { .. } => ErrorKind::Conversion,
            Self::Validation { .. } | Self::NotDefined { .. } | Self::Aggregate { .. } => {
                ErrorKind::Validation
            }
            Self::File { .. } | Self::Parse { .. } | Self::Write { .. } => ErrorKind::File,
            Self::Loader { .. } => ErrorKind::Loader,
        }
    }

    /// True when a read failed because the requested key has no value.
    pub fn is_not_defined(&self) -> bool {
        matches!(self, Self::NotDefined { .. })
    }

    /// Property path the error refers to, when there is a single one.
    pub fn property_path(&self) -> Option<&str> {
        match self {
            Self::Schema { path, .. }
            | Self::Conversion { path, .. }
            | Self::Validation { path, .. }
            | Self::NotDefined { path, .. } => Some(path),
            _ => None,
        }
    }

    /// Offending raw value, when one was recorded.
    pub fn value(&self) -> Option<&Value> {
        match self {
            Self::Conversion { value, .. } => Some(value),
            Self::Validation { value, .. } => value.as_ref(),
            _ => None,
        }
    }

    /// Underlying errors of an aggregate; empty for every other variant.
    pub fn errors(&self) -> &[ConfigError] {
        match self {
            Self::Aggregate { errors, .. } => errors,
            _ => &[],
        }
    }

    /// Keys requested by a failed multi-key read; empty otherwise.
    pub fn keys(&self) -> &[String] {
        match self {
            Self::Aggregate { keys, .. } => keys,
            _ => &[],
        }
    }

    /// Human-readable message without the variant prefix.
    pub(crate) fn detail(&self) -> String {
        match self {
            Self::Schema { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }

    pub(crate) fn conversion(path: &str, value: &Value, message: impl Into<String>) -> Self {
        Self::Conversion {
            path: path.to_string(),
            value: value.clone(),
            message: message.into(),
        }
    }

    pub(crate) fn validation(path: &str, value: Option<&Value>, message: impl Into<String>) -> Self {
        Self::Validation {
            path: path.to_string(),
            value: value.cloned(),
            message: message.into(),
        }
    }

    /// Collapse collected property errors: none is success, one is raised
    /// as-is, several are wrapped in one aggregate.
    pub(crate) fn collect(mut errors: Vec<ConfigError>) -> Result<()> {
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            count => {
                let mut message = format!("Configuration validation failed with {count} errors:");
                for error in &errors {
                    let path = error.property_path().unwrap_or("<unknown>");
                    message.push_str(&format!("\n  - {path}: {}", error.detail()));
                }
                let keys = errors
                    .iter()
                    .filter_map(|error| error.property_path().map(str::to_string))
                    .collect();
                Err(Self::Aggregate {
                    message,
                    keys,
                    errors,
                })
            }
        }
    }
}
