//! JSON file loader.

use super::{FileLoader, FlatMap, flatten};
use crate::{ConfigError, Result};
use log::debug;
use serde_json::Value;
use std::fs;
use std::path::Path;

/// Reads JSON (or JSON5) documents whose top level is an object.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonFileLoader;

impl FileLoader for JsonFileLoader {
    fn load(&self, path: &Path) -> Result<FlatMap> {
        debug!("loading config file (path={})", path.display());
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::File {
            path: path.to_path_buf(),
            source,
        })?;
        let value: Value = json5::from_str(&contents).map_err(|err| ConfigError::Parse {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?;
        let Value::Object(map) = value else {
            return Err(ConfigError::Parse {
                path: path.to_path_buf(),
                message: "expected a JSON object at the top level".to_string(),
            });
        };
        let flat = flatten(&map);
        debug!(
            "loaded config file (path={}, keys={})",
            path.display(),
            flat.len()
        );
        Ok(flat)
    }
}
