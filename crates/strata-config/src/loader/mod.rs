//! Source collaborators feeding the store.
//!
//! File loaders are synchronous and return an already flattened mapping;
//! async loaders may return nested objects, which the store flattens before
//! merging.

mod file;
#[cfg(feature = "http")]
mod http;
mod memory;


use crate::Result;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;

pub use file::JsonFileLoader;
#[cfg(feature = "http")]
pub use http::HttpLoader;
pub use memory::StaticLoader;

/// Flat mapping from dot-joined property path to raw value.
pub type FlatMap = BTreeMap<String, Value>;

/// Synchronous file source.
pub trait FileLoader: Send + Sync {
    /// Read `path` and return its flattened key/value pairs.
    ///
    /// Unreadable files fail with [`ConfigError::File`](crate::ConfigError::File),
    /// malformed contents with [`ConfigError::Parse`](crate::ConfigError::Parse).
    fn load(&self, path: &Path) -> Result<FlatMap>;
}

/// Asynchronous runtime source (network, API, secrets backend, ...).
#[async_trait]
pub trait AsyncLoader: Send + Sync {
    /// Label used in logs and error messages.
    fn name(&self) -> &str {
        "async"
    }

    /// Fetch a flat or nested mapping of raw values.
    async fn load(&self) -> Result<Map<String, Value>>;
}

/// Flatten nested objects into dot-joined paths.
///
/// Arrays and empty objects are kept whole at their path.
pub fn flatten(map: &Map<String, Value>) -> FlatMap {
    let mut flat = FlatMap::new();
    flatten_into(map, "", &mut flat);
    flat
}

fn flatten_into(map: &Map<String, Value>, prefix: &str, flat: &mut FlatMap) {
    for (key, value) in map {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        match value {
            Value::Object(child) if !child.is_empty() => flatten_into(child, &path, flat),
            other => {
                flat.insert(path, other.clone());
            }
        }
    }
}
