use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use strata_config::{ConfigError, FileLoader, FlatMap, Result, flatten};
use tempfile::TempDir;

/// Write `value` as pretty JSON to `dir/name` and return the path.
pub fn write_json(dir: &TempDir, name: &str, value: &Value) -> PathBuf {
    let path = dir.path().join(name);
    let contents = serde_json::to_string_pretty(value).expect("serialize fixture");
    fs::write(&path, contents).expect("write fixture");
    path
}

/// File loader backed by an in-memory map of documents.
#[derive(Debug, Default)]
pub struct MemoryFileLoader {
    files: Mutex<HashMap<PathBuf, Value>>,
}

impl MemoryFileLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, path: impl AsRef<Path>, document: Value) {
        self.files
            .lock()
            .insert(path.as_ref().to_path_buf(), document);
    }
}

impl FileLoader for MemoryFileLoader {
    fn load(&self, path: &Path) -> Result<FlatMap> {
        let files = self.files.lock();
        match files.get(path) {
            Some(Value::Object(map)) => Ok(flatten(map)),
            Some(_) => Err(ConfigError::Parse {
                path: path.to_path_buf(),
                message: "expected a JSON object at the top level".to_string(),
            }),
            None => Err(ConfigError::File {
                path: path.to_path_buf(),
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
            }),
        }
    }
}
