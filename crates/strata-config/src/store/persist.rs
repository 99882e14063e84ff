//! Persisting the store (or a sub-tree) to JSON or env files.

use super::{ConfigStore, resolve};
use crate::loader::flatten;
use crate::{ConfigError, Result};
use log::{debug, info, warn};
use serde_json::Value;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

/// Serialisation used by [`ConfigStore::async_write`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Pretty-printed JSON with two-space indentation.
    #[default]
    Json,
    /// `KEY=value` lines, sorted by key.
    Env,
}

/// Where and what to write.
#[derive(Debug, Clone)]
pub struct WriteOptions {
    /// Destination directory; created when missing.
    pub dir: PathBuf,
    pub file_name: String,
    pub format: OutputFormat,
    /// Key of the sub-tree to write; the whole store when unset.
    pub select: Option<String>,
    /// Key used when `select` is not defined.
    pub fallback: Option<String>,
}

impl WriteOptions {
    pub fn new(dir: impl AsRef<Path>, file_name: impl Into<String>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            file_name: file_name.into(),
            format: OutputFormat::Json,
            select: None,
            fallback: None,
        }
    }

    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_select(mut self, key: impl Into<String>) -> Self {
        self.select = Some(key.into());
        self
    }

    pub fn with_fallback(mut self, key: impl Into<String>) -> Self {
        self.fallback = Some(key.into());
        self
    }
}

impl ConfigStore {
    /// Write the store, or the selected sub-tree, to `dir/file_name`.
    ///
    /// The file is replaced atomically through a temporary file in the same
    /// directory. Writes to the same destination are serialised; writes to
    /// different destinations run independently. Returns the destination.
    pub async fn async_write(&self, options: WriteOptions) -> Result<PathBuf> {
        let requested = options.dir.join(&options.file_name);
        let destination = std::path::absolute(&requested)
            .map(|path| normalize(&path))
            .map_err(|source| ConfigError::Write {
                path: requested,
                source,
            })?;

        let queue = self.write_queue(&destination);
        let guard = queue.lock().await;
        let result = self.write_locked(&options, &destination).await;
        drop(guard);
        self.release_write_queue(&destination, queue);

        result.map(|()| destination)
    }

    async fn write_locked(&self, options: &WriteOptions, destination: &Path) -> Result<()> {
        let (label, selected) = self.snapshot(options)?;
        let contents = match options.format {
            OutputFormat::Json => {
                let mut text =
                    serde_json::to_string_pretty(&selected).map_err(|err| ConfigError::Write {
                        path: destination.to_path_buf(),
                        source: io::Error::other(err),
                    })?;
                text.push('\n');
                text
            }
            OutputFormat::Env => render_env(&selected, label.as_deref()),
        };
        write_atomic(destination, contents.as_bytes()).await?;
        info!(
            "config written (path={}, format={:?}, select={})",
            destination.display(),
            options.format,
            label.as_deref().unwrap_or("<all>")
        );
        Ok(())
    }

    /// Read the selection under the state lock; the lock is released before any I/O.
    fn snapshot(&self, options: &WriteOptions) -> Result<(Option<String>, Value)> {
        let state = self.state.read();
        match (&options.select, &options.fallback) {
            (Some(select), fallback) => {
                let (key, value) = resolve::resolve_with_fallback(
                    &state,
                    &self.schema,
                    select,
                    fallback.as_deref(),
                )?;
                Ok((Some(key), value))
            }
            (None, _) => Ok((None, resolve::whole_tree(&state))),
        }
    }

    pub(super) fn write_queue(&self, destination: &Path) -> Arc<tokio::sync::Mutex<()>> {
        self.write_queues
            .lock()
            .entry(destination.to_path_buf())
            .or_default()
            .clone()
    }

    /// Drop the queue for `destination` once no other writer holds it.
    pub(super) fn release_write_queue(&self, destination: &Path, queue: Arc<tokio::sync::Mutex<()>>) {
        let mut queues = self.write_queues.lock();
        drop(queue);
        if queues
            .get(destination)
            .is_some_and(|existing| Arc::strong_count(existing) == 1)
        {
            queues.remove(destination);
        }
    }
}

/// Drop `.` and resolve `..` lexically so every spelling of a destination
/// shares one write queue.
pub(crate) fn normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let last = normalized.components().next_back();
                let at_root = matches!(last, Some(Component::RootDir | Component::Prefix(_)));
                let can_pop = matches!(last, Some(Component::Normal(_)));
                if can_pop {
                    normalized.pop();
                } else if !at_root {
                    normalized.push(component);
                }
            }
            other => normalized.push(other),
        }
    }
    normalized
}

/// Render `KEY=value` lines for every leaf of `selected`.
///
/// A scalar selection is written as a single line named after `label`.
pub(crate) fn render_env(selected: &Value, label: Option<&str>) -> String {
    let mut lines: Vec<(String, String)> = match selected {
        Value::Object(map) => flatten(map)
            .iter()
            .map(|(path, value)| (env_key(path), env_value(value)))
            .collect(),
        scalar => vec![(env_key(label.unwrap_or("value")), env_value(scalar))],
    };
    lines.sort();
    lines
        .into_iter()
        .map(|(key, value)| format!("{key}={value}\n"))
        .collect()
}

fn env_key(path: &str) -> String {
    path.to_uppercase().replace('.', "_")
}

fn env_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => {
            if text
                .chars()
                .any(|c| c.is_whitespace() || matches!(c, '"' | '\'' | '\\'))
            {
                let escaped = text
                    .replace('\\', "\\\\")
                    .replace('"', "\\\"")
                    .replace('\n', "\\n")
                    .replace('\r', "\\r");
                format!("\"{escaped}\"")
            } else {
                text.clone()
            }
        }
        Value::Number(number) => crate::convert::number_text(number),
        other => other.to_string(),
    }
}

/// Write through a uniquely named temporary file and rename it into place.
async fn write_atomic(destination: &Path, contents: &[u8]) -> Result<()> {
    let write_error = |source| ConfigError::Write {
        path: destination.to_path_buf(),
        source,
    };
    let dir = destination
        .parent()
        .ok_or_else(|| write_error(io::Error::other("destination has no parent directory")))?;
    tokio::fs::create_dir_all(dir).await.map_err(write_error)?;

    let file_name = destination
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "config".to_string());
    let temp_path = dir.join(format!(".{file_name}.{}.tmp", Uuid::new_v4()));
    debug!(
        "writing temporary config file (path={})",
        temp_path.display()
    );

    let outcome = match tokio::fs::write(&temp_path, contents).await {
        Ok(()) => tokio::fs::rename(&temp_path, destination).await,
        Err(err) => Err(err),
    };
    if let Err(source) = outcome {
        if let Err(cleanup) = tokio::fs::remove_file(&temp_path).await {
            if cleanup.kind() != io::ErrorKind::NotFound {
                warn!(
                    "failed to remove temporary config file (path={}): {cleanup}",
                    temp_path.display()
                );
            }
        }
        return Err(write_error(source));
    }
    Ok(())
}
