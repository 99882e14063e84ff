//! The configuration store: layering, validation and reads.
//!
//! Sources are merged in increasing precedence: schema defaults, the
//! constructor file, environment variables, then runtime sources
//! (`load`/`async_load`), with environment variables re-applied after every
//! runtime merge so they always win. Every mutation is staged on a copy of
//! the flat store, validated in full, and committed only on success.

mod persist;
mod resolve;

#[cfg(test)]
mod tests;

pub use persist::{OutputFormat, WriteOptions};

use crate::convert::convert;
use crate::env::EnvSource;
use crate::loader::{AsyncLoader, FileLoader, FlatMap, JsonFileLoader, flatten};
use crate::schema::{Format, ParsedSchema, Schema};
use crate::{ConfigError, Result};
use log::{debug, info, warn};
use parking_lot::{Mutex, RwLock};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Where the current value of a stored key came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin {
    /// Schema default.
    Default,
    /// A file loaded at construction or through `load`.
    File(PathBuf),
    /// The named environment variable.
    Env(String),
    /// The named async loader.
    Runtime(String),
}

/// Options for building a [`ConfigStore`].
#[derive(Clone)]
pub struct StoreOptions {
    /// Schema declaration.
    pub schema: Schema,
    /// File merged on top of defaults at construction.
    pub file: Option<PathBuf>,
    /// Environment to read bindings from; the process environment when unset.
    pub env: Option<EnvSource>,
    /// Loader used for `file` and `load`; [`JsonFileLoader`] when unset.
    pub file_loader: Option<Arc<dyn FileLoader>>,
    /// Reject stored keys the schema does not declare.
    pub strict_keys: bool,
}

impl StoreOptions {
    pub fn new(schema: impl Into<Schema>) -> Self {
        Self {
            schema: schema.into(),
            file: None,
            env: None,
            file_loader: None,
            strict_keys: false,
        }
    }

    /// Merge a file on top of defaults at construction.
    pub fn with_file(mut self, path: impl AsRef<Path>) -> Self {
        self.file = Some(path.as_ref().to_path_buf());
        self
    }

    /// Inject the environment instead of reading the process environment.
    pub fn with_env(mut self, env: EnvSource) -> Self {
        self.env = Some(env);
        self
    }

    /// Replace the JSON file loader.
    pub fn with_file_loader(mut self, loader: Arc<dyn FileLoader>) -> Self {
        self.file_loader = Some(loader);
        self
    }

    /// Treat undeclared keys as validation errors.
    pub fn with_strict_keys(mut self, strict: bool) -> Self {
        self.strict_keys = strict;
        self
    }
}

impl fmt::Debug for StoreOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreOptions")
            .field("file", &self.file)
            .field("env_vars", &self.env.as_ref().map(EnvSource::len))
            .field("custom_file_loader", &self.file_loader.is_some())
            .field("strict_keys", &self.strict_keys)
            .finish()
    }
}

/// One stored value with its provenance.
#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    origin: Origin,
    /// Already passed conversion; skipped by later validation passes.
    converted: bool,
}

type Entries = BTreeMap<String, Entry>;

/// Committed store contents plus the derived nested-view cache.
#[derive(Debug, Default)]
struct State {
    entries: Entries,
    views: Mutex<HashMap<String, Value>>,
}

/// Validated, typed configuration assembled from layered sources.
pub struct ConfigStore {
    schema: ParsedSchema,
    env: EnvSource,
    file_loader: Arc<dyn FileLoader>,
    strict_keys: bool,
    state: RwLock<State>,
    /// FIFO queue totally ordering `async_load` calls.
    load_queue: tokio::sync::Mutex<()>,
    /// Per-destination queues serialising `async_write` calls.
    write_queues: Mutex<HashMap<PathBuf, Arc<tokio::sync::Mutex<()>>>>,
}

impl fmt::Debug for ConfigStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigStore")
            .field("properties", &self.schema.properties().len())
            .field("keys", &self.state.read().entries.len())
            .field("strict_keys", &self.strict_keys)
            .finish()
    }
}

impl ConfigStore {
    /// Parse the schema, layer defaults, file and environment, and validate.
    pub fn new(options: StoreOptions) -> Result<Self> {
        let schema = options.schema.parse()?;
        let env = options.env.unwrap_or_else(EnvSource::from_process);
        let file_loader = options
            .file_loader
            .unwrap_or_else(|| Arc::new(JsonFileLoader));
        let store = Self {
            schema,
            env,
            file_loader,
            strict_keys: options.strict_keys,
            state: RwLock::new(State::default()),
            load_queue: tokio::sync::Mutex::new(()),
            write_queues: Mutex::new(HashMap::new()),
        };

        let mut entries = store.default_entries();
        if let Some(path) = &options.file {
            let layer = store.file_loader.load(path)?;
            merge(&mut entries, layer, &Origin::File(path.clone()));
        }
        store.apply_env(&mut entries);
        store.validate(&mut entries).inspect_err(|err| {
            warn!("config store construction rejected (kind={:?})", err.kind());
        })?;

        info!(
            "config store ready (properties={}, keys={}, file={})",
            store.schema.properties().len(),
            entries.len(),
            options
                .file
                .as_ref()
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "none".to_string())
        );
        store.commit(&mut store.state.write(), entries);
        Ok(store)
    }

    /// Parsed schema backing this store.
    pub fn schema(&self) -> &ParsedSchema {
        &self.schema
    }

    /// Whole store as a nested tree.
    pub fn get_all(&self) -> Value {
        let state = self.state.read();
        resolve::whole_tree(&state)
    }

    /// Resolve a leaf, a group, or a path into a stored structured value.
    pub fn get(&self, key: &str) -> Result<Value> {
        let state = self.state.read();
        resolve::resolve(&state, &self.schema, key)
    }

    /// Resolve several keys, reporting every failing key at once.
    pub fn get_many(&self, keys: &[&str]) -> Result<Map<String, Value>> {
        let state = self.state.read();
        let mut resolved = Map::new();
        let mut errors = Vec::new();
        let mut seen = HashSet::new();
        for key in keys {
            if !seen.insert(*key) {
                continue;
            }
            match resolve::resolve(&state, &self.schema, key) {
                Ok(value) => {
                    resolved.insert((*key).to_string(), value);
                }
                Err(err) => errors.push(err),
            }
        }
        if errors.is_empty() {
            return Ok(resolved);
        }
        let mut message = format!(
            "Failed to resolve {} of {} requested keys:",
            errors.len(),
            seen.len()
        );
        for error in &errors {
            let path = error.property_path().unwrap_or("<unknown>");
            message.push_str(&format!("\n  - {path}: {error}"));
        }
        Err(ConfigError::Aggregate {
            message,
            keys: keys.iter().map(|key| (*key).to_string()).collect(),
            errors,
        })
    }

    /// Resolve `primary`, falling back to `fallback` when `primary` is not defined.
    pub fn try_get(&self, primary: &str, fallback: &str) -> Result<Value> {
        let state = self.state.read();
        resolve::resolve_with_fallback(&state, &self.schema, primary, Some(fallback))
            .map(|(_, value)| value)
    }

    /// Resolve `key` and deserialize it into `T`.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        let value = self.get(key)?;
        T::deserialize(&value).map_err(|err| {
            ConfigError::conversion(
                key,
                &value,
                format!("Cannot deserialize property '{key}': {err}"),
            )
        })
    }

    /// True when `get(key)` would succeed.
    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_ok()
    }

    /// Stored flat keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        self.state.read().entries.keys().cloned().collect()
    }

    /// Source that supplied the stored value of a flat key.
    pub fn origin(&self, key: &str) -> Option<Origin> {
        self.state
            .read()
            .entries
            .get(key)
            .map(|entry| entry.origin.clone())
    }

    /// Merge a file on top of the store, re-assert the environment and validate.
    pub fn load(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        info!("loading config file into store (path={})", path.display());
        let layer = self.file_loader.load(path)?;

        let mut state = self.state.write();
        let mut staging = state.entries.clone();
        merge(&mut staging, layer, &Origin::File(path.to_path_buf()));
        self.apply_env(&mut staging);
        self.validate(&mut staging).inspect_err(|err| {
            warn!(
                "config load rejected (path={}, kind={:?})",
                path.display(),
                err.kind()
            );
        })?;
        self.commit(&mut state, staging);
        Ok(())
    }

    /// Run async loaders in order and merge their results.
    ///
    /// Calls on the same store are totally ordered: a call awaits every
    /// earlier call, its loaders run one after another, and the first
    /// failing loader aborts the call without running the rest.
    pub async fn async_load(&self, loaders: &[Arc<dyn AsyncLoader>]) -> Result<()> {
        let _queue = self.load_queue.lock().await;
        let mut layers = Vec::with_capacity(loaders.len());
        for loader in loaders {
            debug!("running async loader (loader={})", loader.name());
            let values = loader.load().await.inspect_err(|err| {
                warn!(
                    "async loader failed (loader={}, kind={:?})",
                    loader.name(),
                    err.kind()
                );
            })?;
            layers.push((loader.name().to_string(), flatten(&values)));
        }

        let mut state = self.state.write();
        let mut staging = state.entries.clone();
        for (name, layer) in layers {
            merge(&mut staging, layer, &Origin::Runtime(name));
            self.apply_env(&mut staging);
        }
        self.validate(&mut staging).inspect_err(|err| {
            warn!("async load rejected (kind={:?})", err.kind());
        })?;
        self.commit(&mut state, staging);
        info!("async load committed (loaders={})", loaders.len());
        Ok(())
    }

    /// Seed entries from schema defaults.
    ///
    /// Structured defaults of `json` properties are already parsed values
    /// and are marked converted, so they are kept until another source
    /// overwrites them.
    fn default_entries(&self) -> Entries {
        self.schema
            .defaults()
            .iter()
            .map(|(path, default)| {
                let converted = matches!(
                    self.schema.property(path).map(|definition| &definition.format),
                    Some(Format::Json)
                ) && !default.is_string();
                let entry = Entry {
                    value: default.clone(),
                    origin: Origin::Default,
                    converted,
                };
                (path.clone(), entry)
            })
            .collect()
    }

    /// Overwrite bound properties with values from the environment.
    fn apply_env(&self, entries: &mut Entries) {
        for (var, path) in self.schema.env_mappings() {
            if let Some(value) = self.env.get(var) {
                entries.insert(
                    path.clone(),
                    Entry {
                        value: Value::String(value.to_string()),
                        origin: Origin::Env(var.clone()),
                        converted: false,
                    },
                );
            }
        }
    }

    /// Validate and convert every declared property, aggregating failures.
    fn validate(&self, entries: &mut Entries) -> Result<()> {
        let mut errors = Vec::new();
        for (path, definition) in self.schema.properties() {
            match entries.get_mut(path) {
                None if self.schema.defaults().contains_key(path) => {}
                None => errors.push(self.missing(path)),
                Some(entry) if entry.converted => {}
                Some(entry) => match convert(&entry.value, &definition.format, path) {
                    Ok(value) => {
                        entry.value = value;
                        entry.converted = true;
                    }
                    Err(err) => errors.push(err),
                },
            }
        }
        if self.strict_keys {
            for (key, entry) in entries.iter() {
                if !self.schema.has_property(key) {
                    errors.push(ConfigError::validation(
                        key,
                        Some(&entry.value),
                        format!("Unknown property '{key}' is not declared in the schema"),
                    ));
                }
            }
        }
        ConfigError::collect(errors)
    }

    fn missing(&self, path: &str) -> ConfigError {
        let hint = match self.schema.env_var_for(path) {
            Some(env) => format!("Set environment variable '{env}' or provide a default."),
            None => "Provide it through a configuration file, a runtime loader, or a default."
                .to_string(),
        };
        ConfigError::validation(
            path,
            None,
            format!("Required property '{path}' is not set. {hint}"),
        )
    }

    /// Replace the committed entries and drop every cached nested view.
    fn commit(&self, state: &mut State, entries: Entries) {
        state.entries = entries;
        state.views.get_mut().clear();
        debug!("config store committed (keys={})", state.entries.len());
    }
}

/// Merge a flat layer on top of `entries`; later values win per path.
fn merge(entries: &mut Entries, layer: FlatMap, origin: &Origin) {
    for (path, value) in layer {
        entries.insert(
            path,
            Entry {
                value,
                origin: origin.clone(),
                converted: false,
            },
        );
    }
}
