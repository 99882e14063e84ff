//! Schema declarations and their flattened, parsed form.
//!
//! A schema is a JSON tree: nodes carrying a `format` attribute are property
//! definitions (leaves), every other object node is a named group. Parsing
//! validates the tree and flattens it into three maps keyed by dot-joined
//! property paths.

mod structure;


use crate::{ConfigError, Result};
use log::debug;
use regex::Regex;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fs;
use std::path::Path;

/// Declared semantic type of a property.
#[derive(Debug, Clone)]
pub enum Format {
    String,
    Number,
    Boolean,
    Json,
    /// String validated against a regular expression.
    Pattern(Regex),
}

impl Format {
    /// Short name used in messages.
    pub fn name(&self) -> &'static str {
        match self {
            Format::String => "string",
            Format::Number => "number",
            Format::Boolean => "boolean",
            Format::Json => "json",
            Format::Pattern(_) => "pattern",
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Format::Pattern(regex) => write!(f, "/{}/", regex.as_str()),
            other => f.write_str(other.name()),
        }
    }
}

impl PartialEq for Format {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Format::Pattern(a), Format::Pattern(b)) => a.as_str() == b.as_str(),
            (a, b) => std::mem::discriminant(a) == std::mem::discriminant(b),
        }
    }
}

/// One leaf of the schema.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyDefinition {
    pub format: Format,
    /// Explicit environment variable binding.
    pub env: Option<String>,
    /// Declared default; `Some(Value::Null)` is an explicit null default.
    pub default: Option<Value>,
    pub description: Option<String>,
}

/// A schema declaration as supplied by the caller.
#[derive(Debug, Clone)]
pub struct Schema {
    declaration: Value,
}

impl Schema {
    /// Wrap a JSON schema declaration.
    pub fn from_value(declaration: Value) -> Self {
        Self { declaration }
    }

    /// Parse a JSON5 (or plain JSON) schema document.
    pub fn from_json5_str(contents: &str) -> Result<Self> {
        let declaration: Value = json5::from_str(contents).map_err(|err| ConfigError::Schema {
            path: "root".to_string(),
            message: format!("schema is not valid JSON5: {err}"),
        })?;
        Ok(Self::from_value(declaration))
    }

    /// Read a schema document from disk.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::File {
            path: path.to_path_buf(),
            source,
        })?;
        let declaration: Value =
            json5::from_str(&contents).map_err(|err| ConfigError::Parse {
                path: path.to_path_buf(),
                message: err.to_string(),
            })?;
        Ok(Self::from_value(declaration))
    }

    /// Raw declaration tree.
    pub fn declaration(&self) -> &Value {
        &self.declaration
    }

    /// Check the declaration for structural errors without flattening it.
    pub fn validate(&self) -> Result<()> {
        structure::validate_schema(&self.declaration)
    }

    /// Validate and flatten the declaration.
    pub fn parse(&self) -> Result<ParsedSchema> {
        self.validate()?;
        let mut parsed = ParsedSchema::default();
        structure::walk(&self.declaration, &mut |path, node| {
            let definition = structure::definition(node, path)?;
            if let Some(env) = &definition.env {
                parsed.env_mappings.insert(env.clone(), path.to_string());
            }
            if let Some(default) = &definition.default {
                parsed.defaults.insert(path.to_string(), default.clone());
            }
            parsed.properties.insert(path.to_string(), definition);
            Ok(())
        })?;
        debug!(
            "parsed schema (properties={}, env_mappings={}, defaults={})",
            parsed.properties.len(),
            parsed.env_mappings.len(),
            parsed.defaults.len()
        );
        Ok(parsed)
    }
}

impl From<Value> for Schema {
    fn from(declaration: Value) -> Self {
        Self::from_value(declaration)
    }
}

/// Flattened view of a schema, fixed for the lifetime of a store.
#[derive(Debug, Clone, Default)]
pub struct ParsedSchema {
    properties: BTreeMap<String, PropertyDefinition>,
    env_mappings: HashMap<String, String>,
    defaults: BTreeMap<String, Value>,
}

impl ParsedSchema {
    /// Property path to definition.
    pub fn properties(&self) -> &BTreeMap<String, PropertyDefinition> {
        &self.properties
    }

    /// Environment variable name to property path.
    pub fn env_mappings(&self) -> &HashMap<String, String> {
        &self.env_mappings
    }

    /// Property path to declared default.
    pub fn defaults(&self) -> &BTreeMap<String, Value> {
        &self.defaults
    }

    /// All property paths, sorted.
    pub fn paths(&self) -> Vec<&str> {
        self.properties.keys().map(String::as_str).collect()
    }

    /// True when `path` names a leaf (groups are not properties).
    pub fn has_property(&self, path: &str) -> bool {
        self.properties.contains_key(path)
    }

    /// Definition of the leaf at `path`, `None` for groups and unknown paths.
    pub fn property(&self, path: &str) -> Option<&PropertyDefinition> {
        self.properties.get(path)
    }

    /// Environment variable explicitly bound to `path`.
    pub fn env_var_for(&self, path: &str) -> Option<&str> {
        self.properties
            .get(path)
            .and_then(|definition| definition.env.as_deref())
    }
}

/// Parse a JSON declaration in one step.
pub fn parse(declaration: &Value) -> Result<ParsedSchema> {
    Schema::from_value(declaration.clone()).parse()
}

/// Structural validation of a JSON declaration.
pub fn validate(declaration: &Value) -> Result<()> {
    structure::validate_schema(declaration)
}
