//! Structural validation and traversal of schema declarations.

use super::{Format, PropertyDefinition};
use crate::{ConfigError, Result};
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Attributes a property definition may carry.
const LEAF_KEYS: &[&str] = &[
    "format",
    "env",
    "envVarName",
    "default",
    "defaultValue",
    "description",
];

/// Built-in format names.
const BUILTIN_FORMATS: &[&str] = &["string", "number", "boolean", "json"];

/// Validate the whole declaration, failing on the first structural error.
pub(super) fn validate_schema(declaration: &Value) -> Result<()> {
    let mut env_owners: HashMap<String, String> = HashMap::new();
    walk(declaration, &mut |path, node| {
        let definition = definition(node, path)?;
        if let Some(env) = definition.env {
            if let Some(owner) = env_owners.insert(env.clone(), path.to_string()) {
                return Err(invalid_field(
                    &join_path(path, "env"),
                    &format!("environment variable '{env}' is already bound to '{owner}'"),
                ));
            }
        }
        Ok(())
    })
}

/// Depth-first traversal calling `visit` for every leaf with its path.
pub(super) fn walk(
    declaration: &Value,
    visit: &mut dyn FnMut(&str, &Map<String, Value>) -> Result<()>,
) -> Result<()> {
    let root = expect_object(declaration, "")?;
    walk_group(root, "", visit)
}

fn walk_group(
    group: &Map<String, Value>,
    prefix: &str,
    visit: &mut dyn FnMut(&str, &Map<String, Value>) -> Result<()>,
) -> Result<()> {
    for (key, node) in group {
        validate_key(key, prefix)?;
        let path = join_path(prefix, key);
        let map = expect_object(node, &path)?;
        if map.contains_key("format") {
            visit(&path, map)?;
        } else if looks_like_leaf(map) {
            return Err(invalid_field(
                &join_path(&path, "format"),
                "missing required field",
            ));
        } else {
            walk_group(map, &path, visit)?;
        }
    }
    Ok(())
}

/// A node with scalar leaf attributes but no `format` is a broken leaf, not a group.
fn looks_like_leaf(map: &Map<String, Value>) -> bool {
    map.iter()
        .any(|(key, value)| LEAF_KEYS.contains(&key.as_str()) && !value.is_object())
}

/// Build a definition from a leaf node, validating every attribute.
pub(super) fn definition(node: &Map<String, Value>, path: &str) -> Result<PropertyDefinition> {
    ensure_allowed_keys(node, LEAF_KEYS, path)?;

    let format_value = node
        .get("format")
        .ok_or_else(|| invalid_field(&join_path(path, "format"), "missing required field"))?;
    let format = parse_format(format_value, &join_path(path, "format"))?;

    let env = match (node.get("env"), node.get("envVarName")) {
        (Some(_), Some(_)) => {
            return Err(invalid_field(
                path,
                "'env' and 'envVarName' are aliases; declare only one",
            ));
        }
        (Some(value), None) => Some(expect_env_name(value, &join_path(path, "env"))?),
        (None, Some(value)) => Some(expect_env_name(value, &join_path(path, "envVarName"))?),
        (None, None) => None,
    };

    let default = match (node.get("default"), node.get("defaultValue")) {
        (Some(_), Some(_)) => {
            return Err(invalid_field(
                path,
                "'default' and 'defaultValue' are aliases; declare only one",
            ));
        }
        (Some(value), None) | (None, Some(value)) => Some(value.clone()),
        (None, None) => None,
    };

    let description = match node.get("description") {
        Some(Value::String(text)) => Some(text.clone()),
        Some(_) => {
            return Err(invalid_field(
                &join_path(path, "description"),
                "expected string",
            ));
        }
        None => None,
    };

    Ok(PropertyDefinition {
        format,
        env,
        default,
        description,
    })
}

fn parse_format(value: &Value, path: &str) -> Result<Format> {
    match value {
        Value::String(name) => match name.as_str() {
            "string" => Ok(Format::String),
            "number" => Ok(Format::Number),
            "boolean" => Ok(Format::Boolean),
            "json" => Ok(Format::Json),
            other => Err(invalid_field(
                path,
                &format!(
                    "unknown format '{other}'; expected one of {} or a {{ \"pattern\": \"...\" }} object",
                    BUILTIN_FORMATS.join(", ")
                ),
            )),
        },
        Value::Object(map) => {
            ensure_allowed_keys(map, &["pattern"], path)?;
            let pattern_path = join_path(path, "pattern");
            let Some(Value::String(pattern)) = map.get("pattern") else {
                return Err(invalid_field(&pattern_path, "expected string"));
            };
            let regex = Regex::new(pattern).map_err(|err| {
                invalid_field(&pattern_path, &format!("invalid regular expression: {err}"))
            })?;
            Ok(Format::Pattern(regex))
        }
        other => Err(invalid_field(
            path,
            &format!(
                "format must be one of {} or a pattern object, got {other}",
                BUILTIN_FORMATS.join(", ")
            ),
        )),
    }
}

fn expect_env_name(value: &Value, path: &str) -> Result<String> {
    match value {
        Value::String(name) if !name.trim().is_empty() => Ok(name.clone()),
        Value::String(_) => Err(invalid_field(path, "environment variable name is empty")),
        _ => Err(invalid_field(path, "expected string")),
    }
}

fn validate_key(key: &str, prefix: &str) -> Result<()> {
    if key.trim().is_empty() {
        return Err(invalid_field(
            &join_path(prefix, "<empty>"),
            "keys must be non-empty strings",
        ));
    }
    if key.contains('.') {
        return Err(invalid_field(
            &join_path(prefix, key),
            "keys must not contain '.'",
        ));
    }
    Ok(())
}

/// Expect a JSON object or return a typed error.
fn expect_object<'a>(value: &'a Value, path: &str) -> Result<&'a Map<String, Value>> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(invalid_field(
            path,
            &format!("expected a group or property definition object, got {other}"),
        )),
    }
}

/// Ensure an object contains only allowed keys.
fn ensure_allowed_keys(map: &Map<String, Value>, allowed: &[&str], path: &str) -> Result<()> {
    for key in map.keys() {
        if !allowed.contains(&key.as_str()) {
            return Err(invalid_field(&join_path(path, key), "unknown key"));
        }
    }
    Ok(())
}

/// Join nested paths for better error messages.
pub(crate) fn join_path(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}.{key}")
    }
}

/// Build a structured schema error.
fn invalid_field(path: &str, message: &str) -> ConfigError {
    let normalized_path = if path.is_empty() { "root" } else { path };
    ConfigError::Schema {
        path: normalized_path.to_string(),
        message: message.to_string(),
    }
}
