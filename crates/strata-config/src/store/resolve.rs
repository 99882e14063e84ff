//! Read-path resolution: leaves, synthesized group views, and
//! paths into stored structured values.

use super::State;
use crate::schema::ParsedSchema;
use crate::{ConfigError, Result};
use serde_json::{Map, Value};
use std::collections::BTreeSet;

/// Cache key for the whole-store view.
const ROOT_VIEW: &str = "";
const MAX_SUGGESTIONS: usize = 3;
const MAX_LISTED: usize = 5;

pub(super) fn resolve(state: &State, schema: &ParsedSchema, key: &str) -> Result<Value> {
    if let Some(entry) = state.entries.get(key) {
        return Ok(entry.value.clone());
    }
    if !key.is_empty() {
        if let Some(view) = group_view(state, key) {
            return Ok(view);
        }
        if let Some(value) = walk_stored(state, key) {
            return Ok(value);
        }
    }
    Err(not_defined(state, schema, key))
}

/// Resolve `primary`, then `fallback` when `primary` is not defined.
/// Returns the key that resolved together with its value.
pub(super) fn resolve_with_fallback(
    state: &State,
    schema: &ParsedSchema,
    primary: &str,
    fallback: Option<&str>,
) -> Result<(String, Value)> {
    let primary_err = match resolve(state, schema, primary) {
        Ok(value) => return Ok((primary.to_string(), value)),
        Err(err) if err.is_not_defined() => err,
        Err(err) => return Err(err),
    };
    let Some(fallback) = fallback else {
        return Err(primary_err);
    };
    match resolve(state, schema, fallback) {
        Ok(value) => Ok((fallback.to_string(), value)),
        Err(fallback_err) => Err(ConfigError::Aggregate {
            message: format!(
                "Neither '{primary}' nor fallback '{fallback}' could be resolved:\
                 \n  - {primary}: {primary_err}\n  - {fallback}: {fallback_err}"
            ),
            keys: vec![primary.to_string(), fallback.to_string()],
            errors: vec![primary_err, fallback_err],
        }),
    }
}

/// Nested tree of every stored key.
pub(super) fn whole_tree(state: &State) -> Value {
    if let Some(view) = state.views.lock().get(ROOT_VIEW) {
        return view.clone();
    }
    let tree = build_tree(
        state
            .entries
            .iter()
            .map(|(path, entry)| (path.as_str(), &entry.value)),
    );
    state
        .views
        .lock()
        .insert(ROOT_VIEW.to_string(), tree.clone());
    tree
}

/// Synthesize (and cache) the nested object for a group prefix.
fn group_view(state: &State, key: &str) -> Option<Value> {
    if let Some(view) = state.views.lock().get(key) {
        return Some(view.clone());
    }
    let prefix = format!("{key}.");
    let mut members = state
        .entries
        .range(prefix.clone()..)
        .take_while(|(path, _)| path.starts_with(&prefix))
        .map(|(path, entry)| (&path[prefix.len()..], &entry.value))
        .peekable();
    members.peek()?;
    let view = build_tree(members);
    state.views.lock().insert(key.to_string(), view.clone());
    Some(view)
}

/// Follow the remainder of `key` into the longest stored leaf that prefixes it.
fn walk_stored(state: &State, key: &str) -> Option<Value> {
    for (split, _) in key.rmatch_indices('.') {
        let (head, rest) = (&key[..split], &key[split + 1..]);
        let Some(entry) = state.entries.get(head) else {
            continue;
        };
        let mut current = &entry.value;
        for segment in rest.split('.') {
            current = match current {
                Value::Object(map) => map.get(segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        return Some(current.clone());
    }
    None
}

/// Explode dot-joined paths into nested objects. When a key is both a leaf
/// and a prefix of deeper keys, the deeper keys win.
pub(super) fn build_tree<'a>(pairs: impl Iterator<Item = (&'a str, &'a Value)>) -> Value {
    let mut root = Map::new();
    for (path, value) in pairs {
        let (parents, leaf) = match path.rsplit_once('.') {
            Some((parents, leaf)) => (Some(parents), leaf),
            None => (None, path),
        };
        let mut node = &mut root;
        for segment in parents.into_iter().flat_map(|parents| parents.split('.')) {
            let slot = node
                .entry(segment.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            node = ensure_object(slot);
        }
        let keep_existing = matches!(node.get(leaf), Some(Value::Object(_)));
        if !keep_existing {
            node.insert(leaf.to_string(), value.clone());
        } else if let (Some(Value::Object(existing)), Value::Object(incoming)) =
            (node.get_mut(leaf), value)
        {
            for (key, child) in incoming {
                existing.entry(key.clone()).or_insert_with(|| child.clone());
            }
        }
    }
    Value::Object(root)
}

fn ensure_object(slot: &mut Value) -> &mut Map<String, Value> {
    if !slot.is_object() {
        *slot = Value::Object(Map::new());
    }
    match slot {
        Value::Object(map) => map,
        _ => unreachable!("slot was just replaced with an object"),
    }
}

fn not_defined(state: &State, schema: &ParsedSchema, key: &str) -> ConfigError {
    let message = if let Some(definition) = schema.property(key) {
        let hint = match &definition.env {
            Some(env) => format!(
                "Set environment variable '{env}' or provide it through a configuration source."
            ),
            None => "Provide it through a configuration file, a runtime loader, or a default."
                .to_string(),
        };
        format!("Property '{key}' is defined in the schema but has no value. {hint}")
    } else {
        let known: BTreeSet<&str> = schema
            .paths()
            .into_iter()
            .chain(state.entries.keys().map(String::as_str))
            .collect();
        let needle = key.to_lowercase();
        let suggestions: Vec<&str> = known
            .iter()
            .copied()
            .filter(|path| {
                let candidate = path.to_lowercase();
                !needle.is_empty() && (candidate.contains(&needle) || needle.contains(&candidate))
            })
            .take(MAX_SUGGESTIONS)
            .collect();

        let mut message = format!("Property '{key}' is not defined.");
        if !suggestions.is_empty() {
            message.push_str(&format!(" Did you mean: {}?", suggestions.join(", ")));
        }
        if known.is_empty() {
            message.push_str(" No properties are defined.");
        } else {
            let listed: Vec<&str> = known.iter().copied().take(MAX_LISTED).collect();
            message.push_str(&format!(" Known properties: {}", listed.join(", ")));
            if known.len() > MAX_LISTED {
                message.push_str(&format!(", ...and {} more", known.len() - MAX_LISTED));
            }
        }
        message
    };
    ConfigError::NotDefined {
        path: key.to_string(),
        message,
    }
}
