//! In-memory async loader.

use super::AsyncLoader;
use crate::{ConfigError, Result};
use async_trait::async_trait;
use serde_json::{Map, Value};

/// Serves a fixed mapping, e.g. programmatic overrides.
#[derive(Debug, Clone)]
pub struct StaticLoader {
    name: String,
    values: Map<String, Value>,
}

impl StaticLoader {
    pub fn new(name: impl Into<String>, values: Map<String, Value>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }

    /// Build from a JSON object; any other value is rejected.
    pub fn from_value(name: impl Into<String>, value: Value) -> Result<Self> {
        let name = name.into();
        match value {
            Value::Object(map) => Ok(Self::new(name, map)),
            other => Err(ConfigError::Loader {
                message: format!(
                    "expected a JSON object, got {}",
                    crate::convert::type_name(&other)
                ),
                loader: name,
            }),
        }
    }
}

#[async_trait]
impl AsyncLoader for StaticLoader {
    fn name(&self) -> &str {
        &self.name
    }

    async fn load(&self) -> Result<Map<String, Value>> {
        Ok(self.values.clone())
    }
}
