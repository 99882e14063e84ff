use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use strata_config::{AsyncLoader, ConfigError, Result};

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("loader fixtures must be objects, got {other}"),
    }
}

/// Returns a fixed mapping, optionally after a delay.
#[derive(Debug, Clone)]
pub struct FixedLoader {
    name: String,
    values: Map<String, Value>,
    delay: Duration,
}

impl FixedLoader {
    pub fn new(name: impl Into<String>, values: Value) -> Self {
        Self {
            name: name.into(),
            values: object(values),
            delay: Duration::ZERO,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn shared(self) -> Arc<dyn AsyncLoader> {
        Arc::new(self)
    }
}

#[async_trait]
impl AsyncLoader for FixedLoader {
    fn name(&self) -> &str {
        &self.name
    }

    async fn load(&self) -> Result<Map<String, Value>> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(self.values.clone())
    }
}

/// Always rejects with a loader error.
#[derive(Debug, Clone)]
pub struct FailingLoader {
    name: String,
    message: String,
}

impl FailingLoader {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
        }
    }

    pub fn shared(self) -> Arc<dyn AsyncLoader> {
        Arc::new(self)
    }
}

#[async_trait]
impl AsyncLoader for FailingLoader {
    fn name(&self) -> &str {
        &self.name
    }

    async fn load(&self) -> Result<Map<String, Value>> {
        Err(ConfigError::Loader {
            loader: self.name.clone(),
            message: self.message.clone(),
        })
    }
}

/// Ordered record of loader activity shared between loaders.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<String>>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, event: impl Into<String>) {
        self.events.lock().push(event.into());
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }
}

/// Wraps a [`FixedLoader`] and records `<name>:start` / `<name>:end`.
#[derive(Debug, Clone)]
pub struct RecordingLoader {
    inner: FixedLoader,
    log: EventLog,
}

impl RecordingLoader {
    pub fn new(inner: FixedLoader, log: &EventLog) -> Self {
        Self {
            inner,
            log: log.clone(),
        }
    }

    pub fn shared(self) -> Arc<dyn AsyncLoader> {
        Arc::new(self)
    }
}

#[async_trait]
impl AsyncLoader for RecordingLoader {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn load(&self) -> Result<Map<String, Value>> {
        self.log.push(format!("{}:start", self.inner.name()));
        let values = self.inner.load().await;
        self.log.push(format!("{}:end", self.inner.name()));
        values
    }
}
