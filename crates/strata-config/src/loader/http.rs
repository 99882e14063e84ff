//! HTTP loader fetching a JSON object from an endpoint.

use super::AsyncLoader;
use crate::{ConfigError, Result};
use async_trait::async_trait;
use log::{debug, info};
use serde_json::{Map, Value};

/// GETs a URL and expects a JSON object body.
#[derive(Debug, Clone)]
pub struct HttpLoader {
    name: String,
    url: String,
    headers: Vec<(String, String)>,
    client: reqwest::Client,
}

impl HttpLoader {
    pub fn new(url: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            name: url.clone(),
            url,
            headers: Vec::new(),
            client: reqwest::Client::new(),
        }
    }

    /// Label used in logs and errors instead of the URL.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Add a request header (e.g. authorization).
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Reuse an existing client (timeouts, proxies, TLS settings).
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    fn error(&self, message: String) -> ConfigError {
        ConfigError::Loader {
            loader: self.name.clone(),
            message,
        }
    }
}

#[async_trait]
impl AsyncLoader for HttpLoader {
    fn name(&self) -> &str {
        &self.name
    }

    async fn load(&self) -> Result<Map<String, Value>> {
        info!("fetching config (loader={})", self.name);
        let mut request = self.client.get(&self.url);
        for (name, value) in &self.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        let response = request
            .send()
            .await
            .map_err(|err| self.error(format!("request to {} failed: {err}", self.url)))?;
        let status = response.status();
        if !status.is_success() {
            return Err(self.error(format!(
                "request to {} returned HTTP {status}",
                self.url
            )));
        }
        let body: Value = response
            .json()
            .await
            .map_err(|err| self.error(format!("response is not valid JSON: {err}")))?;
        match body {
            Value::Object(map) => {
                debug!(
                    "fetched config (loader={}, keys={})",
                    self.name,
                    map.len()
                );
                Ok(map)
            }
            other => Err(self.error(format!(
                "expected a JSON object, got {}",
                crate::convert::type_name(&other)
            ))),
        }
    }
}
