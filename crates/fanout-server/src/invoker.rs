//! Invoker that forwards sub-requests to an upstream HTTP application.

use async_trait::async_trait;
use fanout_abstraction::{InvokeError, Invoker, SubRequest, SubResult};
use reqwest::{Client, Method};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use crate::config::ServerConfig;
use crate::error::{Result, ServerError};

/// Forwards each sub-request to `base_url + path`.
#[derive(Debug, Clone)]
pub struct HttpInvoker {
    client: Client,
    base_url: String,
}

impl HttpInvoker {
    /// Creates an invoker for `base_url` with a per-request timeout.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ServerError::Client(e.to_string()))?;
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self { client, base_url })
    }

    /// Creates an invoker from the server configuration.
    pub fn from_config(config: &ServerConfig) -> Result<Self> {
        Self::new(config.upstream_url.clone(), config.request_timeout())
    }

    /// Upstream base URL without a trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url_for(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }
}

#[async_trait]
impl Invoker for HttpInvoker {
    async fn invoke(&self, request: &SubRequest) -> std::result::Result<SubResult, InvokeError> {
        let method = Method::from_bytes(request.method.to_ascii_uppercase().as_bytes())
            .map_err(|_| InvokeError::InvalidRequest(format!("invalid method: {}", request.method)))?;
        let url = self.url_for(&request.path);
        debug!(method = %method, url = %url, "Forwarding sub-request");

        let mut builder = self.client.request(method, &url);
        if let Some(payload) = &request.payload {
            builder = builder.json(payload);
        }

        let response = builder.send().await.map_err(classify)?;
        let status_code = response.status().as_u16();
        let bytes = response.bytes().await.map_err(classify)?;

        Ok(SubResult::new(status_code, decode_body(&bytes)))
    }
}

fn classify(err: reqwest::Error) -> InvokeError {
    if err.is_timeout() {
        InvokeError::Timeout(err.to_string())
    } else if err.is_builder() {
        InvokeError::InvalidRequest(err.to_string())
    } else {
        InvokeError::Transport(err.to_string())
    }
}

/// Decodes an upstream body: JSON when possible, otherwise text, `null` when empty.
pub fn decode_body(bytes: &[u8]) -> Value {
    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned()))
}
