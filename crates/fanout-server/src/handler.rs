//! Maps HTTP requests on the batch route onto the batch executor.

use fanout_abstraction::{Invoker, SubResult};
use fanout_core::BatchExecutor;
use http::{Method, StatusCode};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::ServerConfig;

/// Batch route handler, independent of the transport.
#[derive(Debug, Clone)]
pub struct BatchHandler {
    executor: Arc<BatchExecutor>,
    batch_path: String,
}

impl BatchHandler {
    /// Creates a handler serving `batch_path`.
    pub fn new(executor: Arc<BatchExecutor>, batch_path: impl Into<String>) -> Self {
        Self { executor, batch_path: batch_path.into() }
    }

    /// Creates a handler and executor from the server configuration.
    pub fn from_config(config: &ServerConfig, invoker: Arc<dyn Invoker>) -> Self {
        let executor = BatchExecutor::new(invoker, config.batch.clone());
        Self::new(Arc::new(executor), config.batch_path.clone())
    }

    /// Route served by this handler.
    pub fn batch_path(&self) -> &str {
        &self.batch_path
    }

    /// Handles one request and returns the response status and JSON body.
    ///
    /// Only `POST <batch_path>` is served. Malformed JSON and batch-level
    /// errors are answered with 400 before anything is dispatched; a batch
    /// that runs is always answered with 200, whatever its sub-results.
    pub async fn handle(&self, method: &Method, path: &str, body: &[u8]) -> (StatusCode, Value) {
        if path != self.batch_path {
            return envelope(StatusCode::NOT_FOUND, "");
        }
        if *method != Method::POST {
            return envelope(StatusCode::METHOD_NOT_ALLOWED, format!("Use POST for {}", path));
        }

        let payload: Value = match serde_json::from_slice(body) {
            Ok(payload) => payload,
            Err(e) => {
                debug!(error = %e, "Invalid JSON payload");
                return envelope(StatusCode::BAD_REQUEST, format!("Invalid JSON payload: {}", e));
            }
        };

        match self.executor.run_value(payload).await {
            Ok(result) => (StatusCode::OK, result.into_value()),
            Err(err) => {
                warn!(error = %err, "Batch rejected");
                envelope(StatusCode::BAD_REQUEST, err.to_string())
            }
        }
    }
}

fn envelope(status: StatusCode, message: impl Into<String>) -> (StatusCode, Value) {
    (status, SubResult::error(status.as_u16(), message).body)
}
