//! Invoker abstraction layer for fanout.
//!
//! This crate defines the seam between the batch coordination engine and
//! whatever actually executes a sub-request. The engine only ever talks to an
//! [`Invoker`]; routing a path to behavior is entirely the invoker's business.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;

/// Represents an error raised by an invoker while executing a sub-request.
///
/// Invoker errors never abort a batch. The scheduler reifies them as a
/// [`SubResult`] carrying [`InvokeError::status_code`].
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvokeError {
    /// The sub-request could not be turned into a call (e.g., unknown method).
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The call failed in transit (connection refused, reset, bad upstream).
    #[error("Transport error: {0}")]
    Transport(String),

    /// The call did not complete in time.
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// Other unexpected errors.
    #[error("Invoker error: {0}")]
    Other(String),
}

impl InvokeError {
    /// HTTP status used when this error is reported as a sub-result.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidRequest(_) => 400,
            Self::Transport(_) => 502,
            Self::Timeout(_) => 504,
            Self::Other(_) => 500,
        }
    }
}

fn default_method() -> String {
    "get".to_string()
}

/// One element of a batch: a method, an address and an optional payload.
///
/// `path` and every string leaf of `payload` may carry reference tokens of the
/// form `$$<index>.<property-path>` until the engine substitutes them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubRequest {
    /// Method name, case-insensitive. Defaults to `"get"`.
    #[serde(default = "default_method")]
    pub method: String,
    /// Address of the sub-request, e.g. `/users/$$0.id/messages`.
    pub path: String,
    /// Optional structured payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl SubRequest {
    /// Creates a `get` sub-request for `path` without a payload.
    pub fn new(path: impl Into<String>) -> Self {
        Self { method: default_method(), path: path.into(), payload: None }
    }

    /// Replaces the method.
    #[must_use]
    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }

    /// Replaces the payload.
    #[must_use]
    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }
}

/// The outcome of dispatching one [`SubRequest`].
///
/// A status of 400 or above marks an error result, which is still an ordinary
/// value as far as the batch is concerned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubResult {
    /// HTTP-style status code.
    pub status_code: u16,
    /// Response body.
    #[serde(default)]
    pub body: Value,
}

impl SubResult {
    /// Creates a result with an explicit status.
    pub fn new(status_code: u16, body: Value) -> Self {
        Self { status_code, body }
    }

    /// Creates a `200` result.
    pub fn ok(body: Value) -> Self {
        Self::new(200, body)
    }

    /// Creates an error result whose body is the standard error envelope.
    pub fn error(status_code: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        let mut body = error_envelope(status_code);
        if !message.is_empty() {
            body["message"] = Value::String(message);
        }
        Self::new(status_code, body)
    }

    /// Returns `true` for statuses of 400 and above.
    pub fn is_error(&self) -> bool {
        self.status_code >= 400
    }
}

impl From<InvokeError> for SubResult {
    fn from(err: InvokeError) -> Self {
        Self::error(err.status_code(), err.to_string())
    }
}

/// Returns the reason phrase for a status, e.g. `"Not Found"` for 404.
pub fn reason_phrase(status_code: u16) -> &'static str {
    http::StatusCode::from_u16(status_code)
        .ok()
        .and_then(|status| status.canonical_reason())
        .unwrap_or("Unknown")
}

/// Builds the `{ "statusCode": .., "error": .. }` envelope for a status.
pub fn error_envelope(status_code: u16) -> Value {
    json!({
        "statusCode": status_code,
        "error": reason_phrase(status_code),
    })
}

/// A capability that executes a single sub-request.
///
/// All invokers must be `Send + Sync` so one instance can serve concurrent
/// dispatches from the scheduler.
#[async_trait]
pub trait Invoker: Send + Sync {
    /// Executes `request` and returns its outcome.
    ///
    /// # Errors
    /// Returns an `InvokeError` when the call could not be made or completed.
    /// A completed call with an error status is an `Ok` value.
    async fn invoke(&self, request: &SubRequest) -> Result<SubResult, InvokeError>;
}

#[async_trait]
impl<T: Invoker + ?Sized> Invoker for Arc<T> {
    async fn invoke(&self, request: &SubRequest) -> Result<SubResult, InvokeError> {
        (**self).invoke(request).await
    }
}

#[async_trait]
impl<T: Invoker + ?Sized> Invoker for Box<T> {
    async fn invoke(&self, request: &SubRequest) -> Result<SubResult, InvokeError> {
        (**self).invoke(request).await
    }
}

/// Adapts an async closure into an [`Invoker`].
#[derive(Clone)]
pub struct FnInvoker<F> {
    f: F,
}

impl<F> FnInvoker<F> {
    /// Wraps `f`, which receives an owned copy of each sub-request.
    pub const fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> std::fmt::Debug for FnInvoker<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnInvoker").finish_non_exhaustive()
    }
}

#[async_trait]
impl<F, Fut> Invoker for FnInvoker<F>
where
    F: Fn(SubRequest) -> Fut + Send + Sync,
    Fut: Future<Output = Result<SubResult, InvokeError>> + Send,
{
    async fn invoke(&self, request: &SubRequest) -> Result<SubResult, InvokeError> {
        (self.f)(request.clone()).await
    }
}
