//! Batch definitions and validation.

use fanout_abstraction::SubRequest;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ValidationError;

/// A caller-submitted group of sub-requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSpec {
    /// Execution mode override. `None` defers to the executor's configuration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parallel: Option<bool>,
    /// Sub-requests in submission order.
    pub requests: Vec<SubRequest>,
}

impl BatchSpec {
    /// Creates a batch that uses the executor's default mode.
    pub fn new(requests: Vec<SubRequest>) -> Self {
        Self { parallel: None, requests }
    }

    /// Forces the execution mode.
    #[must_use]
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = Some(parallel);
        self
    }

    /// Builds a validated batch from a decoded request body.
    ///
    /// `null` is treated the same as an absent field.
    pub fn from_value(value: Value) -> Result<Self, ValidationError> {
        let Value::Object(mut body) = value else {
            return Err(ValidationError::NotAnObject);
        };

        let parallel = match body.remove("parallel") {
            None | Some(Value::Null) => None,
            Some(Value::Bool(parallel)) => Some(parallel),
            Some(_) => return Err(ValidationError::InvalidParallel),
        };

        let items = match body.remove("requests") {
            None | Some(Value::Null) => return Err(ValidationError::MissingRequests),
            Some(Value::Array(items)) => items,
            Some(_) => return Err(ValidationError::RequestsNotArray),
        };
        if items.is_empty() {
            return Err(ValidationError::EmptyRequests);
        }

        let requests = items
            .into_iter()
            .enumerate()
            .map(|(index, item)| match item {
                Value::Object(fields) => parse_request(index, fields),
                _ => Err(ValidationError::RequestNotObject { index }),
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { parallel, requests })
    }

    /// Checks the invariants of a batch built in code.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.requests.is_empty() {
            return Err(ValidationError::EmptyRequests);
        }
        for (index, request) in self.requests.iter().enumerate() {
            if request.path.is_empty() {
                return Err(ValidationError::MissingPath { index });
            }
            if request.method.is_empty() {
                return Err(ValidationError::InvalidField {
                    index,
                    field: "method",
                    expected: "string",
                });
            }
        }
        Ok(())
    }

    /// Number of sub-requests.
    pub fn len(&self) -> usize {
        self.requests.len()
    }

    /// Returns `true` when there are no sub-requests.
    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}

fn parse_request(index: usize, mut fields: Map<String, Value>) -> Result<SubRequest, ValidationError> {
    let path = match fields.remove("path") {
        None | Some(Value::Null) => return Err(ValidationError::MissingPath { index }),
        Some(Value::String(path)) if !path.is_empty() => path,
        Some(_) => {
            return Err(ValidationError::InvalidField { index, field: "path", expected: "string" });
        }
    };

    let mut request = SubRequest::new(path);
    match fields.remove("method") {
        None | Some(Value::Null) => {}
        Some(Value::String(method)) if !method.is_empty() => request.method = method,
        Some(_) => {
            return Err(ValidationError::InvalidField {
                index,
                field: "method",
                expected: "string",
            });
        }
    }

    request.payload = fields.remove("payload").filter(|payload| !payload.is_null());
    Ok(request)
}
