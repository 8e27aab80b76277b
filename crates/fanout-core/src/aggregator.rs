//! Result aggregation.
//!
//! Turns the per-position sub-results of a finished batch into the single
//! ordered response. Individual failures are data here, never errors.

use fanout_abstraction::{SubResult, error_envelope};
use serde::{Serialize, Serializer};
use serde_json::Value;

/// Ordered response of a batch, one body per sub-request.
///
/// Serializes as the bare JSON array of bodies.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchResult {
    /// Bodies, positionally aligned with the batch's requests.
    pub responses: Vec<Value>,
    /// Positions whose status was below 400.
    pub succeeded: usize,
    /// Positions whose status was 400 or above.
    pub failed: usize,
}

impl BatchResult {
    /// Number of positions.
    pub fn len(&self) -> usize {
        self.responses.len()
    }

    /// Returns `true` for an empty result.
    pub fn is_empty(&self) -> bool {
        self.responses.is_empty()
    }

    /// Check if every sub-request succeeded.
    pub fn is_complete_success(&self) -> bool {
        self.failed == 0
    }

    /// Success rate as a percentage (0.0 to 100.0).
    #[allow(clippy::cast_precision_loss)]
    pub fn success_rate(&self) -> f64 {
        if self.responses.is_empty() {
            0.0
        } else {
            (self.succeeded as f64 / self.responses.len() as f64) * 100.0
        }
    }

    /// The response as a JSON array.
    pub fn into_value(self) -> Value {
        Value::Array(self.responses)
    }
}

impl Serialize for BatchResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.responses.serialize(serializer)
    }
}

/// Aggregator for finished sub-results.
pub struct Aggregator;

impl Aggregator {
    /// Emits each result's body in position order.
    ///
    /// Bodies pass through verbatim, including upstream error bodies. An error
    /// result without a body gets the `{statusCode, error}` envelope.
    pub fn aggregate(results: Vec<SubResult>) -> BatchResult {
        let failed = results.iter().filter(|result| result.is_error()).count();
        let succeeded = results.len() - failed;
        let responses = results.into_iter().map(Self::body_of).collect();

        BatchResult { responses, succeeded, failed }
    }

    fn body_of(result: SubResult) -> Value {
        if result.is_error() && result.body.is_null() {
            error_envelope(result.status_code)
        } else {
            result.body
        }
    }
}
