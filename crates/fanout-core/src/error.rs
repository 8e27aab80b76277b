// Error types for batch coordination

use thiserror::Error;

/// Result type for batch operations.
pub type Result<T> = std::result::Result<T, BatchError>;

/// A malformed batch, rejected before anything is dispatched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// The batch payload is not a JSON object.
    #[error("batch payload must be an object")]
    NotAnObject,

    /// `requests` is absent.
    #[error("\"requests\" is required")]
    MissingRequests,

    /// `requests` is present but not an array.
    #[error("\"requests\" must be an array")]
    RequestsNotArray,

    /// `requests` is an empty array.
    #[error("\"requests\" must contain at least 1 item")]
    EmptyRequests,

    /// An element of `requests` is not an object.
    #[error("request {index} must be an object")]
    RequestNotObject {
        /// Position in `requests`.
        index: usize,
    },

    /// An element of `requests` has no usable `path`.
    #[error("request {index} is missing \"path\"")]
    MissingPath {
        /// Position in `requests`.
        index: usize,
    },

    /// A field has the wrong type or an empty value.
    #[error("request {index}: \"{field}\" must be a non-empty {expected}")]
    InvalidField {
        /// Position in `requests`.
        index: usize,
        /// Field name
        field: &'static str,
        /// Expected JSON type
        expected: &'static str,
    },

    /// `parallel` is present but not a boolean.
    #[error("\"parallel\" must be a boolean")]
    InvalidParallel,

    /// Executor configuration is unusable.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Batch-level errors. These are the only failures that escape the engine;
/// everything that goes wrong for a single sub-request is reported as data.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BatchError {
    /// The batch is malformed.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// A sub-request references a result that does not strictly precede it.
    #[error(
        "Dependency error: request {index} references result {source_index}, which does not precede it"
    )]
    Dependency {
        /// The referencing sub-request.
        index: usize,
        /// The referenced position.
        source_index: usize,
    },
}

/// A reference that could not be resolved against the available results.
///
/// Fatal for the referencing sub-request only.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReferenceError {
    /// The referenced position does not exist.
    #[error("result {source_index} is out of range ({available} results)")]
    OutOfRange {
        /// Referenced position
        source_index: usize,
        /// Number of result slots
        available: usize,
    },

    /// The referenced position is the current sub-request or a later one.
    #[error("request {index} cannot reference result {source_index}")]
    NotPreceding {
        /// The referencing sub-request
        index: usize,
        /// Referenced position
        source_index: usize,
    },

    /// The referenced sub-request has not produced a result yet.
    #[error("result {source_index} is not available yet")]
    Pending {
        /// Referenced position
        source_index: usize,
    },

    /// The property path is not well formed.
    #[error("malformed property path \"{path}\": {reason}")]
    MalformedPath {
        /// The offending path
        path: String,
        /// Parser message
        reason: String,
    },

    /// The property path does not lead to a value in the referenced body.
    #[error("property \"{path}\" not found in result {source_index}: {reason}")]
    PathNotFound {
        /// Referenced position
        source_index: usize,
        /// The property path
        path: String,
        /// Where traversal stopped
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_converts_to_batch_error() {
        let err: BatchError = ValidationError::EmptyRequests.into();
        assert_eq!(err, BatchError::Validation(ValidationError::EmptyRequests));
        assert!(err.to_string().contains("at least 1 item"));
    }

    #[test]
    fn test_dependency_error_display() {
        let err = BatchError::Dependency { index: 1, source_index: 3 };
        let msg = err.to_string();
        assert!(msg.contains("request 1"));
        assert!(msg.contains("result 3"));
    }

    #[test]
    fn test_reference_error_display() {
        let err = ReferenceError::PathNotFound {
            source_index: 0,
            path: "user.id".to_string(),
            reason: "key \"user\" not found".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "property \"user.id\" not found in result 0: key \"user\" not found"
        );
    }
}
