// Error types for the batch server

use thiserror::Error;

use crate::config::ConfigError;

/// Result type for server operations.
pub type Result<T> = std::result::Result<T, ServerError>;

/// Server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Configuration could not be loaded or is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The listen address could not be bound.
    #[error("Failed to bind to {address}: {source}")]
    Bind {
        /// Address that was requested
        address: String,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The upstream HTTP client could not be built.
    #[error("Failed to build HTTP client: {0}")]
    Client(String),

    /// Other I/O failures.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
