//! Executor configuration.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Settings shared by every batch an executor runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Default execution mode when a batch does not say.
    #[serde(default = "default_parallel")]
    pub parallel: bool,
    /// Cap on in-flight dispatches in parallel mode. `None` means unlimited.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concurrency: Option<usize>,
}

fn default_parallel() -> bool {
    true
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self { parallel: default_parallel(), max_concurrency: None }
    }
}

impl BatchConfig {
    /// Configuration that runs batches in order unless they opt in to parallelism.
    #[must_use]
    pub fn sequential() -> Self {
        Self { parallel: false, ..Self::default() }
    }

    /// Sets the in-flight cap.
    #[must_use]
    pub fn with_max_concurrency(mut self, limit: usize) -> Self {
        self.max_concurrency = Some(limit);
        self
    }

    /// Checks the configuration is usable.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.max_concurrency == Some(0) {
            return Err(ValidationError::InvalidConfig(
                "max_concurrency must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
