//! CLI command implementations.

pub mod check;
pub mod run;
pub mod serve;

use anyhow::Context;
use fanout_core::BatchSpec;
use std::path::Path;

/// Reads and validates a batch file.
pub fn load_batch(path: &Path) -> anyhow::Result<BatchSpec> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read batch file: {}", path.display()))?;
    let value: serde_json::Value = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse batch file: {}", path.display()))?;
    BatchSpec::from_value(value)
        .with_context(|| format!("Invalid batch file: {}", path.display()))
}
