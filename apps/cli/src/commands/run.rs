//! Run command implementation.
//!
//! Executes one batch file against an upstream and prints the ordered
//! responses as JSON.

use anyhow::Context;
use fanout_core::{BatchConfig, BatchExecutor};
use fanout_server::HttpInvoker;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use super::load_batch;

/// Execute run command.
pub async fn execute(
    file: PathBuf,
    upstream: String,
    sequential: bool,
    pretty: bool,
    timeout: u64,
) -> anyhow::Result<()> {
    let spec = load_batch(&file)?;
    let invoker = HttpInvoker::new(upstream, Duration::from_secs(timeout))
        .context("Failed to create upstream client")?;
    let config = if sequential { BatchConfig::sequential() } else { BatchConfig::default() };
    let executor = BatchExecutor::new(Arc::new(invoker), config);

    let result = executor.run(&spec).await.context("Batch rejected")?;
    info!(
        succeeded = result.succeeded,
        failed = result.failed,
        "Batch finished ({:.0}% succeeded)",
        result.success_rate()
    );

    let output = if pretty {
        serde_json::to_string_pretty(&result)?
    } else {
        serde_json::to_string(&result)?
    };
    println!("{}", output);

    Ok(())
}
