//! Serve command implementation.

use anyhow::Context;
use fanout_server::{BatchServer, ServerConfig};
use std::path::PathBuf;
use tracing::info;

/// Execute serve command.
pub async fn execute(
    config_path: Option<PathBuf>,
    address: Option<String>,
    upstream: Option<String>,
) -> anyhow::Result<()> {
    let mut config = match config_path {
        Some(path) => {
            let mut config = ServerConfig::load_from_file(&path).with_context(|| {
                format!("Failed to load configuration from {}", path.display())
            })?;
            config
                .apply_overrides(|key| std::env::var(key).ok())
                .context("Invalid environment override")?;
            config
        }
        None => ServerConfig::discover_and_load().context("Failed to load configuration")?,
    };
    if let Some(address) = address {
        config.address = address;
    }
    if let Some(upstream) = upstream {
        config.upstream_url = upstream;
    }

    let server = BatchServer::from_config(&config).await.context("Failed to start server")?;
    let addr = server.local_addr()?;
    info!(upstream = %config.upstream_url, "Forwarding sub-requests");
    println!("fanout listening on http://{}{}", addr, config.batch_path);

    server
        .serve_with_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
            }
        })
        .await?;

    Ok(())
}
