//! fanout CLI - command-line interface for the fanout batch server
//!
//! This CLI provides a `fanout` command that serves the batch route, runs a
//! batch file once against an upstream, or checks a batch file without
//! dispatching anything.

mod commands;

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// fanout - batch HTTP requests with references between them
#[derive(Parser, Debug)]
#[command(
    name = "fanout",
    author,
    version,
    about = "fanout - batch requests with references to earlier results",
    long_about = "fanout accepts a batch of sub-requests, dispatches them in parallel or in order, \
                  substitutes $$<index>.<path> references to earlier results, and returns every \
                  response in submission order."
)]
struct Args {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum LogFormat {
    /// Human-readable lines
    Text,
    /// One JSON object per event
    Json,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the batch route
    ///
    /// Loads ~/.fanout/config.toml and ./fanout.toml unless --config is given,
    /// then applies FANOUT_* environment variables and the flags below.
    Serve {
        /// Configuration file to load instead of the discovered ones
        #[arg(short, long, value_name = "PATH")]
        config: Option<PathBuf>,

        /// Listen address, e.g. 127.0.0.1:8080
        #[arg(long)]
        address: Option<String>,

        /// Upstream base URL sub-requests are forwarded to
        #[arg(long)]
        upstream: Option<String>,
    },

    /// Execute a batch file once and print the responses
    Run {
        /// Batch file (JSON)
        file: PathBuf,

        /// Upstream base URL sub-requests are forwarded to
        #[arg(long)]
        upstream: String,

        /// Run sub-requests in order unless the batch says otherwise
        #[arg(long)]
        sequential: bool,

        /// Pretty-print the responses
        #[arg(long)]
        pretty: bool,

        /// Per sub-request timeout in seconds
        #[arg(long, default_value = "30")]
        timeout: u64,
    },

    /// Validate a batch file and print its dependency graph
    Check {
        /// Batch file (JSON)
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // RUST_LOG wins over --log-level; logs go to stderr so stdout stays parseable.
    let json = args.log_format == LogFormat::Json;
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level)))
        .with((!json).then(|| fmt::layer().with_writer(std::io::stderr).with_target(false)))
        .with(json.then(|| fmt::layer().json().with_writer(std::io::stderr)))
        .init();

    match args.command {
        Command::Serve { config, address, upstream } => {
            commands::serve::execute(config, address, upstream).await
        }
        Command::Run { file, upstream, sequential, pretty, timeout } => {
            commands::run::execute(file, upstream, sequential, pretty, timeout).await
        }
        Command::Check { file } => commands::check::execute(&file),
    }
}
