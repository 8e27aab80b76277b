//! HTTP surface for fanout.
//!
//! Exposes the batch route over hyper, loads server configuration from TOML
//! and the environment, and forwards sub-requests to an upstream application
//! through [`HttpInvoker`].

pub mod config;
pub mod error;
pub mod handler;
pub mod invoker;
pub mod server;

pub use config::{BatchFileConfig, ConfigError, ConfigFile, ConfigResult, ServerConfig};
pub use error::{Result, ServerError};
pub use handler::BatchHandler;
pub use invoker::{HttpInvoker, decode_body};
pub use server::BatchServer;
