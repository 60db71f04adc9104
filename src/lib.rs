pub mod backend;
pub mod config;
pub mod encoding;
pub mod error;
pub mod eval;
pub mod fanout;
pub mod interval;
pub mod merge;
pub mod metrics;
pub mod parser;
pub mod requests;
pub mod routing;
pub mod series;
pub mod server;
pub mod state;
pub mod telemetry;

use crate::{config::AppConfig, server::Server};

/// Bootstraps the gateway using environment configuration.
pub async fn run() -> anyhow::Result<()> {
    let config = AppConfig::from_env()?;
    Server::new(config)?.run().await
}
