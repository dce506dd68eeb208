//! Entry point for the Journey Engine binary.
//!
//! Starts the HTTP server over a data directory of JSON files
//! (`punches.json`, `contracts.json`, `holidays.json`).  The directory
//! is taken from `JOURNEY_DATA_DIR` (default `data`) and the bind
//! address from `JOURNEY_BIND_ADDR` (default `127.0.0.1:3000`).  Policy
//! comes from the JSON file named by `JOURNEY_CONFIG` when set, and
//! from the defaults plus `JOURNEY_*` overrides otherwise.  Log output
//! is controlled with `RUST_LOG`.

use journey_engine::config::EngineConfig;
use std::path::PathBuf;
use tracing::error;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match std::env::var("JOURNEY_CONFIG") {
        Ok(path) => EngineConfig::from_file(&path),
        Err(_) => EngineConfig::from_env(),
    };
    let config = match config {
        Ok(config) => config,
        Err(err) => {
            error!(error = %err, "invalid configuration");
            std::process::exit(2);
        }
    };

    let data_dir = PathBuf::from(std::env::var("JOURNEY_DATA_DIR").unwrap_or_else(|_| "data".to_string()));
    let addr = std::env::var("JOURNEY_BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:3000".to_string());
    if let Err(err) = journey_engine::api::serve(&addr, data_dir, config).await {
        error!(error = %err, "server stopped");
        std::process::exit(1);
    }
}
