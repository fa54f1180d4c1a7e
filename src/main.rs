//! ytrace Collector
//!
//! Run with: cargo run
//!
//! Environment variables:
//! - YTRACE_HOST: Bind address (default: 0.0.0.0)
//! - YTRACE_PORT: Port number (default: 4318, the standard OTLP/HTTP port)
//! - YTRACE_DATA_DIR: Where the write-ahead log lives (default: ./ytrace_data)
//! - RUST_LOG: Log level (default: info)

use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use ytrace::api::{run_server, ServerConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ytrace=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let host = std::env::var("YTRACE_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port: u16 = std::env::var("YTRACE_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(4318);
    let data_dir = std::env::var("YTRACE_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("./ytrace_data"));

    let config = ServerConfig {
        host,
        port,
        data_dir,
    };

    tracing::info!("ytrace configuration:");
    tracing::info!("  Host: {}:{}", config.host, config.port);
    tracing::info!("  Data directory: {}", config.data_dir.display());

    println!(
        r#"
        _
  _   _| |_ _ __ __ _  ___ ___
 | | | | __| '__/ _` |/ __/ _ \
 | |_| | |_| | | (_| | (_|  __/
  \__, |\__|_|  \__,_|\___\___|
  |___/

 OTLP Trace Collector for LLM-Agent Workloads
 Version: {}
"#,
        env!("CARGO_PKG_VERSION")
    );

    run_server(config).await
}
