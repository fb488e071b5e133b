//! askdb server - natural-language questions over the ERP reporting database.

use anyhow::Result;
use askdb_core::SessionSweeper;
use askdb_server::{config, logging, routes, state};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use config::Config;
use logging::{LogConfig, LogFormat};
use state::AppState;

/// askdb server - ask the ERP reporting database questions in plain language.
#[derive(Parser, Debug)]
#[command(name = "askdb-server")]
#[command(about = "HTTP server answering natural-language questions with read-only SQL")]
#[command(version)]
struct Cli {
    /// Path to config file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Override port from config
    #[arg(short, long)]
    port: Option<u16>,

    /// Enable verbose logging (INFO level for every target)
    #[arg(short, long)]
    verbose: bool,

    /// Enable debug logging (every pipeline stage)
    #[arg(short, long)]
    debug: bool,

    /// Enable trace logging (TRACE level for everything)
    #[arg(long)]
    trace: bool,

    /// Quiet mode (WARN and ERROR only)
    #[arg(short, long)]
    quiet: bool,

    /// Set log level for specific targets (e.g., "pipeline=debug" or "sanitizer=trace").
    /// Can be specified multiple times. Targets are prefixed with "askdb::" automatically.
    #[arg(long = "log", value_name = "TARGET=LEVEL")]
    log_overrides: Vec<String>,

    /// Log output format
    #[arg(long = "log-format", value_name = "FORMAT", default_value = "text")]
    log_format: LogFormat,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_config = LogConfig::from_cli(
        cli.verbose,
        cli.debug,
        cli.trace,
        cli.quiet,
        cli.log_overrides,
        cli.log_format,
    );
    logging::init(&log_config);

    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    config.apply_env_overrides();
    if let Some(port) = cli.port {
        config.port = port;
    }

    tracing::info!(
        target: "askdb::startup",
        "Loaded configuration (port: {}, row limit: {}, session timeout: {} min)",
        config.port,
        config.row_limit,
        config.session_timeout_minutes
    );

    // The model client owns a blocking HTTP client, so state is built and
    // dropped off the async workers.
    let state_config = config.clone();
    let state = Arc::new(tokio::task::spawn_blocking(move || AppState::new(state_config)).await??);
    tracing::info!(target: "askdb::startup", "Initialized application state");

    let sweeper = SessionSweeper::spawn(
        state.sessions.clone(),
        config.cleanup_interval(),
        config.session_timeout(),
    );
    tracing::info!(
        target: "askdb::startup",
        "Started session sweeper (every {}s)",
        config.cleanup_interval().as_secs()
    );

    let app = routes::router(state.clone());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    tracing::info!(target: "askdb::startup", "Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sweeper.shutdown().await;
    let drained = state.sessions.drain();
    tracing::info!(target: "askdb::startup", "Shut down, dropped {} sessions", drained);
    tokio::task::spawn_blocking(move || drop(state)).await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(target: "askdb::startup", "Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!(target: "askdb::startup", "Shutdown signal received");
}
