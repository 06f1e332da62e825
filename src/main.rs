use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use strobe::clock::{Clock, SystemClock};
use strobe::config::Config;
use strobe::dispatch::Dispatcher;
use strobe::scheduler::{Engine, EngineConfig};
use strobe::server::{build_app, AppState};
use strobe::store::Store;

// ============================================================================
// CLI Types
// ============================================================================

/// Strobe - persistent HTTP request scheduler ("cron for API calls")
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the scheduler engine and REST control plane
    Serve {
        /// Path to configuration file
        #[arg(short, long, default_value = "strobe.toml")]
        config: String,

        /// Host to bind to (overrides config file)
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on (overrides config file)
        #[arg(short, long)]
        port: Option<u16>,
    },
}

// ============================================================================
// Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> std::process::ExitCode {
    init_tracing();

    match run().await {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            std::process::ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { config, host, port } => serve(&config, host, port).await,
    }
}

async fn serve(config_path: &str, host: Option<String>, port: Option<u16>) -> Result<()> {
    let mut config = Config::load(config_path).await?;
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    let store = Store::open(&config.database_url)
        .await
        .with_context(|| format!("failed to open database {}", config.database_url))?;
    store.migrate().await.context("failed to apply schema")?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let dispatcher = Dispatcher::new(config.max_response_bytes);
    let engine = Engine::new(
        store.clone(),
        dispatcher,
        clock.clone(),
        EngineConfig {
            poll_interval: config.poll_interval(),
            shutdown_grace: config.shutdown_grace(),
        },
    );

    // Crash recovery must precede the first tick.
    engine.recover_orphans().await?;
    let engine_handle = engine.start();

    let app = build_app(
        AppState { store, clock },
        config.server.request_timeout_seconds,
    );

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(addr = %addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    engine_handle.shutdown().await;
    info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("received ctrl-c, shutting down");
}

// ============================================================================
// Initialization
// ============================================================================

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
