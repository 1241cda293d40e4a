//! promptrun web server.
//!
//! Run with: cargo run -p promptrun-server -- --config promptrun.toml
//!
//! Then open http://localhost:5000 in your browser.

mod config;

use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use anyhow::Context;
use clap::Parser;
use promptrun_completion::{OpenAiCompletion, load_credential};
use promptrun_executor::{ExecutionEngine, TerminalSink};
use promptrun_session::SessionManager;
use promptrun_transport::create_router;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::ServerConfig;

/// Turn prompts into programs and run them.
#[derive(Debug, Parser)]
#[command(name = "promptrun", version, about)]
struct Args {
    /// TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Address to listen on.
    #[arg(long)]
    bind: Option<SocketAddr>,
    /// Directory for history, transcript and working files.
    #[arg(long)]
    data_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config =
        ServerConfig::load(args.config.as_deref())?.with_overrides(args.bind, args.data_dir);

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_filter.as_str().into()),
        )
        .init();

    tokio::fs::create_dir_all(&config.data_dir)
        .await
        .with_context(|| format!("Failed to create data dir {}", config.data_dir.display()))?;

    let credential = load_credential(&config.completion.api_key_file).with_context(|| {
        format!(
            "No API key in {} or the environment",
            config.completion.api_key_file.display()
        )
    })?;
    let completion = OpenAiCompletion::new(credential)
        .with_base_url(&config.completion.base_url)
        .with_model(config.completion.model.clone());

    let engine_config = config.execution.engine_config(&config.data_dir);
    let engine = if config.execution.mirror_terminal {
        match TerminalSink::detect().await {
            Some(sink) => ExecutionEngine::with_sink(engine_config, Arc::new(sink)),
            None => {
                tracing::warn!("No terminal launcher found, mirroring disabled");
                ExecutionEngine::new(engine_config)
            }
        }
    } else {
        ExecutionEngine::new(engine_config)
    };

    let storage = config.history.format.open(&config.data_dir);
    let manager = SessionManager::new(storage, engine, completion)
        .with_context_window(config.history.context_window);

    // Build router
    let app = create_router(Arc::new(manager)).layer(TraceLayer::new_for_http());

    // Start server
    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind))?;
    tracing::info!(
        data_dir = %config.data_dir.display(),
        history = ?config.history.format,
        "Server listening on http://{}",
        config.bind
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
