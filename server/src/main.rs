// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Svalbard Custody Server
//!
//! Entry point for the `svalbard-server` binary. Parses CLI arguments,
//! initializes logging and metrics, opens the share store, and serves the
//! six custody endpoints plus a separate metrics listener.
//!
//! The binary supports two subcommands:
//!
//! - `run`     — start the custody server
//! - `version` — print build version information

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;

use svalbard_protocol::channel::FileChannel;
use svalbard_protocol::store::{MemoryShareStore, ShareStore, SledShareStore};
use svalbard_protocol::token::{TokenConfig, TokenStore};

use svalbard_server::api;
use svalbard_server::cli::{self, Commands, ServerCli};
use svalbard_server::logging::{self, LogFormat};
use svalbard_server::metrics::{self, ServerMetrics};

/// How often expired tokens are swept out of the token store.
const TOKEN_PURGE_INTERVAL: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<()> {
    let cli = ServerCli::parse();

    match cli.command {
        Commands::Run(args) => run_server(args).await,
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

// ---------------------------------------------------------------------------
// run — Custody server startup sequence
// ---------------------------------------------------------------------------

/// Starts the custody server.
///
/// Startup sequence:
/// 1. Resolve paths and validate config
/// 2. Initialize logging
/// 3. Build the token store
/// 4. Open the share store (sled, or memory with --in-memory)
/// 5. Open the secondary channel spool
/// 6. Create metrics and application state
/// 7. Spawn the token purge task
/// 8. Bind the custody and metrics listeners
/// 9. Await shutdown
async fn run_server(args: cli::RunArgs) -> Result<()> {
    // --- 1. Resolve paths and validate config ---
    let data_dir = cli::resolve_data_dir(&args.data_dir);
    let spool_dir = args
        .spool_dir
        .clone()
        .unwrap_or_else(|| data_dir.join("channel"));

    let log_filter = format!(
        "svalbard_server={level},svalbard_protocol={level},tower_http=debug",
        level = args.log_level
    );
    let log_format: LogFormat = args
        .log_format
        .parse()
        .context("invalid --log-format value")?;

    // --- 2. Initialize logging ---
    logging::init_logging(&log_filter, log_format);

    tracing::info!(
        listen_addr = %args.listen_addr,
        metrics_addr = %args.metrics_addr,
        data_dir = %data_dir.display(),
        spool_dir = %spool_dir.display(),
        in_memory = args.in_memory,
        "starting svalbard-server"
    );

    // --- 3. Build the token store ---
    let token_config = TokenConfig::new(
        args.token_length,
        chrono::Duration::seconds(args.token_validity_secs),
    )
    .context("invalid token configuration")?;
    let tokens = Arc::new(TokenStore::new(token_config));

    // --- 4. Open the share store ---
    let shares: Arc<dyn ShareStore> = if args.in_memory {
        tracing::warn!("running with the in-memory share store; shares die with the process");
        Arc::new(MemoryShareStore::new())
    } else {
        let store_path = data_dir.join("shares");
        std::fs::create_dir_all(&store_path).with_context(|| {
            format!("failed to create share store directory {}", store_path.display())
        })?;
        Arc::new(
            SledShareStore::open(&store_path)
                .with_context(|| format!("failed to open share store at {}", store_path.display()))?,
        )
    };
    tracing::info!("share store opened");

    // --- 5. Open the secondary channel spool ---
    let channel = Arc::new(
        FileChannel::new(&spool_dir)
            .with_context(|| format!("failed to open channel spool at {}", spool_dir.display()))?,
    );

    // --- 6. Create metrics and application state ---
    let server_metrics = Arc::new(ServerMetrics::new());
    let state = api::AppState {
        tokens: Arc::clone(&tokens),
        shares,
        channel,
        metrics: Arc::clone(&server_metrics),
    };

    // --- 7. Spawn the token purge task ---
    let purge_tokens = Arc::clone(&tokens);
    let purge_task = tokio::spawn(async move {
        let mut interval = tokio::time::interval(TOKEN_PURGE_INTERVAL);
        loop {
            interval.tick().await;
            let dropped = purge_tokens.purge_expired(chrono::Utc::now());
            if dropped > 0 {
                tracing::debug!(dropped, "purged expired tokens");
            }
        }
    });

    // --- 8. Bind the custody and metrics listeners ---
    let router = api::create_router(state);
    let listener = tokio::net::TcpListener::bind(&args.listen_addr)
        .await
        .with_context(|| format!("failed to bind custody listener on {}", args.listen_addr))?;
    tracing::info!("custody server listening on {}", args.listen_addr);

    let metrics_router = axum::Router::new()
        .route("/metrics", axum::routing::get(metrics::metrics_handler))
        .route("/health", axum::routing::get(metrics::health_handler))
        .with_state(Arc::clone(&server_metrics));
    let metrics_listener = tokio::net::TcpListener::bind(&args.metrics_addr)
        .await
        .with_context(|| format!("failed to bind metrics listener on {}", args.metrics_addr))?;
    tracing::info!("metrics server listening on {}", args.metrics_addr);

    // --- 9. Await shutdown ---
    tokio::select! {
        res = axum::serve(listener, router) => {
            if let Err(e) = res {
                tracing::error!("custody server error: {}", e);
            }
        }
        res = axum::serve(metrics_listener, metrics_router) => {
            if let Err(e) = res {
                tracing::error!("metrics server error: {}", e);
            }
        }
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received, draining connections");
        }
    }

    purge_task.abort();
    tracing::info!("svalbard-server stopped");
    Ok(())
}

// ---------------------------------------------------------------------------
// version
// ---------------------------------------------------------------------------

/// Prints version information to stdout.
fn print_version() {
    println!("svalbard-server {}", env!("CARGO_PKG_VERSION"));
    if let Some(commit) = option_env!("GIT_COMMIT") {
        println!("commit    {}", commit);
    }
    if let Some(ts) = option_env!("BUILD_TIMESTAMP") {
        println!("built     {}", ts);
    }
}

// ---------------------------------------------------------------------------
// Shutdown signal
// ---------------------------------------------------------------------------

/// Waits for SIGINT (Ctrl+C) or SIGTERM, whichever comes first.
///
/// On non-Unix platforms, only Ctrl+C is supported.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
