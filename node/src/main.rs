// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Gray Matter Node
//!
//! Entry point for the `graymatter-node` binary. Parses CLI arguments,
//! initializes logging and metrics, joins the network, and serves the HTTP
//! API.
//!
//! The binary supports four subcommands:
//!
//! - `run`     starts a publisher, replica, or utility node
//! - `keygen`  prints a fresh publisher keypair
//! - `status`  queries a running node's `/status` endpoint
//! - `version` prints build version information

mod api;
mod cli;
mod logging;
mod metrics;

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;

use graymatter_protocol::crypto::Keypair;
use graymatter_protocol::ledger::Ledger;
use graymatter_protocol::network::{
    self, HttpNetworkClient, Node, NodeInfo, PeerDirectory, PeerDirectoryConfig,
};
use graymatter_protocol::storage::{BlockStore, MemoryStore, SledStore};

use cli::{Commands, GrayMatterCli};
use logging::LogFormat;
use metrics::NodeMetrics;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = GrayMatterCli::parse();

    match cli.command {
        Commands::Run(args) => run_node(args).await,
        Commands::Keygen => keygen(),
        Commands::Status(args) => query_status(args).await,
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Starts a node: storage, ledger, peer directory, bootstrap, then the API
/// and metrics servers.
async fn run_node(args: cli::RunArgs) -> Result<()> {
    args.validate().context("invalid node configuration")?;
    logging::init_logging(logging::DEFAULT_FILTER, args.log_format);

    let node_type = args.node_type();
    let self_node = Node::new(args.address.as_str(), node_type);
    tracing::info!(
        address = %self_node.address,
        mode = %node_type,
        port = args.port,
        metrics_port = args.metrics_port,
        "starting graymatter-node"
    );

    // --- Listeners ---
    // Bound before bootstrap so a taken port fails before we announce ourselves.
    let api_addr = format!("0.0.0.0:{}", args.port);
    let api_listener = tokio::net::TcpListener::bind(&api_addr)
        .await
        .with_context(|| format!("failed to bind API listener on {api_addr}"))?;
    let metrics_addr = format!("0.0.0.0:{}", args.metrics_port);
    let metrics_listener = tokio::net::TcpListener::bind(&metrics_addr)
        .await
        .with_context(|| format!("failed to bind metrics listener on {metrics_addr}"))?;

    // --- Metrics ---
    let node_metrics = Arc::new(NodeMetrics::new().context("failed to register metrics")?);

    let app_state = api::AppState {
        info: NodeInfo {
            node: self_node.clone(),
        },
        metrics: Arc::clone(&node_metrics),
    };

    let ledger_state = if node_type.holds_chain() {
        Some(start_ledger(&args, &self_node, &app_state).await?)
    } else {
        tracing::info!("utility mode, no chain is kept");
        None
    };

    let api_router = api::create_router(app_state, ledger_state);
    let metrics_router = axum::Router::new()
        .route("/metrics", axum::routing::get(metrics::metrics_handler))
        .with_state(Arc::clone(&node_metrics));

    tracing::info!("API server listening on {}", api_addr);
    tracing::info!("metrics server listening on {}", metrics_addr);

    // --- Serve ---
    tokio::select! {
        res = axum::serve(api_listener, api_router) => {
            if let Err(e) = res {
                tracing::error!("API server error: {}", e);
            }
        }
        res = axum::serve(metrics_listener, metrics_router) => {
            if let Err(e) = res {
                tracing::error!("metrics server error: {}", e);
            }
        }
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received");
        }
    }

    tracing::info!("graymatter-node stopped");
    Ok(())
}

/// Opens storage, builds the ledger and peer directory, and either
/// bootstraps from the donor or seeds a fresh chain with genesis.
///
/// A failed bootstrap is fatal: a replica that could not copy the chain
/// has nothing to serve.
async fn start_ledger(
    args: &cli::RunArgs,
    self_node: &Node,
    app_state: &api::AppState,
) -> Result<api::LedgerState> {
    let store: Arc<dyn BlockStore> = if args.ephemeral {
        tracing::warn!("ephemeral mode, the chain is lost on shutdown");
        Arc::new(MemoryStore::new())
    } else {
        let db_path = args.data_dir.join("chain");
        std::fs::create_dir_all(&db_path).with_context(|| {
            format!("failed to create database directory: {}", db_path.display())
        })?;
        let db = SledStore::open(&db_path)
            .with_context(|| format!("failed to open database at {}", db_path.display()))?;
        tracing::info!(path = %db_path.display(), "database opened");
        Arc::new(db)
    };
    let ledger = Arc::new(Ledger::new(store));

    let client = HttpNetworkClient::new(Duration::from_millis(args.peer_timeout_ms))
        .context("failed to build HTTP client")?;
    let directory = Arc::new(
        PeerDirectory::new(
            Arc::new(client),
            PeerDirectoryConfig {
                request_timeout: Duration::from_millis(args.peer_timeout_ms),
                ..PeerDirectoryConfig::default()
            },
        )
        .with_local_address(&self_node.address),
    );

    match args.donor() {
        Some(donor) => {
            let report = network::bootstrap(&ledger, &directory, donor, self_node)
                .await
                .with_context(|| format!("bootstrap from {donor} failed"))?;
            tracing::info!(
                donor,
                peers = report.peers_learned,
                blocks = report.blocks_applied,
                rejected = report.blocks_rejected,
                "bootstrap complete"
            );
        }
        None => {
            if let Some(genesis) = ledger.ensure_genesis().context("failed to seed genesis")? {
                tracing::info!(hash = genesis.hash(), "created genesis block");
            }
        }
    }

    let state = api::LedgerState {
        info: app_state.info.clone(),
        metrics: Arc::clone(&app_state.metrics),
        ledger,
        directory,
    };
    state.metrics.observe(&state.ledger, &state.directory);
    Ok(state)
}

/// Prints a fresh publisher keypair as hex, ready for
/// `--publisher-signing-key` and `--publisher-public-key`.
fn keygen() -> Result<()> {
    let keypair = Keypair::generate().context("failed to generate keypair")?;
    println!("signing key : {}", keypair.secret_key_hex());
    println!("public key  : {}", keypair.public_key().to_hex());
    Ok(())
}

/// Queries a running node's status endpoint and prints the result.
async fn query_status(args: cli::StatusArgs) -> Result<()> {
    let url = format!("{}/status", args.url.trim_end_matches('/'));
    let response = reqwest::get(&url)
        .await
        .with_context(|| format!("failed to reach {url}"))?
        .error_for_status()
        .with_context(|| format!("{url} returned an error"))?;
    let info: NodeInfo = response
        .json()
        .await
        .with_context(|| format!("{url} returned an unexpected body"))?;
    println!("{}", serde_json::to_string_pretty(&info)?);
    Ok(())
}

/// Prints version information to stdout.
fn print_version() {
    println!("graymatter-node {}", env!("CARGO_PKG_VERSION"));
    println!("protocol        {}", graymatter_protocol::config::PROTOCOL_VERSION);
    println!("signatures      {}", graymatter_protocol::config::SIGNING_ALGORITHM);
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM, whichever comes first.
///
/// If a handler cannot be installed, that branch never fires and the other
/// one still works.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
