//! kora-daemon: the kora ledger daemon.
//!
//! Single OS process running a Tokio async runtime. Clients (feed
//! workers, admin tooling, gateway webhooks) talk JSON-RPC over a Unix
//! socket; all balance mutation goes through the [`kora_ledger`] engine
//! over the SQLite store.

mod collaborators;
mod commands;
mod config;
mod events;
mod rpc;
mod sweep;

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{error, info};

use kora_ledger::{LedgerEngine, SystemClock};
use kora_store::SqliteStore;

use crate::collaborators::{ConfigIdentity, SimulatedGateway};
use crate::config::DaemonConfig;
use crate::events::EventBus;
use crate::rpc::RpcServer;

/// Daemon-wide shared state.
pub struct DaemonState {
    /// The ledger engine.
    pub engine: LedgerEngine<SqliteStore>,
    /// Configuration.
    pub config: DaemonConfig,
    /// Event bus for pushing events to subscribers.
    pub event_bus: EventBus,
    /// Shutdown signal sender.
    pub shutdown_tx: broadcast::Sender<()>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Load config (needed for the log level)
    let config = DaemonConfig::load()?;

    // 2. Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(format!("kora={}", config.advanced.log_level).parse()?),
        )
        .init();

    info!("kora daemon starting");

    let data_dir = config.data_dir();
    std::fs::create_dir_all(&data_dir)?;

    // 3. Open the store
    let store = if config.storage.ephemeral {
        info!("running on an in-memory database");
        SqliteStore::open_memory()?
    } else {
        let db_path = data_dir.join("kora.db");
        info!(path = %db_path.display(), "opening database");
        SqliteStore::open(&db_path)?
    };

    // 4. Build the engine; invalid policy config fails startup here
    let engine = LedgerEngine::new(
        store,
        config.engine.clone(),
        Arc::new(SystemClock),
        Arc::new(SimulatedGateway::new()),
        Arc::new(ConfigIdentity::new(&config.identity)),
    )?;

    // 5. Event bus + shutdown channel
    let event_bus = EventBus::new(1000);
    let (shutdown_tx, _shutdown_rx) = broadcast::channel(1);

    let state = Arc::new(DaemonState {
        engine,
        config,
        event_bus,
        shutdown_tx: shutdown_tx.clone(),
    });

    // 6. Background hold sweep
    tokio::spawn(sweep::run_hold_sweep(state.clone()));

    // 7. Start IPC server
    let socket_path = data_dir.join("daemon.sock");
    let rpc_server = RpcServer::new(state.clone(), socket_path.clone());
    info!("starting JSON-RPC server on {:?}", socket_path);

    state.event_bus.emit_now(
        "DaemonStarted",
        serde_json::json!({ "version": env!("CARGO_PKG_VERSION") }),
    );

    // 8. Run the RPC server until shutdown
    let mut shutdown_rx = shutdown_tx.subscribe();
    tokio::select! {
        result = rpc_server.run() => {
            if let Err(e) = result {
                error!("RPC server error: {}", e);
            }
        }
        _ = shutdown_rx.recv() => {
            info!("shutdown signal received");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("ctrl-c received, shutting down");
        }
    }

    // Graceful shutdown: stop the sweep, remove the socket
    let _ = shutdown_tx.send(());
    let _ = std::fs::remove_file(&socket_path);

    info!("daemon stopped");
    Ok(())
}
