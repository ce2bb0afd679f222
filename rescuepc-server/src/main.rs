//! RescuePC license service.
//!
//! Serves key validation to desktop clients and accepts confirmed sales from
//! the payment webhook.
//!
//! Usage:
//!   rescuepc-server --database licenses.db --port 8080 --internal-port 8081
//!
//! The internal listener accepts sales and revocations without
//! authentication; keep it on a private interface.

use anyhow::{Context, Result};
use clap::Parser;
use rescuepc_license::{IssuanceConfig, LicenseStore, MemoryLicenseStore};
use rescuepc_server::{AppState, build_internal_router, build_public_router, notify};
use rescuepc_storage::SqliteLicenseStore;
use std::{path::PathBuf, sync::Arc, time::Duration};
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "rescuepc-server")]
#[command(author, version, about = "RescuePC license validation and issuance service")]
struct Args {
    /// Path to the SQLite license database
    #[arg(long, default_value = "licenses.db", env = "RESCUEPC_DATABASE")]
    database: PathBuf,

    /// Keep licenses in memory only (nothing is persisted)
    #[arg(long)]
    in_memory: bool,

    /// Host for the public validation listener
    #[arg(long, default_value = "0.0.0.0", env = "RESCUEPC_HOST")]
    host: String,

    /// Port for the public validation listener
    #[arg(short, long, default_value = "8080", env = "RESCUEPC_PORT")]
    port: u16,

    /// Host for the internal sales/admin listener
    #[arg(long, default_value = "127.0.0.1", env = "RESCUEPC_INTERNAL_HOST")]
    internal_host: String,

    /// Port for the internal sales/admin listener
    #[arg(long, default_value = "8081", env = "RESCUEPC_INTERNAL_PORT")]
    internal_port: u16,

    /// Prefix for newly issued license keys
    #[arg(long, default_value = "RPC", env = "RESCUEPC_KEY_PREFIX")]
    key_prefix: String,

    /// Endpoint that receives issued-license events as JSON
    #[arg(long, env = "RESCUEPC_NOTIFY_URL")]
    notify_url: Option<String>,

    /// How long a store call waits on a locked database, in milliseconds
    #[arg(long, default_value = "5000", env = "RESCUEPC_BUSY_TIMEOUT_MS")]
    busy_timeout_ms: u64,

    /// Enable verbose debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let default_filter = if args.verbose { "debug" } else { "info,tower_http=debug" };
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false).compact())
        .init();

    info!("RescuePC license service starting...");

    let store: Arc<dyn LicenseStore> = if args.in_memory {
        info!("Using in-memory license store; licenses will not persist");
        Arc::new(MemoryLicenseStore::new())
    } else {
        let timeout = Duration::from_millis(args.busy_timeout_ms);
        Arc::new(
            SqliteLicenseStore::open(&args.database, timeout)
                .with_context(|| format!("Failed to open license store {:?}", args.database))?,
        )
    };

    let (observer, events) = notify::ChannelObserver::new();
    let config = IssuanceConfig {
        key_prefix: args.key_prefix.clone(),
        ..IssuanceConfig::default()
    };
    let state = Arc::new(
        AppState::new(store, Arc::new(observer), &config)
            .context("Invalid issuance configuration")?,
    );

    if args.notify_url.is_none() {
        info!("No notify URL configured; issued licenses are only logged");
    }
    tokio::spawn(notify::run_delivery(
        events,
        reqwest::Client::new(),
        args.notify_url.clone(),
    ));

    let public_addr = format!("{}:{}", args.host, args.port);
    let public = tokio::net::TcpListener::bind(&public_addr)
        .await
        .with_context(|| format!("Failed to bind public listener on {public_addr}"))?;
    info!("Validation endpoint listening on http://{}", public_addr);

    let internal_addr = format!("{}:{}", args.internal_host, args.internal_port);
    let internal = tokio::net::TcpListener::bind(&internal_addr)
        .await
        .with_context(|| format!("Failed to bind internal listener on {internal_addr}"))?;
    info!("Sales endpoint listening on http://{}", internal_addr);

    let public_app = build_public_router(Arc::clone(&state));
    let internal_app = build_internal_router(state);

    tokio::try_join!(
        async { axum::serve(public, public_app).await.context("Public server failed") },
        async { axum::serve(internal, internal_app).await.context("Internal server failed") },
    )?;

    Ok(())
}
