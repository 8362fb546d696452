#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! attestd node entrypoint (systemd-friendly).
//! Serves the HTTP API and runs peer replication until ctrl-c.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use attestd::api::{router, AppState};
use attestd::core::chain::ledger::Ledger;
use attestd::core::security::keystore::IdentityStore;
use attestd::core::types::NodeConfig;
use attestd::monitoring::{logging, metrics::Metrics};
use attestd::networking::peer_directory::PeerDirectory;
use attestd::networking::sync::{SyncConfig, SyncScheduler};
use attestd::networking::transport::HttpTransport;
use tracing::{info, warn};

fn config_path() -> String {
    std::env::args()
        .nth(1)
        .or_else(|| std::env::var("ATTESTD_CONFIG").ok())
        .unwrap_or_else(|| "attestd.toml".to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    let path = config_path();
    let mut cfg = NodeConfig::load(&path).with_context(|| format!("loading {path}"))?;
    cfg.apply_env();
    logging::init(&cfg.log);

    let hidden_service = cfg.hidden_service_address()?;
    let db_path = Path::new(&cfg.node.data_dir).join("db");
    let db = sled::open(&db_path).with_context(|| format!("opening {}", db_path.display()))?;

    let metrics = Arc::new(Metrics::new()?);
    let ledger = Arc::new(Ledger::open(&db, cfg.sync.max_orphans, metrics.clone())?);
    let identities = IdentityStore::open(&db)?;
    let directory = Arc::new(PeerDirectory::open(&db, metrics.clone())?);
    for peer in &cfg.peers {
        if let Err(e) = directory.add(peer.clone()) {
            warn!(peer = %peer.address(), error = %e, "skipping configured peer");
        }
    }

    let sync_cfg = SyncConfig::from(&cfg.sync);
    let transport = Arc::new(HttpTransport::new(sync_cfg.request_timeout)?);
    let scheduler = SyncScheduler::start(ledger.clone(), directory.clone(), transport, metrics.clone(), sync_cfg);

    let state = Arc::new(AppState {
        ledger,
        directory,
        identities,
        metrics,
        hidden_service,
        max_batch: sync_cfg.max_batch,
    });
    let listener = tokio::net::TcpListener::bind(&cfg.http.listen_addr)
        .await
        .with_context(|| format!("binding {}", cfg.http.listen_addr))?;
    info!(
        node = %cfg.node.name,
        listen = %cfg.http.listen_addr,
        data_dir = %cfg.node.data_dir,
        version = env!("CARGO_PKG_VERSION"),
        git_sha = option_env!("VERGEN_GIT_SHA").unwrap_or("unknown"),
        built = option_env!("VERGEN_BUILD_TIMESTAMP").unwrap_or("unknown"),
        "attestd node starting"
    );

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown requested");
        })
        .await?;

    scheduler.stop().await;
    db.flush()?;
    info!("attestd node stopped");
    Ok(())
}
