// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::net::SocketAddr;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use relational_ble_gateway::{
    blockchain::{ChainClient, EvmClient, NetworkConfig, NodeKey},
    bridge::router,
    config::{GatewayConfig, NodeKeySource},
    crypto::EciesCipher,
    handlers::{Gateway, GatewayOptions},
    session::{PinRotator, SessionManager},
    state::AppState,
    storage::RecordDatabase,
    watcher::PresenceWatcher,
    workflow::{VerificationWorkflow, WorkflowConfig},
};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug"));

    let json = std::env::var("LOG_FORMAT")
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn load_node_key(source: &NodeKeySource) -> Result<NodeKey, Box<dyn std::error::Error>> {
    let key = match source {
        NodeKeySource::Hex(hex) => NodeKey::from_hex(hex)?,
        NodeKeySource::PemFile(path) => NodeKey::from_pem(&std::fs::read(path)?)?,
    };
    Ok(key)
}

async fn shutdown_signal(shutdown: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl-C");
    }
    info!("Shutdown requested");
    shutdown.cancel();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config = GatewayConfig::from_env()?;
    let node_key = load_node_key(&config.node_key)?;

    let store = Arc::new(RecordDatabase::open(&config.records_path())?);
    let chain: Arc<dyn ChainClient> = Arc::new(EvmClient::new(
        NetworkConfig::new("evm", config.rpc_url.clone()),
        node_key.signer,
    )?);
    let cipher = Arc::new(EciesCipher::new(node_key.secret));

    info!(
        account = %chain.account(),
        rpc_url = %config.rpc_url,
        data_dir = %config.data_dir.display(),
        "Node key loaded"
    );

    let session = SessionManager::new(config.pin_inactivity);
    let workflow = VerificationWorkflow::new(
        Arc::clone(&chain),
        Arc::clone(&store),
        WorkflowConfig {
            check_interval: config.mining_check_interval,
            max_cycles: config.max_confirmation_cycles,
            default_contract: config.presence_contract,
        },
    );
    let gateway = Arc::new(Gateway::new(
        session.clone(),
        Arc::clone(&chain),
        Arc::clone(&store),
        cipher,
        workflow.clone(),
        GatewayOptions {
            max_frame_size: config.max_frame_size,
            send_delay: config.send_delay,
        },
    ));

    // Background tasks
    let shutdown = CancellationToken::new();
    tokio::spawn(PinRotator::new(session, config.pin_rotation).run(shutdown.clone()));

    match config.registry_contract {
        Some(registry) => {
            let watcher = PresenceWatcher::new(Arc::clone(&chain), Arc::clone(&store), registry);
            tokio::spawn(watcher.run(shutdown.clone()));
        }
        None => info!("REGISTRY_CONTRACT not set, presence watcher disabled"),
    }

    if let Err(e) = workflow.resume_pending() {
        warn!(error = %e, "Failed to resume pending verifications");
    }

    let app = router(AppState::new(gateway, Some(config.data_dir.clone())));
    let addr: SocketAddr = config.bind_addr().parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!("Relational BLE gateway listening on http://{addr} (peer socket at /v1/peer)");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await?;

    Ok(())
}
