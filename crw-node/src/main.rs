//! Starts a node: loads config, opens the block store, bootstraps genesis
//! if the store is empty, and drives a session per configured peer.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use color_eyre::eyre::Result;
use tracing::{info, warn};
use tracing_error::ErrorLayer;
use tracing_futures::Instrument;
use tracing_subscriber::{prelude::*, EnvFilter};

use crw_consensus::Engine;
use crw_network::peer::{connect, HandshakeConfig, Session};
use crw_state::{ChainStore, Listener, SledStore};

use crw_node::{service::NodeService, Config};

fn install_tracing(filter: &str) -> Result<()> {
    let filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(ErrorLayer::default());
    tracing::subscriber::set_global_default(subscriber)?;
    color_eyre::install()?;
    Ok(())
}

/// The `--config <path>` flag, parsed by hand rather than pulling in a CLI
/// argument crate for a single optional path.
fn config_path_from_args() -> Option<PathBuf> {
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            return args.next().map(PathBuf::from);
        }
    }
    None
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = match config_path_from_args() {
        Some(path) => Config::load(&path)?,
        None => Config::default(),
    };

    install_tracing(&config.log_filter)?;
    info!(network = %config.network, "starting crw-node");

    let state_config = config.state_config();
    let network_config = config.network_config()?;

    let mut store = SledStore::new(&state_config, config.network);

    if store.get_chain_head()?.is_none() {
        let genesis = crw_node::genesis::genesis_block(config.network)?;
        let hash = store.apply_block(genesis)?;
        info!(%hash, "bootstrapped genesis block");
    }

    let engine = Arc::new(Engine::new(store, Listener::new(), config.network, &state_config)?);
    let best_height = engine.chain_head()?.map(|(height, _)| height).unwrap_or(crw_chain::block::Height(0));
    let service = NodeService::new(engine);

    let requested = Arc::new(Mutex::new(HashSet::new()));
    let handshake_config = HandshakeConfig { network: config.network, ..HandshakeConfig::default() };

    metrics::gauge!("crw_node.configured_peers", network_config.initial_peers.len() as i64);

    let mut sessions = Vec::new();
    for addr in network_config.initial_peers {
        let service = service.clone();
        let requested = requested.clone();
        let handshake_config = handshake_config.clone();
        let max_inv_queue = network_config.max_inv_queue;
        sessions.push(tokio::spawn(
            async move {
                let (transport, _services) = connect(addr, &handshake_config, best_height).await?;
                metrics::counter!("crw_node.peer_sessions_started", 1);
                Session::new(transport, service, requested, max_inv_queue).run().await
            }
            .instrument(tracing::info_span!("peer_session", %addr)),
        ));
    }
    for session in sessions {
        match session.await {
            Ok(Ok(())) => {}
            Ok(Err(error)) => warn!(%error, "peer session ended"),
            Err(error) => warn!(%error, "peer session task panicked"),
        }
    }

    Ok(())
}
