//! Wires a real `SledStore` and `Engine` together over a synthetic regtest
//! genesis, the way `main` does on first startup against an empty store.

use std::sync::Arc;

use crw_chain::block;
use crw_chain::parameters::Network;
use crw_consensus::Engine;
use crw_state::{ChainStore, Config, Listener, SledStore};

use tower::Service;

use crw_network::protocol::internal::{Request, Response};
use crw_node::genesis::genesis_block;
use crw_node::service::NodeService;

#[tokio::test]
async fn genesis_only_store_reports_genesis_as_the_chain_head() {
    let dir = tempdir::TempDir::new("crw-node-smoke").unwrap();
    let config = Config { cache_dir: dir.path().to_path_buf(), ..Config::default() };

    let mut store = SledStore::new(&config, Network::Regtest);
    let genesis = genesis_block(Network::Regtest).unwrap();
    let genesis_hash = genesis.hash();

    let hash = store.apply_block(genesis).unwrap();
    assert_eq!(hash, genesis_hash);

    let engine = Arc::new(Engine::new(store, Listener::new(), Network::Regtest, &config).unwrap());
    assert_eq!(engine.chain_head().unwrap(), Some((block::Height(0), genesis_hash)));
    assert!(engine.has_block(genesis_hash));

    let mut service = NodeService::new(engine);
    match service.call(Request::GetLocator).await.unwrap() {
        Response::Locator(hashes) => assert_eq!(hashes, vec![genesis_hash]),
        other => panic!("unexpected response: {:?}", other),
    }
}
