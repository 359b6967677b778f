//! The `tower::Service` a peer session drives: translates
//! `crw-network`'s internal request vocabulary into calls against a
//! concrete chain engine.

use std::sync::Arc;
use std::task::{Context, Poll};

use futures::future::{ready, Ready};
use tower::Service;

use crw_consensus::{AddBlockResult, Engine, VerificationError};
use crw_network::protocol::internal::{AddBlockOutcome, Request, Response};
use crw_state::ChainStore;

use crate::error::NodeError;

/// Answers a peer session's requests against one shared chain engine.
///
/// Cheaply `Clone`-able: every session gets its own handle, but they all
/// drive the same [`Engine`], which serializes `add_block` internally.
pub struct NodeService<S: ChainStore> {
    engine: Arc<Engine<S>>,
}

impl<S: ChainStore> Clone for NodeService<S> {
    fn clone(&self) -> Self {
        NodeService { engine: self.engine.clone() }
    }
}

impl<S: ChainStore> NodeService<S> {
    pub fn new(engine: Arc<Engine<S>>) -> Self {
        NodeService { engine }
    }

    fn handle(&self, request: Request) -> Result<Response, NodeError> {
        match request {
            Request::KnownBlocks(hashes) => {
                let known = hashes.into_iter().map(|hash| self.engine.has_block(hash)).collect();
                Ok(Response::KnownBlocks(known))
            }
            Request::FindHeaders { known_blocks, stop } => {
                let headers = self.engine.find_headers(&known_blocks, stop)?;
                Ok(Response::Headers(headers))
            }
            Request::GetLocator => Ok(Response::Locator(self.engine.locator()?)),
            Request::Blocks(hashes) => {
                let mut blocks = Vec::with_capacity(hashes.len());
                for hash in hashes {
                    if let Some(block) = self.engine.get_block(hash)? {
                        blocks.push(block);
                    }
                }
                Ok(Response::Blocks(blocks))
            }
            Request::PushBlock(block) => {
                let outcome = match self.engine.add_block(block) {
                    Ok(AddBlockResult::NewBest) => AddBlockOutcome::NewBest,
                    Ok(AddBlockResult::SideChain) => AddBlockOutcome::SideChain,
                    Ok(AddBlockResult::Unchanged) => AddBlockOutcome::Unchanged,
                    Err(VerificationError::Orphan) => AddBlockOutcome::Orphan,
                    Err(error) => {
                        debug!(%error, "rejected block pushed by a peer");
                        AddBlockOutcome::Rejected
                    }
                };
                Ok(Response::Added(outcome))
            }
            // CRW carries no mempool in this extract; accept and drop so a
            // session doesn't treat this as a protocol violation.
            Request::PushTransaction(_) => Ok(Response::Nil),
        }
    }
}

impl<S: ChainStore> Service<Request> for NodeService<S> {
    type Response = Response;
    type Error = NodeError;
    type Future = Ready<Result<Response, NodeError>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: Request) -> Self::Future {
        ready(self.handle(request))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use crw_chain::block;
    use crw_state::{BoxError, Listener, StateError, Utxo};

    use super::*;

    /// A minimal in-memory `ChainStore`, just enough to drive `NodeService`
    /// through `Engine::new` -- the engine's own test module has a fuller
    /// version of this pattern for exercising validation itself.
    #[derive(Default)]
    struct MemoryStore {
        headers: Mutex<HashMap<block::Hash, block::Header>>,
        by_height: Mutex<HashMap<block::Height, block::Hash>>,
        blocks: Mutex<HashMap<block::Hash, Arc<block::Block>>>,
        head: Mutex<Option<(block::Height, block::Hash)>>,
    }

    impl ChainStore for MemoryStore {
        fn put_header(&mut self, header: &block::Header) -> Result<(), BoxError> {
            self.headers.lock().unwrap().insert(block::Hash::from(header), header.clone());
            Ok(())
        }
        fn get_header(&self, hash: block::Hash) -> Result<Option<block::Header>, BoxError> {
            Ok(self.headers.lock().unwrap().get(&hash).cloned())
        }
        fn get_header_by_height(&self, height: block::Height) -> Result<Option<block::Header>, BoxError> {
            let by_height = self.by_height.lock().unwrap();
            Ok(match by_height.get(&height) {
                Some(hash) => self.headers.lock().unwrap().get(hash).cloned(),
                None => None,
            })
        }
        fn get_block(&self, hash: block::Hash) -> Result<Option<Arc<block::Block>>, BoxError> {
            Ok(self.blocks.lock().unwrap().get(&hash).cloned())
        }
        fn set_chain_head(&mut self, hash: block::Hash) -> Result<(), BoxError> {
            *self.head.lock().unwrap() = Some((block::Height(0), hash));
            Ok(())
        }
        fn get_chain_head(&self) -> Result<Option<(block::Height, block::Hash)>, BoxError> {
            Ok(*self.head.lock().unwrap())
        }
        fn apply_block(&mut self, block: Arc<block::Block>) -> Result<block::Hash, StateError> {
            let hash = block.hash();
            self.by_height.lock().unwrap().insert(block::Height(0), hash);
            self.headers.lock().unwrap().insert(hash, block.header.clone());
            self.blocks.lock().unwrap().insert(hash, block);
            *self.head.lock().unwrap() = Some((block::Height(0), hash));
            Ok(hash)
        }
        fn revert_block(&mut self, hash: block::Hash) -> Result<Arc<block::Block>, StateError> {
            self.blocks
                .lock()
                .unwrap()
                .remove(&hash)
                .ok_or(StateError::NotATip(hash))
        }
        fn get_utxo(&self, _outpoint: &crw_chain::transparent::OutPoint) -> Result<Option<Utxo>, BoxError> {
            Ok(None)
        }
        fn has_utxo(&self, _outpoint: &crw_chain::transparent::OutPoint) -> Result<bool, BoxError> {
            Ok(false)
        }
    }

    fn engine_over_genesis() -> Arc<Engine<MemoryStore>> {
        let genesis = crate::genesis::genesis_block(crw_chain::parameters::Network::Regtest).unwrap();
        let mut store = MemoryStore::default();
        store.apply_block(genesis).unwrap();
        let engine = Engine::new(store, Listener::new(), crw_chain::parameters::Network::Regtest, &crw_state::Config::default())
            .unwrap();
        Arc::new(engine)
    }

    #[tokio::test]
    async fn get_locator_answers_with_the_genesis_hash() {
        let mut service = NodeService::new(engine_over_genesis());
        match service.call(Request::GetLocator).await.unwrap() {
            Response::Locator(hashes) => assert_eq!(hashes.len(), 1),
            other => panic!("unexpected response: {:?}", other),
        }
    }

    #[tokio::test]
    async fn known_blocks_reports_an_unknown_hash_as_unknown() {
        let mut service = NodeService::new(engine_over_genesis());
        let unknown = block::Hash([0xAB; 32]);
        match service.call(Request::KnownBlocks(vec![unknown])).await.unwrap() {
            Response::KnownBlocks(known) => assert_eq!(known, vec![false]),
            other => panic!("unexpected response: {:?}", other),
        }
    }
}
