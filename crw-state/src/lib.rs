//! A UTXO-backed block store: structural indices (header/height lookups),
//! the UTXO set, undo data for reorgs, and a listener fan-out for
//! `NewBestBlock`/`Reorganize`/`TransactionReceivedInBlock` events.

pub mod config;
pub mod listener;
pub mod service;
mod sled_format;
pub mod sled_state;
pub mod utxo;

pub use config::Config;
pub use listener::{Event, Listener, Relativity};
pub use service::pending_utxos::PendingUtxos;
pub use sled_state::SledStore;
pub use utxo::Utxo;

use std::sync::Arc;

use crw_chain::block::{self, Block};

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A reference to a block by either its hash or its height.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum HashOrHeight {
    Hash(block::Hash),
    Height(block::Height),
}

impl From<block::Hash> for HashOrHeight {
    fn from(hash: block::Hash) -> Self {
        HashOrHeight::Hash(hash)
    }
}

impl From<block::Height> for HashOrHeight {
    fn from(height: block::Height) -> Self {
        HashOrHeight::Height(height)
    }
}

/// An error committing or reverting a block.
#[derive(thiserror::Error, Debug)]
pub enum StateError {
    #[error("block {0:?} does not extend the current tip")]
    NotATip(block::Hash),
    #[error("reorg of {0} blocks exceeds the configured maximum of {1}")]
    ReorgTooDeep(u32, u32),
    #[error(transparent)]
    Backend(#[from] BoxError),
}

/// A block queued for commitment, together with a channel the caller is
/// notified on once it either lands or is rejected.
pub struct QueuedBlock {
    pub block: Arc<Block>,
    pub rsp_tx: tokio::sync::oneshot::Sender<Result<block::Hash, BoxError>>,
}

/// The capability trait the chain engine drives; `SledStore` is the only
/// implementation, but keeping this as a trait means the engine and its
/// tests don't depend on a particular storage engine.
pub trait ChainStore {
    fn put_header(&mut self, header: &block::Header) -> Result<(), BoxError>;
    fn get_header(&self, hash: block::Hash) -> Result<Option<block::Header>, BoxError>;
    /// Look up the header on the *active* chain at `height`, if any.
    ///
    /// Used to answer `getheaders` locator requests, which walk forward
    /// from a common ancestor by height rather than by hash.
    fn get_header_by_height(&self, height: block::Height) -> Result<Option<block::Header>, BoxError>;

    /// Fetch a block's full body, if this store still retains it.
    ///
    /// Bodies are only kept within the reorg-undo retention window (see
    /// [`Config::maximum_reorg_block_count`]), so this returns `None` for
    /// blocks pruned past it even though [`Self::get_header`] still knows
    /// about them.
    fn get_block(&self, hash: block::Hash) -> Result<Option<Arc<Block>>, BoxError>;

    fn set_chain_head(&mut self, hash: block::Hash) -> Result<(), BoxError>;
    fn get_chain_head(&self) -> Result<Option<(block::Height, block::Hash)>, BoxError>;

    fn apply_block(&mut self, block: Arc<Block>) -> Result<block::Hash, StateError>;
    fn revert_block(&mut self, hash: block::Hash) -> Result<Arc<Block>, StateError>;

    fn get_utxo(&self, outpoint: &crw_chain::transparent::OutPoint) -> Result<Option<Utxo>, BoxError>;
    fn has_utxo(&self, outpoint: &crw_chain::transparent::OutPoint) -> Result<bool, BoxError>;
}
