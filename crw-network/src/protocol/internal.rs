//! The request/response vocabulary a peer session speaks to the rest of the
//! node (chain engine, block store) through an injected `tower::Service`.
//!
//! Keeping this as its own small protocol -- rather than having sessions
//! depend on `crw-consensus`/`crw-state` directly -- is what lets this crate
//! stay a pure protocol-and-transport library: `crw-node` is the only place
//! that wires a concrete engine/store into a service answering these.

use std::sync::Arc;

use crw_chain::{block, transaction::Transaction};

/// A request a peer session makes of the rest of the node.
#[derive(Clone, Debug)]
pub enum Request {
    /// Which of these hashes does this node already have a block for?
    ///
    /// Used to filter an unsolicited `inv` down to the hashes actually
    /// worth a `getdata`, and to answer a peer's own `getdata` queries.
    KnownBlocks(Vec<block::Hash>),

    /// Walk the header index forward from the locator's common ancestor,
    /// to answer a peer's `getheaders`.
    FindHeaders {
        known_blocks: Vec<block::Hash>,
        stop: Option<block::Hash>,
    },

    /// This node's own locator, sent when opening a header sync with a
    /// newly `Active` peer.
    GetLocator,

    /// Fetch full blocks this node already has, to answer a peer's `getdata`.
    Blocks(Vec<block::Hash>),

    /// Hand a freshly downloaded block to the chain engine.
    PushBlock(Arc<block::Block>),

    /// Hand a freshly received transaction to the node. CRW has no mempool
    /// in this extract; accepted only so it can be relayed onward.
    PushTransaction(Arc<Transaction>),
}

/// The chain engine's answer to [`Request::PushBlock`], translated out of
/// `crw-consensus`'s richer `VerificationError` taxonomy into the two
/// outcomes a peer session needs to act on.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum AddBlockOutcome {
    NewBest,
    SideChain,
    Unchanged,
    /// The block's parent isn't known yet; the session should stash it and
    /// retry once the parent arrives, or just drop it -- the core doesn't
    /// buffer orphans beyond a bounded map.
    Orphan,
    /// Context-free or contextual validation failed; the peer that sent
    /// this block should be disconnected and blacklisted for the session.
    Rejected,
}

/// The answer to a [`Request`].
#[derive(Clone, Debug)]
pub enum Response {
    KnownBlocks(Vec<bool>),
    Headers(Vec<block::Header>),
    Locator(Vec<block::Hash>),
    /// Blocks found for a [`Request::Blocks`]; hashes with no match are
    /// silently omitted rather than erroring.
    Blocks(Vec<Arc<block::Block>>),
    Added(AddBlockOutcome),
    Nil,
}
