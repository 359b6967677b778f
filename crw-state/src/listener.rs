//! Broadcasts chain-state changes to anyone subscribed, without the store
//! holding a back-reference to its listeners.

use std::sync::Arc;

use tokio::sync::broadcast;

use crw_chain::{block, transaction};

const CHANNEL_CAPACITY: usize = 256;

/// Where a transaction's containing block sits relative to the best chain
/// at the moment its `TransactionReceivedInBlock` event fires.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Relativity {
    BestChain,
    SideChain,
}

/// An immutable, cheaply-`Clone`-able notification of a chain-state change.
#[derive(Clone, Debug)]
pub enum Event {
    /// A new block became the chain tip (no reorg involved).
    NewBestBlock(Arc<block::Block>),
    /// The active chain switched to a different branch. `disconnected` and
    /// `connected` are ordered tip-to-ancestor and ancestor-to-tip
    /// respectively, matching the order blocks were reverted/applied in.
    Reorganize {
        old_tip: block::Hash,
        new_tip: block::Hash,
        common_ancestor: block::Hash,
        disconnected: Vec<block::Hash>,
        connected: Vec<block::Hash>,
    },
    /// A transaction was included in a block, tagged with whether that
    /// block sits on the best chain or a side chain and the transaction's
    /// position within it.
    TransactionReceivedInBlock {
        transaction: Arc<transaction::Transaction>,
        block: Arc<block::Block>,
        relativity: Relativity,
        index_in_block: usize,
    },
}

/// A fan-out point: any number of subscribers receive every [`Event`] sent,
/// each over its own lagging-tolerant queue.
#[derive(Clone)]
pub struct Listener {
    sender: broadcast::Sender<Event>,
}

impl Listener {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Listener { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    /// Broadcasts `event`. Returns `Ok(())` even if there are no
    /// subscribers; a send error here only ever means that.
    pub fn send(&self, event: Event) {
        let _ = self.sender.send(event);
    }
}

impl Default for Listener {
    fn default() -> Self {
        Listener::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_events_sent_after_they_subscribe() {
        let listener = Listener::new();
        let mut receiver = listener.subscribe();

        listener.send(Event::Reorganize {
            old_tip: block::Hash([0; 32]),
            new_tip: block::Hash([1; 32]),
            common_ancestor: block::Hash([2; 32]),
            disconnected: vec![block::Hash([0; 32])],
            connected: vec![block::Hash([1; 32])],
        });

        let event = receiver.recv().await.unwrap();
        assert!(matches!(event, Event::Reorganize { .. }));
    }
}
