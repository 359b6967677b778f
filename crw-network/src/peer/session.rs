//! The `Active` state: drives header/block sync, answers peer queries, and
//! keeps the connection alive with pings.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use futures::{SinkExt, StreamExt};
use tokio::time::interval;
use tower::{Service, ServiceExt};

use crw_chain::block;

use crate::constants;
use crate::protocol::external::{GetHeaders, InventoryHash, Message, Nonce};
use crate::protocol::internal::{AddBlockOutcome, Request, Response};

use super::error::PeerError;
use super::handshake::Transport;

/// Block hashes some session has already requested via `getdata`, shared
/// across all sessions so two peers never download the same block at once.
pub type RequestedBlocks = Arc<Mutex<HashSet<block::Hash>>>;

/// Drives one handshaken connection through the `Active` state.
pub struct Session<S> {
    transport: Transport,
    service: S,
    requested: RequestedBlocks,
    inv_queue_len: usize,
    max_inv_queue: usize,
}

impl<S> Session<S>
where
    S: Service<Request, Response = Response>,
    S::Error: std::fmt::Display,
{
    pub fn new(
        transport: Transport,
        service: S,
        requested: RequestedBlocks,
        max_inv_queue: usize,
    ) -> Self {
        Session {
            transport,
            service,
            requested,
            inv_queue_len: 0,
            max_inv_queue,
        }
    }

    /// Run the session to completion: open a header sync, then alternate
    /// between serving incoming messages and periodic pings until the
    /// connection closes or a protocol violation ends it.
    pub async fn run(mut self) -> Result<(), PeerError> {
        self.start_header_sync().await?;

        let mut ping_interval = interval(constants::PING_INTERVAL);
        ping_interval.tick().await;

        loop {
            tokio::select! {
                message = self.transport.next() => {
                    match message {
                        Some(Ok(message)) => self.handle(message).await?,
                        Some(Err(error)) => return Err(error.into()),
                        None => return Ok(()),
                    }
                }
                _ = ping_interval.tick() => {
                    self.transport.send(Message::Ping(Nonce(rand::random()))).await?;
                }
            }
        }
    }

    async fn start_header_sync(&mut self) -> Result<(), PeerError> {
        let known_blocks = match self.call(Request::GetLocator).await? {
            Response::Locator(hashes) => hashes,
            _ => Vec::new(),
        };
        self.transport
            .send(Message::GetHeaders(GetHeaders {
                block_header_hashes: known_blocks,
                stop_hash: None,
            }))
            .await?;
        Ok(())
    }

    async fn handle(&mut self, message: Message) -> Result<(), PeerError> {
        match message {
            Message::Ping(nonce) => self.transport.send(Message::Pong(nonce)).await?,
            Message::Pong(_) => {}
            Message::Inv(hashes) => self.handle_inv(hashes).await?,
            Message::GetHeaders(get_headers) => self.handle_get_headers(get_headers).await?,
            Message::Headers(headers) => self.handle_headers(headers).await?,
            Message::GetData(hashes) => self.handle_get_data(hashes).await?,
            Message::Block(block) => self.handle_block(block).await?,
            Message::NotFound(hashes) => self.handle_notfound(hashes),
            Message::Tx(tx) => {
                // Best-effort: CRW carries no mempool, so a failure here
                // isn't a protocol violation.
                let _ = self.call(Request::PushTransaction(tx)).await;
            }
            Message::Reject { .. } => {}
            Message::Mempool => self.transport.send(Message::Inv(Vec::new())).await?,
            Message::Verack | Message::Version(_) => {
                return Err(PeerError::UnexpectedDuringHandshake(
                    "handshake message received while Active",
                ))
            }
        }
        Ok(())
    }

    async fn handle_inv(&mut self, hashes: Vec<InventoryHash>) -> Result<(), PeerError> {
        self.inv_queue_len += hashes.len();
        if self.inv_queue_len > self.max_inv_queue {
            return Err(PeerError::InvOverflow);
        }

        let block_hashes: Vec<block::Hash> = hashes
            .iter()
            .filter_map(|inv| match inv {
                InventoryHash::Block(hash) => Some(*hash),
                _ => None,
            })
            .collect();

        self.inv_queue_len -= hashes.len();
        if block_hashes.is_empty() {
            return Ok(());
        }

        let known = match self.call(Request::KnownBlocks(block_hashes.clone())).await? {
            Response::KnownBlocks(known) => known,
            _ => vec![false; block_hashes.len()],
        };

        let to_request = self.dedupe_and_track(block_hashes.into_iter().zip(known));
        if !to_request.is_empty() {
            self.transport.send(Message::GetData(to_request)).await?;
        }
        Ok(())
    }

    async fn handle_get_headers(&mut self, get_headers: GetHeaders) -> Result<(), PeerError> {
        let response = self
            .call(Request::FindHeaders {
                known_blocks: get_headers.block_header_hashes,
                stop: get_headers.stop_hash,
            })
            .await?;
        if let Response::Headers(headers) = response {
            let counted = headers
                .into_iter()
                .take(constants::MAX_HEADERS_PER_MESSAGE)
                .map(|header| block::CountedHeader {
                    header,
                    transaction_count: 0,
                })
                .collect();
            self.transport.send(Message::Headers(counted)).await?;
        }
        Ok(())
    }

    async fn handle_headers(&mut self, headers: Vec<block::CountedHeader>) -> Result<(), PeerError> {
        if headers.is_empty() {
            return Ok(());
        }
        let hashes = self.dedupe_and_track(
            headers
                .into_iter()
                .map(|mut counted| (counted.header.hash(), false)),
        );
        if !hashes.is_empty() {
            self.transport.send(Message::GetData(hashes)).await?;
        }
        Ok(())
    }

    async fn handle_get_data(&mut self, hashes: Vec<InventoryHash>) -> Result<(), PeerError> {
        let block_hashes: Vec<block::Hash> = hashes
            .iter()
            .filter_map(|inv| match inv {
                InventoryHash::Block(hash) => Some(*hash),
                _ => None,
            })
            .collect();
        if block_hashes.is_empty() {
            return Ok(());
        }

        // Missing blocks are silently skipped, per the wire protocol's
        // convention for block/header getdata (unlike transactions).
        if let Response::Blocks(blocks) = self.call(Request::Blocks(block_hashes)).await? {
            for block in blocks {
                self.transport.send(Message::Block(block)).await?;
            }
        }
        Ok(())
    }

    async fn handle_block(&mut self, block: std::sync::Arc<block::Block>) -> Result<(), PeerError> {
        let hash = block.hash();
        let was_requested = self
            .requested
            .lock()
            .expect("requested-blocks lock poisoned")
            .remove(&hash);
        if !was_requested {
            return Err(PeerError::UnrequestedBlock);
        }

        match self.call(Request::PushBlock(block)).await? {
            Response::Added(AddBlockOutcome::NewBest) => self.start_header_sync().await?,
            Response::Added(AddBlockOutcome::Rejected) => {
                return Err(PeerError::Banned(format!("invalid block {:?}", hash)))
            }
            Response::Added(_) => {}
            _ => {}
        }
        Ok(())
    }

    fn handle_notfound(&mut self, hashes: Vec<InventoryHash>) {
        let mut requested = self.requested.lock().expect("requested-blocks lock poisoned");
        for inv in hashes {
            if let InventoryHash::Block(hash) = inv {
                requested.remove(&hash);
            }
        }
    }

    /// Mark each not-already-known, not-already-requested hash as requested
    /// by this session, returning the ones newly added as `getdata` entries.
    fn dedupe_and_track(
        &self,
        hashes: impl IntoIterator<Item = (block::Hash, bool)>,
    ) -> Vec<InventoryHash> {
        let mut requested = self.requested.lock().expect("requested-blocks lock poisoned");
        hashes
            .into_iter()
            .filter_map(|(hash, is_known)| {
                if !is_known && requested.insert(hash) {
                    Some(InventoryHash::Block(hash))
                } else {
                    None
                }
            })
            .collect()
    }

    async fn call(&mut self, request: Request) -> Result<Response, PeerError> {
        let service = self
            .service
            .ready()
            .await
            .map_err(|error| PeerError::Service(error.to_string()))?;
        service.call(request).await.map_err(|error| PeerError::Service(error.to_string()))
    }
}
