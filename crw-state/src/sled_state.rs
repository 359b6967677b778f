//! The finalized block store, backed by `sled`.

use std::{collections::HashMap, convert::TryInto, sync::Arc};

use sled::{transaction::TransactionError, Transactional};
use tracing::trace;

use crw_chain::{
    block::{self, Block},
    parameters::{Network, GENESIS_PREVIOUS_BLOCK_HASH},
    transparent,
};

use crate::{
    sled_format::{FromSled, SledDeserialize, SledSerialize, SledTreeExt},
    BoxError, ChainStore, Config, StateError, Utxo,
};

const CHAIN_HEAD_KEY: &[u8] = b"chain_head";

/// Everything needed to reverse a committed block, keyed by its height.
struct UndoData {
    previous_tip: Option<block::Hash>,
    /// Outputs this block's inputs spent, removed from the UTXO set when
    /// the block was applied and restored on revert.
    spent: Vec<(transparent::OutPoint, Utxo)>,
    /// Outputs this block created, removed from the UTXO set on revert.
    created: Vec<transparent::OutPoint>,
}

impl SledSerialize for UndoData {
    fn sled_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::new();
        match self.previous_tip {
            Some(hash) => {
                bytes.push(1);
                bytes.extend_from_slice(&hash.0);
            }
            None => bytes.push(0),
        }
        bytes.extend_from_slice(&(self.spent.len() as u32).to_be_bytes());
        for (outpoint, utxo) in &self.spent {
            let encoded = outpoint.sled_bytes();
            bytes.extend_from_slice(&(encoded.len() as u32).to_be_bytes());
            bytes.extend_from_slice(&encoded);
            let encoded = utxo.output.sled_bytes();
            bytes.extend_from_slice(&(encoded.len() as u32).to_be_bytes());
            bytes.extend_from_slice(&encoded);
            bytes.extend_from_slice(&utxo.height.0.to_be_bytes());
            bytes.push(utxo.is_coinbase as u8);
        }
        bytes.extend_from_slice(&(self.created.len() as u32).to_be_bytes());
        for outpoint in &self.created {
            let encoded = outpoint.sled_bytes();
            bytes.extend_from_slice(&(encoded.len() as u32).to_be_bytes());
            bytes.extend_from_slice(&encoded);
        }
        bytes
    }
}

impl SledDeserialize for UndoData {
    fn from_sled_bytes(bytes: &[u8]) -> Result<Self, BoxError> {
        let mut pos = 0;
        let read_u32 = |bytes: &[u8], pos: &mut usize| -> Result<u32, BoxError> {
            let value = u32::from_be_bytes(bytes[*pos..*pos + 4].try_into()?);
            *pos += 4;
            Ok(value)
        };

        let has_previous_tip = bytes[pos];
        pos += 1;
        let previous_tip = if has_previous_tip == 1 {
            let array: [u8; 32] = bytes[pos..pos + 32].try_into()?;
            pos += 32;
            Some(block::Hash(array))
        } else {
            None
        };

        let spent_count = read_u32(bytes, &mut pos)?;
        let mut spent = Vec::with_capacity(spent_count as usize);
        for _ in 0..spent_count {
            let len = read_u32(bytes, &mut pos)? as usize;
            let outpoint = transparent::OutPoint::from_sled_bytes(&bytes[pos..pos + len])?;
            pos += len;
            let len = read_u32(bytes, &mut pos)? as usize;
            let output = transparent::Output::from_sled_bytes(&bytes[pos..pos + len])?;
            pos += len;
            let height = block::Height(read_u32(bytes, &mut pos)?);
            let is_coinbase = bytes[pos] != 0;
            pos += 1;
            spent.push((outpoint, Utxo::new(output, height, is_coinbase)));
        }

        let created_count = read_u32(bytes, &mut pos)?;
        let mut created = Vec::with_capacity(created_count as usize);
        for _ in 0..created_count {
            let len = read_u32(bytes, &mut pos)? as usize;
            created.push(transparent::OutPoint::from_sled_bytes(&bytes[pos..pos + len])?);
            pos += len;
        }

        Ok(UndoData { previous_tip, spent, created })
    }
}

/// The finalized part of the chain state.
///
/// Cheap to clone: every field is a `sled::Tree`, itself a handle onto
/// shared, reference-counted pages, so a clone is a second handle onto the
/// same on-disk database rather than a copy of it. This lets callers keep a
/// read-only handle for queries alongside the one the chain engine owns
/// for writes.
#[derive(Clone)]
pub struct SledStore {
    maximum_reorg_block_count: u32,

    headers: sled::Tree,
    heights: sled::Tree,
    hash_by_height: sled::Tree,
    chain_head: sled::Tree,
    utxo: sled::Tree,
    undo: sled::Tree,
    blocks: sled::Tree,
}

impl SledStore {
    pub fn new(config: &Config, network: Network) -> Self {
        let db = config.sled_config(network).open().expect("sled database path must be usable");

        SledStore {
            maximum_reorg_block_count: config.maximum_reorg_block_count,
            headers: db.open_tree(b"headers").expect("opening a tree cannot fail"),
            heights: db.open_tree(b"heights").expect("opening a tree cannot fail"),
            hash_by_height: db.open_tree(b"hash_by_height").expect("opening a tree cannot fail"),
            chain_head: db.open_tree(b"chain_head").expect("opening a tree cannot fail"),
            utxo: db.open_tree(b"utxo").expect("opening a tree cannot fail"),
            undo: db.open_tree(b"undo").expect("opening a tree cannot fail"),
            blocks: db.open_tree(b"blocks").expect("opening a tree cannot fail"),
        }
    }

    fn height_of(&self, hash: block::Hash) -> Result<Option<block::Height>, BoxError> {
        self.heights.zs_get(&hash)
    }

    fn prune_undo_below(&self, height: block::Height) -> Result<(), BoxError> {
        if height.0 < self.maximum_reorg_block_count {
            return Ok(());
        }
        let prune_height = block::Height(height.0 - self.maximum_reorg_block_count);
        self.undo.zs_remove(&prune_height)
    }
}

impl ChainStore for SledStore {
    fn put_header(&mut self, header: &block::Header) -> Result<(), BoxError> {
        let hash = block::Hash::from(header);
        self.headers.zs_insert(hash, *header)?;
        Ok(())
    }

    fn get_header(&self, hash: block::Hash) -> Result<Option<block::Header>, BoxError> {
        self.headers.zs_get(&hash)
    }

    fn get_header_by_height(&self, height: block::Height) -> Result<Option<block::Header>, BoxError> {
        match self.hash_by_height.zs_get::<_, block::Hash>(&height)? {
            Some(hash) => self.headers.zs_get(&hash),
            None => Ok(None),
        }
    }

    fn get_block(&self, hash: block::Hash) -> Result<Option<Arc<Block>>, BoxError> {
        match self.height_of(hash)? {
            Some(height) => Ok(self.blocks.zs_get::<_, Block>(&height)?.map(Arc::new)),
            None => Ok(None),
        }
    }

    fn set_chain_head(&mut self, hash: block::Hash) -> Result<(), BoxError> {
        let height = self.height_of(hash)?.ok_or("chain head hash has no recorded height")?;
        let mut bytes = height.sled_bytes();
        bytes.extend_from_slice(&hash.0);
        self.chain_head.insert(CHAIN_HEAD_KEY, bytes)?;
        Ok(())
    }

    fn get_chain_head(&self) -> Result<Option<(block::Height, block::Hash)>, BoxError> {
        match self.chain_head.get(CHAIN_HEAD_KEY)? {
            Some(bytes) => {
                let height = block::Height::from_sled_bytes(&bytes[..4])?;
                let hash_array: [u8; 32] = bytes[4..36].try_into()?;
                Ok(Some((height, block::Hash(hash_array))))
            }
            None => Ok(None),
        }
    }

    fn apply_block(&mut self, block: Arc<Block>) -> Result<block::Hash, StateError> {
        let hash = block.hash();
        let previous_tip = self.get_chain_head().map_err(StateError::Backend)?.map(|(_, hash)| hash);
        let expected_parent = previous_tip.unwrap_or(GENESIS_PREVIOUS_BLOCK_HASH);
        if block.header.previous_block_hash != expected_parent {
            return Err(StateError::NotATip(hash));
        }

        let height = match self.height_of(block.header.previous_block_hash).map_err(StateError::Backend)? {
            Some(parent_height) => parent_height.next().expect("height does not overflow u32::MAX blocks"),
            None => block::Height(0),
        };

        let mut spent = Vec::new();
        let mut created = Vec::new();

        // Outputs created earlier in this same block are spendable by
        // later inputs in it, so track them before touching the store.
        let mut in_block_outputs = HashMap::new();
        for transaction in &block.transactions {
            let tx_hash = transaction.hash();
            for (index, output) in transaction.outputs.iter().enumerate() {
                let outpoint = transparent::OutPoint { hash: tx_hash, index: index as u32 };
                in_block_outputs.insert(outpoint, output.clone());
            }
        }

        for transaction in &block.transactions {
            if transaction.is_coinbase() {
                continue;
            }
            for input in &transaction.inputs {
                if let crw_chain::transparent::Input::PrevOut { outpoint, .. } = input {
                    if in_block_outputs.contains_key(outpoint) {
                        continue;
                    }
                    let utxo: Utxo = self
                        .utxo
                        .zs_get(outpoint)
                        .map_err(StateError::Backend)?
                        .ok_or_else(|| StateError::Backend(format!("missing utxo for {:?}", outpoint).into()))?;
                    spent.push((*outpoint, utxo));
                }
            }
        }

        let mut new_utxos = Vec::new();
        for transaction in &block.transactions {
            let tx_hash = transaction.hash();
            let is_coinbase = transaction.is_coinbase();
            for (index, output) in transaction.outputs.iter().enumerate() {
                let outpoint = transparent::OutPoint { hash: tx_hash, index: index as u32 };
                created.push(outpoint);
                new_utxos.push((outpoint, Utxo::new(output.clone(), height, is_coinbase)));
            }
        }

        let undo = UndoData { previous_tip, spent: spent.clone(), created: created.clone() };

        let result: Result<(), TransactionError<BoxError>> =
            (&self.headers, &self.heights, &self.hash_by_height, &self.chain_head, &self.utxo, &self.undo, &self.blocks)
                .transaction(|(headers, heights, hash_by_height, chain_head, utxo, undo_tree, blocks)| {
                    headers.insert(hash.sled_bytes(), block.header.sled_bytes())?;
                    heights.insert(hash.sled_bytes(), height.sled_bytes())?;
                    hash_by_height.insert(height.sled_bytes(), hash.sled_bytes())?;

                    let mut head_bytes = height.sled_bytes();
                    head_bytes.extend_from_slice(&hash.0);
                    chain_head.insert(CHAIN_HEAD_KEY, head_bytes)?;

                    for (outpoint, _) in &spent {
                        utxo.remove(outpoint.sled_bytes())?;
                    }
                    for (outpoint, new_utxo) in &new_utxos {
                        utxo.insert(outpoint.sled_bytes(), new_utxo.sled_bytes())?;
                    }

                    undo_tree.insert(height.sled_bytes(), undo.sled_bytes())?;
                    blocks.insert(height.sled_bytes(), block.sled_bytes())?;

                    Ok(())
                });
        result.map_err(|e| StateError::Backend(format!("{:?}", e).into()))?;

        self.prune_undo_below(height).map_err(StateError::Backend)?;

        trace!(?height, ?hash, "applied block");
        Ok(hash)
    }

    fn revert_block(&mut self, hash: block::Hash) -> Result<Arc<Block>, StateError> {
        let height = self
            .height_of(hash)
            .map_err(StateError::Backend)?
            .ok_or_else(|| StateError::Backend("revert target has no recorded height".into()))?;

        if let Some((tip_height, _)) = self.get_chain_head().map_err(StateError::Backend)? {
            if tip_height.0.saturating_sub(height.0) > self.maximum_reorg_block_count {
                return Err(StateError::ReorgTooDeep(
                    tip_height.0 - height.0,
                    self.maximum_reorg_block_count,
                ));
            }
        }

        let undo: UndoData = self
            .undo
            .zs_get(&height)
            .map_err(StateError::Backend)?
            .ok_or_else(|| StateError::Backend("no undo data for this height".into()))?;

        let block: block::Block = self
            .blocks
            .zs_get(&height)
            .map_err(StateError::Backend)?
            .ok_or_else(|| StateError::Backend("no block body stored for this height".into()))?;

        let previous_tip = undo.previous_tip;
        let height_bytes = height.sled_bytes();
        let hash_bytes = hash.sled_bytes();

        let result: Result<(), TransactionError<BoxError>> =
            (&self.headers, &self.heights, &self.hash_by_height, &self.chain_head, &self.utxo, &self.undo, &self.blocks)
                .transaction(|(headers, heights, hash_by_height, chain_head, utxo, undo_tree, blocks)| {
                    for outpoint in &undo.created {
                        utxo.remove(outpoint.sled_bytes())?;
                    }
                    for (outpoint, spent_utxo) in &undo.spent {
                        utxo.insert(outpoint.sled_bytes(), spent_utxo.sled_bytes())?;
                    }

                    headers.remove(hash_bytes.clone())?;
                    heights.remove(hash_bytes.clone())?;
                    hash_by_height.remove(height_bytes.clone())?;
                    blocks.remove(height_bytes.clone())?;
                    undo_tree.remove(height_bytes.clone())?;

                    match previous_tip {
                        Some(previous_hash) => {
                            let previous_height = heights
                                .get(previous_hash.sled_bytes())?
                                .ok_or_else(|| sled::transaction::ConflictableTransactionError::Abort(
                                    "previous tip hash has no recorded height".into(),
                                ))?;
                            let mut head_bytes = previous_height.to_vec();
                            head_bytes.extend_from_slice(&previous_hash.0);
                            chain_head.insert(CHAIN_HEAD_KEY, head_bytes)?;
                        }
                        None => {
                            chain_head.remove(CHAIN_HEAD_KEY)?;
                        }
                    }

                    Ok(())
                });
        result.map_err(|e| StateError::Backend(format!("{:?}", e).into()))?;

        trace!(?height, ?hash, "reverted block");
        Ok(Arc::new(block))
    }

    fn get_utxo(&self, outpoint: &transparent::OutPoint) -> Result<Option<Utxo>, BoxError> {
        self.utxo.zs_get(outpoint)
    }

    fn has_utxo(&self, outpoint: &transparent::OutPoint) -> Result<bool, BoxError> {
        Ok(self.utxo.contains_key(outpoint.sled_bytes())?)
    }
}
