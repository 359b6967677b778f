//! The chain engine: owns the active chain's in-memory index, drives every
//! block through context-free, contextual, and full validation, and commits
//! the result to a [`ChainStore`].
//!
//! The engine is logically single-threaded: `add_block` takes an exclusive
//! lock on the store for its whole duration, so callers on different peer
//! sessions serialize through it rather than racing the store directly.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use chrono::Utc;
use primitive_types::U256;

use crw_chain::{
    amount::{Amount, NegativeAllowed, NonNegative},
    block::{Block, Hash, Header, Height},
    parameters::{Network, NetworkUpgrade, GENESIS_PREVIOUS_BLOCK_HASH, POW_AVERAGING_WINDOW},
    transparent,
};
use crw_script::Flags;
use crw_state::{BoxError, ChainStore, Config, Event, Listener, PendingUtxos, Relativity, StateError, Utxo};

use crate::{
    block::check,
    block::difficulty,
    block::subsidy::general as subsidy,
    error::{BlockError, SubsidyError, TransactionError, VerificationError},
    parameters::subsidy::COINBASE_MATURITY,
    transaction::check as tx_check,
};

/// Upper bound on how many headers [`Engine::find_headers`] returns for a
/// single `getheaders` answer, mirroring Bitcoin Core's own cap.
const MAX_HEADERS_RESPONSE: usize = 2000;

/// The outcome of [`Engine::add_block`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum AddBlockResult {
    /// The block extended the active chain, possibly via a reorg.
    NewBest,
    /// The block was accepted but its branch is not (yet) the best chain.
    SideChain,
    /// The block's hash was already known; nothing changed.
    Unchanged,
}

/// A header's position in the engine's in-memory chain index.
///
/// Entries are never evicted once inserted: a block that loses a reorg
/// stays indexed as a side chain, so a later block extending it doesn't
/// need to be refetched.
#[derive(Copy, Clone, Debug)]
struct IndexEntry {
    header: Header,
    height: Height,
    cumulative_work: U256,
}

/// Bitcoin Core's `GetBlockProof`: the amount of work a block with this
/// difficulty target represents, in units where the genesis block's target
/// represents approximately one unit per block.
fn block_work(header: &Header) -> U256 {
    let target = header
        .difficulty_threshold
        .to_expanded()
        .expect("difficulty threshold was already validated before this block was indexed")
        .0;
    (!target / (target + U256::from(1u64))) + U256::from(1u64)
}

/// Drives a [`ChainStore`] through the full block-validation pipeline.
pub struct Engine<S: ChainStore> {
    network: Network,
    store: Mutex<S>,
    listener: Listener,
    pending_utxos: Mutex<PendingUtxos>,
    orphans: Mutex<HashMap<Hash, Vec<Arc<Block>>>>,
    index: Mutex<HashMap<Hash, IndexEntry>>,
    /// Block bodies not yet (or no longer) committed to the store: either
    /// buffered while still part of the best chain but awaiting commit
    /// during a reorg, or parked as a side chain's body, which
    /// `ChainStore::revert_block` discards from the store itself.
    branch_blocks: Mutex<HashMap<Hash, Arc<Block>>>,
    max_orphan_blocks: usize,
    maximum_reorg_block_count: u32,
}

impl<S: ChainStore> Engine<S> {
    /// Builds an engine over `store`, reconstructing its in-memory index by
    /// walking back from the store's current chain head to genesis.
    pub fn new(store: S, listener: Listener, network: Network, config: &Config) -> Result<Self, VerificationError> {
        let index = Self::rebuild_index(&store)?;
        Ok(Engine {
            network,
            store: Mutex::new(store),
            listener,
            pending_utxos: Mutex::new(PendingUtxos::default()),
            orphans: Mutex::new(HashMap::new()),
            index: Mutex::new(index),
            branch_blocks: Mutex::new(HashMap::new()),
            max_orphan_blocks: config.max_orphan_blocks,
            maximum_reorg_block_count: config.maximum_reorg_block_count,
        })
    }

    fn rebuild_index(store: &S) -> Result<HashMap<Hash, IndexEntry>, VerificationError> {
        let mut index = HashMap::new();

        let tip_hash = match store.get_chain_head().map_err(Self::backend_error)? {
            Some((_, hash)) => hash,
            None => return Ok(index),
        };

        let mut chain = Vec::new();
        let mut current = tip_hash;
        loop {
            let header = store
                .get_header(current)
                .map_err(Self::backend_error)?
                .ok_or_else(|| Self::backend_error(format!("header {:?} missing from an indexed chain", current).into()))?;
            let previous = header.previous_block_hash;
            chain.push((current, header));
            if previous == GENESIS_PREVIOUS_BLOCK_HASH {
                break;
            }
            current = previous;
        }
        chain.reverse();

        let mut cumulative_work = U256::zero();
        for (height, (hash, header)) in chain.into_iter().enumerate() {
            cumulative_work += block_work(&header);
            index.insert(
                hash,
                IndexEntry { header, height: Height(height as u32), cumulative_work },
            );
        }
        Ok(index)
    }

    fn backend_error(e: BoxError) -> VerificationError {
        VerificationError::State(StateError::Backend(e))
    }

    /// Accepts or rejects `block`, draining any previously orphaned blocks
    /// that were waiting on it.
    pub fn add_block(&self, block: Arc<Block>) -> Result<AddBlockResult, VerificationError> {
        let hash = block.hash();
        let result = self.add_block_inner(block, hash)?;
        if !matches!(result, AddBlockResult::Unchanged) {
            self.drain_orphans(hash);
        }
        Ok(result)
    }

    /// The active chain's tip, or `None` before the first block has landed.
    pub fn chain_head(&self) -> Result<Option<(Height, Hash)>, VerificationError> {
        self.store.lock().unwrap().get_chain_head().map_err(Self::backend_error)
    }

    /// `true` if this hash is indexed, on either the active chain or a side
    /// branch -- i.e. a further `add_block` with this hash would return
    /// [`AddBlockResult::Unchanged`].
    pub fn has_block(&self, hash: Hash) -> bool {
        self.index.lock().unwrap().contains_key(&hash)
    }

    pub fn get_header(&self, hash: Hash) -> Result<Option<Header>, VerificationError> {
        self.store.lock().unwrap().get_header(hash).map_err(Self::backend_error)
    }

    /// The full body of a block this store still retains, within the
    /// reorg-undo retention window (see [`Config::maximum_reorg_block_count`]).
    pub fn get_block(&self, hash: Hash) -> Result<Option<Arc<Block>>, VerificationError> {
        self.store.lock().unwrap().get_block(hash).map_err(Self::backend_error)
    }

    /// Subscribes to `NewBestBlock`/`Reorganize`/`TransactionReceivedInBlock`
    /// events fired by this engine.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<Event> {
        self.listener.subscribe()
    }

    /// A sparse list of this node's active-chain hashes, tip first, thinning
    /// geometrically back to genesis -- the locator a peer session sends to
    /// negotiate a common ancestor via `getheaders`.
    pub fn locator(&self) -> Result<Vec<Hash>, VerificationError> {
        let tip_height = match self.chain_head()? {
            Some((height, _)) => height,
            None => return Ok(Vec::new()),
        };

        let mut hashes = Vec::new();
        let mut height = tip_height.0;
        let mut step = 1u32;
        loop {
            hashes.push(self.hash_at_height(Height(height))?);
            if height == 0 {
                break;
            }
            if hashes.len() >= 10 {
                step = step.saturating_mul(2);
            }
            height = height.saturating_sub(step);
        }
        Ok(hashes)
    }

    fn hash_at_height(&self, height: Height) -> Result<Hash, VerificationError> {
        let header = self
            .store
            .lock()
            .unwrap()
            .get_header_by_height(height)
            .map_err(Self::backend_error)?
            .ok_or_else(|| Self::backend_error(format!("no active-chain header indexed at height {:?}", height).into()))?;
        Ok(Hash::from(&header))
    }

    /// Walks the active chain forward from `known_blocks`' common ancestor
    /// (the first hash in the list this node also has on its active chain),
    /// answering a peer's `getheaders`. Stops at `stop`, the chain tip, or
    /// [`MAX_HEADERS_RESPONSE`], whichever comes first.
    pub fn find_headers(&self, known_blocks: &[Hash], stop: Option<Hash>) -> Result<Vec<Header>, VerificationError> {
        let store = self.store.lock().unwrap();
        let tip_height = match store.get_chain_head().map_err(Self::backend_error)? {
            Some((height, _)) => height,
            None => return Ok(Vec::new()),
        };

        let mut start_height = Height(0);
        for hash in known_blocks {
            let height = match self.index.lock().unwrap().get(hash).map(|entry| entry.height) {
                Some(height) => height,
                None => continue,
            };
            let on_active_chain = store
                .get_header_by_height(height)
                .map_err(Self::backend_error)?
                .map(|header| Hash::from(&header) == *hash)
                .unwrap_or(false);
            if on_active_chain {
                start_height = height.next().unwrap_or(height);
                break;
            }
        }

        let mut headers = Vec::new();
        let mut height = start_height;
        while height <= tip_height && headers.len() < MAX_HEADERS_RESPONSE {
            let header = match store.get_header_by_height(height).map_err(Self::backend_error)? {
                Some(header) => header,
                None => break,
            };
            let hash = Hash::from(&header);
            headers.push(header);
            if Some(hash) == stop {
                break;
            }
            height = match height.next() {
                Some(height) => height,
                None => break,
            };
        }
        Ok(headers)
    }

    fn add_block_inner(&self, block: Arc<Block>, hash: Hash) -> Result<AddBlockResult, VerificationError> {
        if self.index.lock().unwrap().contains_key(&hash) {
            return Ok(AddBlockResult::Unchanged);
        }
        self.context_free_check(&block)?;
        self.try_add_known_block(block, hash)
    }

    /// Context-free checks: everything decidable from the block's own bytes.
    fn context_free_check(&self, block: &Block) -> Result<(), VerificationError> {
        check::coinbase_is_first(block)?;
        check::block_is_not_too_large(block)?;

        let transaction_hashes: Vec<_> = block.transactions.iter().map(|tx| tx.hash()).collect();
        check::merkle_root_validity(block, &transaction_hashes)?;

        for tx in &block.transactions {
            tx_check::has_inputs_and_outputs(tx)?;
            tx_check::is_not_too_large(tx)?;
            tx_check::no_duplicate_inputs(tx)?;
        }

        Ok(())
    }

    /// Resolves `block`'s parent, runs the contextual header checks, and
    /// either buffers it as an orphan, applies it, files it as a side
    /// chain, or triggers a reorg.
    fn try_add_known_block(&self, block: Arc<Block>, hash: Hash) -> Result<AddBlockResult, VerificationError> {
        let previous_hash = block.header.previous_block_hash;
        let is_genesis = previous_hash == GENESIS_PREVIOUS_BLOCK_HASH;

        let parent_entry = if is_genesis {
            None
        } else {
            match self.index.lock().unwrap().get(&previous_hash).copied() {
                Some(entry) => Some(entry),
                None => {
                    self.buffer_orphan(previous_hash, block);
                    return Err(VerificationError::Orphan);
                }
            }
        };

        let height = match &parent_entry {
            Some(parent) => parent.height.next().expect("chain height does not overflow u32::MAX blocks"),
            None => Height(0),
        };

        check::difficulty_is_valid(&block.header, self.network, &height, &hash)?;
        check::time_is_valid_at(&block.header, Utc::now(), &height, &hash).map_err(BlockError::from)?;
        if let Some(parent) = &parent_entry {
            self.contextual_header_check(&block.header, height, hash, parent)?;
        }
        check::coinbase_height_matches(&block, height)?;

        let own_work = block_work(&block.header);
        let parent_work = parent_entry.map(|p| p.cumulative_work).unwrap_or_else(U256::zero);
        let cumulative_work = parent_work
            .checked_add(own_work)
            .expect("cumulative chain work does not overflow a u256");

        self.index.lock().unwrap().insert(
            hash,
            IndexEntry { header: block.header, height, cumulative_work },
        );
        self.branch_blocks.lock().unwrap().insert(hash, block.clone());

        let tip = self.store.lock().unwrap().get_chain_head().map_err(Self::backend_error)?;

        match tip {
            None => self.apply_and_commit(block, hash, height),
            Some((_, tip_hash)) if previous_hash == tip_hash => self.apply_and_commit(block, hash, height),
            Some((_, tip_hash)) => {
                let tip_work = self
                    .index
                    .lock()
                    .unwrap()
                    .get(&tip_hash)
                    .expect("the active tip is always indexed")
                    .cumulative_work;

                if cumulative_work <= tip_work {
                    self.store.lock().unwrap().put_header(&block.header).map_err(Self::backend_error)?;
                    Ok(AddBlockResult::SideChain)
                } else {
                    self.reorganize(hash, tip_hash)
                }
            }
        }
    }

    /// Median-time-past plus difficulty retarget: the checks that need a
    /// known ancestry, so they can't run until a block's parent is known.
    fn contextual_header_check(
        &self,
        header: &Header,
        height: Height,
        hash: Hash,
        parent: &IndexEntry,
    ) -> Result<(), VerificationError> {
        let median = self.median_time_past(parent);
        if header.time <= median {
            return Err(BlockError::TimeTooOld.into());
        }

        let window_start = self.window_start_header(parent, height);
        difficulty::difficulty_retarget_is_valid(self.network, height, hash, header, &parent.header, &window_start)?;

        Ok(())
    }

    /// The median timestamp of up to the 11 blocks ending at `parent`.
    fn median_time_past(&self, parent: &IndexEntry) -> chrono::DateTime<Utc> {
        let index = self.index.lock().unwrap();
        let mut times = Vec::with_capacity(11);
        let mut current = Some(*parent);
        for _ in 0..11 {
            let entry = match current {
                Some(entry) => entry,
                None => break,
            };
            times.push(entry.header.time);
            if entry.header.previous_block_hash == GENESIS_PREVIOUS_BLOCK_HASH {
                current = None;
            } else {
                current = index.get(&entry.header.previous_block_hash).copied();
            }
        }
        times.sort();
        times[times.len() / 2]
    }

    /// The header at the start of the retarget window `height` falls in,
    /// or `parent`'s own header when `height` isn't a retarget boundary
    /// (in which case [`difficulty::expected_difficulty`] never looks at it).
    fn window_start_header(&self, parent: &IndexEntry, height: Height) -> Header {
        if self.network.disables_retargeting() || height.0 % (POW_AVERAGING_WINDOW as u32) != 0 {
            return parent.header;
        }

        let index = self.index.lock().unwrap();
        let mut current = *parent;
        for _ in 0..(POW_AVERAGING_WINDOW - 1) {
            match index.get(&current.header.previous_block_hash) {
                Some(prev) => current = *prev,
                None => break,
            }
        }
        current.header
    }

    /// Activation-derived script flags for a block at `height`.
    ///
    /// P2SH has no dedicated network upgrade here and is treated as active
    /// from genesis; every other flag follows its BIP's activation height.
    fn script_flags_for_height(&self, height: Height) -> Flags {
        let mut flags = Flags::P2SH;
        if NetworkUpgrade::BIP66.is_active(self.network, height) {
            flags |= Flags::STRICT_DER;
        }
        if NetworkUpgrade::BIP65.is_active(self.network, height) {
            flags |= Flags::CHECKLOCKTIMEVERIFY;
        }
        if NetworkUpgrade::CSV.is_active(self.network, height) {
            flags |= Flags::CHECKSEQUENCEVERIFY | Flags::LOW_S;
        }
        if NetworkUpgrade::SegWit.is_active(self.network, height) {
            flags |= Flags::WITNESS | Flags::NULLDUMMY | Flags::MINIMAL_IF;
        }
        flags
    }

    /// UTXO resolution, coinbase maturity, script verification, and the
    /// fee/subsidy balance check: everything that needs the UTXO set.
    fn full_validation(&self, block: &Block, height: Height) -> Result<(), VerificationError> {
        let flags = self.script_flags_for_height(height);

        let mut in_block_outputs: HashMap<transparent::OutPoint, Utxo> = HashMap::new();
        for tx in &block.transactions {
            let tx_hash = tx.hash();
            let is_coinbase = tx.is_coinbase();
            for (index, output) in tx.outputs.iter().enumerate() {
                in_block_outputs.insert(
                    transparent::OutPoint { hash: tx_hash, index: index as u32 },
                    Utxo::new(output.clone(), height, is_coinbase),
                );
            }
        }

        let store = self.store.lock().unwrap();

        let mut fees_total = Amount::<NegativeAllowed>::zero();
        for (tx_index, tx) in block.transactions.iter().enumerate() {
            if tx_index == 0 {
                continue;
            }

            let mut input_total = Amount::<NegativeAllowed>::zero();
            for (input_index, input) in tx.inputs.iter().enumerate() {
                let outpoint = match input {
                    transparent::Input::PrevOut { outpoint, .. } => *outpoint,
                    transparent::Input::Coinbase { .. } => {
                        return Err(TransactionError::CoinbaseInputFound.into())
                    }
                };

                let spent = match in_block_outputs.get(&outpoint) {
                    Some(utxo) => utxo.clone(),
                    None => store
                        .get_utxo(&outpoint)
                        .map_err(Self::backend_error)?
                        .ok_or(TransactionError::MissingUtxo(outpoint.hash, outpoint.index))?,
                };

                if !spent.is_mature(height, COINBASE_MATURITY) {
                    return Err(TransactionError::ImmatureCoinbaseSpend.into());
                }

                crw_script::verify(&spent.output.lock_script.0, spent.output.value, tx, input_index, flags)
                    .map_err(TransactionError::from)?;

                input_total = input_total
                    .checked_add(Amount::<NegativeAllowed>::from(spent.output.value))
                    .map_err(TransactionError::from)?;
            }

            let mut output_total = Amount::<NegativeAllowed>::zero();
            for output in &tx.outputs {
                output_total = output_total
                    .checked_add(Amount::<NegativeAllowed>::from(output.value))
                    .map_err(TransactionError::from)?;
            }

            if output_total > input_total {
                return Err(TransactionError::ValueUnbalanced.into());
            }
            let fee = input_total.checked_sub(output_total).map_err(TransactionError::from)?;
            fees_total = fees_total.checked_add(fee).map_err(TransactionError::from)?;
        }
        drop(store);

        let subsidy_amount = subsidy::block_subsidy(height, self.network).map_err(TransactionError::from)?;
        let max_coinbase_output = Amount::<NegativeAllowed>::from(subsidy_amount)
            .checked_add(fees_total)
            .map_err(TransactionError::from)?;

        let coinbase = block.transactions.get(0).ok_or(BlockError::NoTransactions)?;
        let mut coinbase_output_total = Amount::<NegativeAllowed>::zero();
        for output in &coinbase.outputs {
            coinbase_output_total = coinbase_output_total
                .checked_add(Amount::<NegativeAllowed>::from(output.value))
                .map_err(TransactionError::from)?;
        }

        if coinbase_output_total > max_coinbase_output {
            let overspend = coinbase_output_total
                .constrain::<NonNegative>()
                .expect("coinbase outputs are already known non-negative");
            let limit = max_coinbase_output
                .constrain::<NonNegative>()
                .expect("subsidy plus fees is already known non-negative");
            return Err(BlockError::from(SubsidyError::SubsidyOverspend(overspend, limit)).into());
        }

        Ok(())
    }

    /// Runs full validation and, on success, commits `block` as the new
    /// chain tip.
    fn apply_and_commit(&self, block: Arc<Block>, hash: Hash, height: Height) -> Result<AddBlockResult, VerificationError> {
        self.full_validation(&block, height)?;

        {
            let mut store = self.store.lock().unwrap();
            store.put_header(&block.header).map_err(Self::backend_error)?;
            store.apply_block(block.clone())?;
        }

        self.branch_blocks.lock().unwrap().remove(&hash);

        let created = created_utxos(&block, height);
        self.pending_utxos.lock().unwrap().check_against(&created);

        self.listener.send(Event::NewBestBlock(block.clone()));
        for (index, tx) in block.transactions.iter().enumerate() {
            self.listener.send(Event::TransactionReceivedInBlock {
                transaction: tx.clone(),
                block: block.clone(),
                relativity: Relativity::BestChain,
                index_in_block: index,
            });
        }

        Ok(AddBlockResult::NewBest)
    }

    /// Switches the active chain to the branch ending at `candidate_hash`,
    /// reverting `old_tip_hash`'s branch down to their common ancestor and
    /// forward-applying the new one. Leaves the chain head untouched if any
    /// forward-apply step fails.
    fn reorganize(&self, candidate_hash: Hash, old_tip_hash: Hash) -> Result<AddBlockResult, VerificationError> {
        let ancestor = self.find_common_ancestor(candidate_hash, old_tip_hash);

        let old_branch = self.branch_from(old_tip_hash, ancestor);
        let new_branch = self.branch_from(candidate_hash, ancestor);

        let reorg_depth = old_branch.len() as u32;
        if reorg_depth > self.maximum_reorg_block_count {
            return Err(VerificationError::ReorgTooDeep(reorg_depth, self.maximum_reorg_block_count));
        }

        let mut reverted = Vec::new();
        for &hash in &old_branch {
            let body = match self.store.lock().unwrap().revert_block(hash) {
                Ok(body) => body,
                Err(e) => {
                    self.rollback_failed_reorg(&reverted, &[]);
                    return Err(e.into());
                }
            };
            self.branch_blocks.lock().unwrap().insert(hash, body.clone());
            reverted.push(body);
        }

        let mut applied = Vec::new();
        for &hash in new_branch.iter().rev() {
            let block = self
                .branch_blocks
                .lock()
                .unwrap()
                .get(&hash)
                .cloned()
                .expect("every block on the candidate branch is cached until it lands in the store");
            let height = self
                .index
                .lock()
                .unwrap()
                .get(&hash)
                .expect("candidate branch is fully indexed")
                .height;

            if let Err(e) = self.full_validation(&block, height) {
                self.rollback_failed_reorg(&reverted, &applied);
                return Err(e);
            }

            let commit = {
                let mut store = self.store.lock().unwrap();
                store
                    .put_header(&block.header)
                    .map_err(Self::backend_error)
                    .and_then(|()| store.apply_block(block.clone()).map_err(VerificationError::from))
            };
            if let Err(e) = commit {
                self.rollback_failed_reorg(&reverted, &applied);
                return Err(e);
            }

            self.branch_blocks.lock().unwrap().remove(&hash);
            applied.push(block);
        }

        let mut created = HashMap::new();
        for block in &applied {
            let height = self
                .index
                .lock()
                .unwrap()
                .get(&block.hash())
                .expect("applied block is indexed")
                .height;
            created.extend(created_utxos(block, height));
        }
        self.pending_utxos.lock().unwrap().check_against(&created);

        self.listener.send(Event::Reorganize {
            old_tip: old_tip_hash,
            new_tip: candidate_hash,
            common_ancestor: ancestor,
            disconnected: reverted.iter().map(|block| block.hash()).collect(),
            connected: applied.iter().map(|block| block.hash()).collect(),
        });
        for block in &applied {
            for (index, tx) in block.transactions.iter().enumerate() {
                self.listener.send(Event::TransactionReceivedInBlock {
                    transaction: tx.clone(),
                    block: block.clone(),
                    relativity: Relativity::BestChain,
                    index_in_block: index,
                });
            }
        }

        Ok(AddBlockResult::NewBest)
    }

    /// Best-effort recovery from a reorg that failed partway through
    /// forward-applying the new branch: undoes whatever of the new branch
    /// was already committed, then restores the old branch in order.
    fn rollback_failed_reorg(&self, reverted: &[Arc<Block>], applied: &[Arc<Block>]) {
        let mut store = self.store.lock().unwrap();
        for block in applied.iter().rev() {
            let hash = block.hash();
            if let Err(e) = store.revert_block(hash) {
                tracing::error!(?hash, error = %e, "failed to undo a partially committed reorg");
            }
        }
        for block in reverted.iter().rev() {
            if let Err(e) = store.apply_block(block.clone()) {
                tracing::error!(hash = ?block.hash(), error = %e, "failed to restore the original branch after a failed reorg");
            }
        }
    }

    fn find_common_ancestor(&self, a: Hash, b: Hash) -> Hash {
        let index = self.index.lock().unwrap();
        let mut a_hash = a;
        let mut b_hash = b;
        let mut a_entry = *index.get(&a_hash).expect("candidate branch is indexed");
        let mut b_entry = *index.get(&b_hash).expect("old tip is indexed");

        while a_entry.height > b_entry.height {
            a_hash = a_entry.header.previous_block_hash;
            a_entry = *index.get(&a_hash).expect("ancestors remain indexed back to genesis");
        }
        while b_entry.height > a_entry.height {
            b_hash = b_entry.header.previous_block_hash;
            b_entry = *index.get(&b_hash).expect("ancestors remain indexed back to genesis");
        }
        while a_hash != b_hash {
            a_hash = a_entry.header.previous_block_hash;
            a_entry = *index.get(&a_hash).expect("ancestors remain indexed back to genesis");
            b_hash = b_entry.header.previous_block_hash;
            b_entry = *index.get(&b_hash).expect("ancestors remain indexed back to genesis");
        }
        a_hash
    }

    /// `tip` down to, but not including, `ancestor`, tip-first.
    fn branch_from(&self, tip: Hash, ancestor: Hash) -> Vec<Hash> {
        let index = self.index.lock().unwrap();
        let mut hashes = Vec::new();
        let mut current = tip;
        while current != ancestor {
            hashes.push(current);
            current = index
                .get(&current)
                .expect("branch remains indexed back to the common ancestor")
                .header
                .previous_block_hash;
        }
        hashes
    }

    fn buffer_orphan(&self, parent_hash: Hash, block: Arc<Block>) {
        let mut orphans = self.orphans.lock().unwrap();
        let total: usize = orphans.values().map(Vec::len).sum();
        if total >= self.max_orphan_blocks {
            tracing::debug!(%parent_hash, "orphan buffer full, dropping block");
            return;
        }
        orphans.entry(parent_hash).or_insert_with(Vec::new).push(block);
    }

    /// Retries every orphan waiting on `newly_known`, iteratively: a chain
    /// of orphans is drained breadth-first instead of through recursive
    /// calls, so a long pending chain doesn't grow the call stack.
    fn drain_orphans(&self, newly_known: Hash) {
        let mut queue = vec![newly_known];
        while let Some(parent_hash) = queue.pop() {
            let waiting = self.orphans.lock().unwrap().remove(&parent_hash);
            let waiting = match waiting {
                Some(waiting) => waiting,
                None => continue,
            };
            for orphan in waiting {
                let orphan_hash = orphan.hash();
                if let Ok(result) = self.add_block_inner(orphan, orphan_hash) {
                    if !matches!(result, AddBlockResult::Unchanged) {
                        queue.push(orphan_hash);
                    }
                }
            }
        }
    }
}

fn created_utxos(block: &Block, height: Height) -> HashMap<transparent::OutPoint, Utxo> {
    let mut created = HashMap::new();
    for tx in &block.transactions {
        let tx_hash = tx.hash();
        let is_coinbase = tx.is_coinbase();
        for (index, output) in tx.outputs.iter().enumerate() {
            created.insert(
                transparent::OutPoint { hash: tx_hash, index: index as u32 },
                Utxo::new(output.clone(), height, is_coinbase),
            );
        }
    }
    created
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::convert::TryFrom;

    use chrono::{DateTime, Duration};

    use crw_chain::{
        amount::NonNegative,
        block::merkle,
        parameters::Network,
        transaction::{LockTime, Transaction},
        transparent::{CoinbaseData, Script},
        work::difficulty::CompactDifficulty,
    };
    use crw_state::listener::Event;

    struct UndoData {
        previous_tip: Option<Hash>,
        spent: Vec<(transparent::OutPoint, Utxo)>,
        created: Vec<transparent::OutPoint>,
    }

    /// A plain-`HashMap` mirror of [`crw_state::SledStore`], for exercising
    /// the engine without touching disk.
    #[derive(Default)]
    struct MemoryStore {
        maximum_reorg_block_count: u32,
        headers: HashMap<Hash, Header>,
        heights: HashMap<Hash, Height>,
        chain_head: Option<(Height, Hash)>,
        utxo: HashMap<transparent::OutPoint, Utxo>,
        undo: HashMap<Height, UndoData>,
        blocks: HashMap<Height, Arc<Block>>,
    }

    impl MemoryStore {
        fn new(maximum_reorg_block_count: u32) -> Self {
            MemoryStore { maximum_reorg_block_count, ..Default::default() }
        }
    }

    impl ChainStore for MemoryStore {
        fn put_header(&mut self, header: &Header) -> Result<(), BoxError> {
            self.headers.insert(Hash::from(header), *header);
            Ok(())
        }

        fn get_header(&self, hash: Hash) -> Result<Option<Header>, BoxError> {
            Ok(self.headers.get(&hash).copied())
        }

        fn get_header_by_height(&self, height: Height) -> Result<Option<Header>, BoxError> {
            Ok(self
                .heights
                .iter()
                .find(|(_, h)| **h == height)
                .and_then(|(hash, _)| self.headers.get(hash))
                .copied())
        }

        fn get_block(&self, hash: Hash) -> Result<Option<Arc<Block>>, BoxError> {
            Ok(self.heights.get(&hash).and_then(|height| self.blocks.get(height)).cloned())
        }

        fn set_chain_head(&mut self, hash: Hash) -> Result<(), BoxError> {
            let height = *self.heights.get(&hash).ok_or("chain head hash has no recorded height")?;
            self.chain_head = Some((height, hash));
            Ok(())
        }

        fn get_chain_head(&self) -> Result<Option<(Height, Hash)>, BoxError> {
            Ok(self.chain_head)
        }

        fn apply_block(&mut self, block: Arc<Block>) -> Result<Hash, StateError> {
            let hash = block.hash();
            let previous_tip = self.chain_head.map(|(_, hash)| hash);
            let expected_parent = previous_tip.unwrap_or(GENESIS_PREVIOUS_BLOCK_HASH);
            if block.header.previous_block_hash != expected_parent {
                return Err(StateError::NotATip(hash));
            }

            let height = match self.heights.get(&block.header.previous_block_hash) {
                Some(parent_height) => parent_height.next().expect("height does not overflow u32::MAX blocks"),
                None => Height(0),
            };

            let mut in_block_outputs = HashMap::new();
            for transaction in &block.transactions {
                let tx_hash = transaction.hash();
                for (index, output) in transaction.outputs.iter().enumerate() {
                    in_block_outputs
                        .insert(transparent::OutPoint { hash: tx_hash, index: index as u32 }, output.clone());
                }
            }

            let mut spent = Vec::new();
            for transaction in &block.transactions {
                if transaction.is_coinbase() {
                    continue;
                }
                for input in &transaction.inputs {
                    if let transparent::Input::PrevOut { outpoint, .. } = input {
                        if in_block_outputs.contains_key(outpoint) {
                            continue;
                        }
                        let utxo = self
                            .utxo
                            .get(outpoint)
                            .cloned()
                            .ok_or_else(|| StateError::Backend(format!("missing utxo for {:?}", outpoint).into()))?;
                        spent.push((*outpoint, utxo));
                    }
                }
            }

            let mut created = Vec::new();
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

            for (outpoint, _) in &spent {
                self.utxo.remove(outpoint);
            }
            for (outpoint, utxo) in new_utxos {
                self.utxo.insert(outpoint, utxo);
            }

            self.headers.insert(hash, block.header);
            self.heights.insert(hash, height);
            self.chain_head = Some((height, hash));
            self.blocks.insert(height, block.clone());
            self.undo.insert(height, UndoData { previous_tip, spent, created });

            Ok(hash)
        }

        fn revert_block(&mut self, hash: Hash) -> Result<Arc<Block>, StateError> {
            let height = *self
                .heights
                .get(&hash)
                .ok_or_else(|| StateError::Backend("revert target has no recorded height".into()))?;

            if let Some((tip_height, _)) = self.chain_head {
                if tip_height.0.saturating_sub(height.0) > self.maximum_reorg_block_count {
                    return Err(StateError::ReorgTooDeep(tip_height.0 - height.0, self.maximum_reorg_block_count));
                }
            }

            let undo = self
                .undo
                .remove(&height)
                .ok_or_else(|| StateError::Backend("no undo data for this height".into()))?;
            let block = self
                .blocks
                .remove(&height)
                .ok_or_else(|| StateError::Backend("no block body stored for this height".into()))?;

            for outpoint in &undo.created {
                self.utxo.remove(outpoint);
            }
            for (outpoint, utxo) in &undo.spent {
                self.utxo.insert(*outpoint, utxo.clone());
            }

            self.headers.remove(&hash);
            self.heights.remove(&hash);

            self.chain_head = match undo.previous_tip {
                Some(previous_hash) => {
                    let previous_height = *self.heights.get(&previous_hash).expect("previous tip is still indexed");
                    Some((previous_height, previous_hash))
                }
                None => None,
            };

            Ok(block)
        }

        fn get_utxo(&self, outpoint: &transparent::OutPoint) -> Result<Option<Utxo>, BoxError> {
            Ok(self.utxo.get(outpoint).cloned())
        }

        fn has_utxo(&self, outpoint: &transparent::OutPoint) -> Result<bool, BoxError> {
            Ok(self.utxo.contains_key(outpoint))
        }
    }

    fn regtest_time(height: u32) -> DateTime<Utc> {
        chrono::Utc.timestamp(1_600_000_000, 0) + Duration::minutes(10) * height as i32
    }

    use chrono::TimeZone;

    fn coinbase_tx(height: u32, extra_nonce: u8) -> Transaction {
        let data = CoinbaseData::new(vec![extra_nonce]).unwrap();
        let input = transparent::Input::new_coinbase(Some(Height(height)), data, 0xffff_ffff);
        let output = transparent::Output {
            value: Amount::<NonNegative>::try_from(5_000_000_000i64).unwrap(),
            lock_script: Script(vec![crw_script::opcode::OP_1]),
        };
        Transaction::new(1, vec![input], vec![output], LockTime::new_height(Height(0)))
    }

    fn make_block(previous_block_hash: Hash, height: u32, extra_nonce: u8) -> Arc<Block> {
        let coinbase = coinbase_tx(height, extra_nonce);
        let merkle_root: merkle::Root = std::iter::once(coinbase.hash()).collect();
        let header = Header::new(
            1,
            previous_block_hash,
            merkle_root,
            regtest_time(height),
            CompactDifficulty(0x207fffff),
            0,
        );
        Arc::new(Block { header, transactions: vec![Arc::new(coinbase)] })
    }

    fn new_engine() -> Engine<MemoryStore> {
        let config = Config { maximum_reorg_block_count: 1_000, max_orphan_blocks: 64, ..Config::default() };
        Engine::new(MemoryStore::new(config.maximum_reorg_block_count), Listener::new(), Network::Regtest, &config).unwrap()
    }

    #[test]
    fn genesis_only() {
        let engine = new_engine();
        let genesis = make_block(GENESIS_PREVIOUS_BLOCK_HASH, 0, 0);

        assert_eq!(engine.add_block(genesis.clone()).unwrap(), AddBlockResult::NewBest);

        let (height, hash) = engine.store.lock().unwrap().get_chain_head().unwrap().unwrap();
        assert_eq!(height, Height(0));
        assert_eq!(hash, genesis.hash());
    }

    #[test]
    fn linear_extension_fires_one_event_per_block() {
        let engine = new_engine();
        let mut receiver = engine.listener.subscribe();

        let genesis = make_block(GENESIS_PREVIOUS_BLOCK_HASH, 0, 0);
        let b1 = make_block(genesis.hash(), 1, 0);
        let b2 = make_block(b1.hash(), 2, 0);

        assert_eq!(engine.add_block(genesis.clone()).unwrap(), AddBlockResult::NewBest);
        assert_eq!(engine.add_block(b1.clone()).unwrap(), AddBlockResult::NewBest);
        assert_eq!(engine.add_block(b2.clone()).unwrap(), AddBlockResult::NewBest);

        let (_, tip) = engine.store.lock().unwrap().get_chain_head().unwrap().unwrap();
        assert_eq!(tip, b2.hash());

        let mut best_blocks = Vec::new();
        while let Ok(event) = receiver.try_recv() {
            if let Event::NewBestBlock(block) = event {
                best_blocks.push(block.hash());
            }
        }
        assert_eq!(best_blocks, vec![genesis.hash(), b1.hash(), b2.hash()]);
    }

    #[test]
    fn orphan_then_connect() {
        let engine = new_engine();
        let genesis = make_block(GENESIS_PREVIOUS_BLOCK_HASH, 0, 0);
        let b1 = make_block(genesis.hash(), 1, 0);
        let b2 = make_block(b1.hash(), 2, 0);

        assert_eq!(engine.add_block(genesis.clone()).unwrap(), AddBlockResult::NewBest);

        let err = engine.add_block(b2.clone()).unwrap_err();
        assert!(matches!(err, VerificationError::Orphan));

        assert_eq!(engine.add_block(b1.clone()).unwrap(), AddBlockResult::NewBest);

        let (_, tip) = engine.store.lock().unwrap().get_chain_head().unwrap().unwrap();
        assert_eq!(tip, b2.hash());
    }

    #[test]
    fn side_chain_without_more_work_does_not_reorg() {
        let engine = new_engine();
        let genesis = make_block(GENESIS_PREVIOUS_BLOCK_HASH, 0, 0);
        let b1 = make_block(genesis.hash(), 1, 0);
        let b2 = make_block(b1.hash(), 2, 0);
        let b2_prime = make_block(b1.hash(), 2, 1);

        engine.add_block(genesis).unwrap();
        engine.add_block(b1).unwrap();
        engine.add_block(b2.clone()).unwrap();

        assert_eq!(engine.add_block(b2_prime).unwrap(), AddBlockResult::SideChain);

        let (_, tip) = engine.store.lock().unwrap().get_chain_head().unwrap().unwrap();
        assert_eq!(tip, b2.hash());
    }

    #[test]
    fn deeper_side_chain_triggers_a_reorg() {
        let engine = new_engine();
        let mut receiver = engine.listener.subscribe();

        let genesis = make_block(GENESIS_PREVIOUS_BLOCK_HASH, 0, 0);
        let b1 = make_block(genesis.hash(), 1, 0);
        let b2 = make_block(b1.hash(), 2, 0);
        let b2_prime = make_block(b1.hash(), 2, 1);
        let b3_prime = make_block(b2_prime.hash(), 3, 0);

        engine.add_block(genesis).unwrap();
        engine.add_block(b1).unwrap();
        engine.add_block(b2.clone()).unwrap();
        engine.add_block(b2_prime.clone()).unwrap();

        assert_eq!(engine.add_block(b3_prime.clone()).unwrap(), AddBlockResult::NewBest);

        let (_, tip) = engine.store.lock().unwrap().get_chain_head().unwrap().unwrap();
        assert_eq!(tip, b3_prime.hash());

        let mut saw_reorg = false;
        while let Ok(event) = receiver.try_recv() {
            if let Event::Reorganize { old_tip, new_tip, .. } = event {
                assert_eq!(old_tip, b2.hash());
                assert_eq!(new_tip, b3_prime.hash());
                saw_reorg = true;
            }
        }
        assert!(saw_reorg);
    }

    #[test]
    fn double_spend_is_rejected() {
        let engine = new_engine();
        let genesis = make_block(GENESIS_PREVIOUS_BLOCK_HASH, 0, 0);
        engine.add_block(genesis.clone()).unwrap();

        let outpoint = transparent::OutPoint { hash: genesis.transactions[0].hash(), index: 0 };
        let spend = transparent::Input::PrevOut {
            outpoint,
            unlock_script: Script(vec![crw_script::opcode::OP_1]),
            sequence: 0xffff_ffff,
            witness: Vec::new(),
        };

        let spending_tx = Transaction::new(
            1,
            vec![spend.clone(), spend],
            vec![],
            LockTime::new_height(Height(0)),
        );

        let err = tx_check::no_duplicate_inputs(&spending_tx).unwrap_err();
        assert_eq!(err, TransactionError::DuplicateOutPoint);
    }

    #[test]
    fn locator_thins_geometrically_back_to_genesis() {
        let engine = new_engine();
        let mut previous = GENESIS_PREVIOUS_BLOCK_HASH;
        let mut last_hash = previous;
        for height in 0..20u32 {
            let block = make_block(previous, height, 0);
            last_hash = block.hash();
            engine.add_block(block).unwrap();
            previous = last_hash;
        }

        let locator = engine.locator().unwrap();
        assert_eq!(locator[0], last_hash);
        assert_eq!(*locator.last().unwrap(), engine.get_header(locator[locator.len() - 1]).unwrap().map(|h| Hash::from(&h)).unwrap());
        // Genesis is always reachable at the tail of a full-depth locator.
        let genesis_hash = {
            let store = engine.store.lock().unwrap();
            Hash::from(&store.get_header_by_height(Height(0)).unwrap().unwrap())
        };
        assert_eq!(*locator.last().unwrap(), genesis_hash);
    }

    #[test]
    fn find_headers_walks_forward_from_common_ancestor() {
        let engine = new_engine();
        let genesis = make_block(GENESIS_PREVIOUS_BLOCK_HASH, 0, 0);
        let b1 = make_block(genesis.hash(), 1, 0);
        let b2 = make_block(b1.hash(), 2, 0);
        engine.add_block(genesis.clone()).unwrap();
        engine.add_block(b1.clone()).unwrap();
        engine.add_block(b2.clone()).unwrap();

        let headers = engine.find_headers(&[genesis.hash()], None).unwrap();
        assert_eq!(headers.len(), 2);
        assert_eq!(Hash::from(&headers[0]), b1.hash());
        assert_eq!(Hash::from(&headers[1]), b2.hash());
    }

    #[test]
    fn find_headers_ignores_a_hash_only_known_on_a_side_branch() {
        let engine = new_engine();
        let genesis = make_block(GENESIS_PREVIOUS_BLOCK_HASH, 0, 0);
        let b1 = make_block(genesis.hash(), 1, 0);
        let b1_prime = make_block(genesis.hash(), 1, 1);
        engine.add_block(genesis.clone()).unwrap();
        engine.add_block(b1.clone()).unwrap();
        assert_eq!(engine.add_block(b1_prime.clone()).unwrap(), AddBlockResult::SideChain);

        // b1_prime never became part of the active chain, so it can't serve
        // as a common ancestor: the walk falls back to genesis.
        let headers = engine.find_headers(&[b1_prime.hash()], None).unwrap();
        assert_eq!(headers.len(), 2);
        assert_eq!(Hash::from(&headers[0]), genesis.hash());
    }

    #[test]
    fn chain_head_and_get_block_round_trip() {
        let engine = new_engine();
        let genesis = make_block(GENESIS_PREVIOUS_BLOCK_HASH, 0, 0);
        engine.add_block(genesis.clone()).unwrap();

        assert_eq!(engine.chain_head().unwrap(), Some((Height(0), genesis.hash())));
        assert!(engine.has_block(genesis.hash()));
        assert!(!engine.has_block(Hash([9; 32])));
        assert_eq!(engine.get_block(genesis.hash()).unwrap().unwrap().hash(), genesis.hash());
    }
}
