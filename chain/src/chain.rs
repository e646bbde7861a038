// Copyright 2018 The Aurum Developers
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Facade and handler for the rest of the blockchain implementation and
//! mostly the chain pipeline: accepts blocks, links them into the block
//! tree, finds the most worked chain and switches over to it when a
//! side branch overtakes the head.

use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Duration, TimeZone, Utc};
use linked_hash_map::LinkedHashMap;

use crate::core::core::block::{Block, FilteredBlock};
use crate::core::core::hash::{Hash, Hashed};
use crate::core::core::transaction::Transaction;
use crate::core::params::NetworkParameters;
use crate::difficulty;
use crate::error::{Error, ErrorKind};
use crate::pipe;
use crate::types::{BlockOrigin, Observer, StoreHook, StoredBlock, UtxoHook};

// A block waiting for its parent, kept with the filter data it arrived
// with. Exactly one representation is populated: a full block, or a
// bare header plus the two filter fields.
struct Orphan {
	block: Block,
	filtered_tx_hashes: Option<Vec<Hash>>,
	filtered_transactions: Option<Vec<Transaction>>,
}

// Pool of blocks whose parent is not in the store yet. Iterated in
// insertion order, which approximates parent-before-child for the
// short orphan chains seen in practice.
struct OrphanBlockPool {
	orphans: LinkedHashMap<Hash, Orphan>,
}

impl OrphanBlockPool {
	fn new() -> OrphanBlockPool {
		OrphanBlockPool {
			orphans: LinkedHashMap::new(),
		}
	}

	fn len(&self) -> usize {
		self.orphans.len()
	}

	fn add(&mut self, orphan: Orphan) {
		self.orphans.insert(orphan.block.hash(), orphan);
	}

	fn remove(&mut self, hash: &Hash) -> Option<Orphan> {
		self.orphans.remove(hash)
	}

	fn get(&self, hash: &Hash) -> Option<&Orphan> {
		self.orphans.get(hash)
	}

	fn contains(&self, hash: &Hash) -> bool {
		self.orphans.contains_key(hash)
	}

	fn iter(&self) -> linked_hash_map::Iter<Hash, Orphan> {
		self.orphans.iter()
	}
}

// Everything the ingestion lock protects: the orphan pool and the
// throughput counters.
struct Ingest {
	orphans: OrphanBlockPool,
	stats_last: DateTime<Utc>,
	stats_blocks_added: u64,
}

/// Facade to the block processing pipeline and storage. Keeps the
/// block tree in its store, tracks the most worked chain and notifies
/// registered observers of everything that lands on it. Generic over
/// the storage shape and the transaction validation hook; the two
/// shipped configurations are a header-only chain
/// (`HeaderStore` + `NullUtxo`) and a fully validating one
/// (`UndoableStore` + a real hook).
pub struct Chain<H, U> {
	params: NetworkParameters,
	store: H,
	utxo: U,

	// current best block, under its own short lock so readers never
	// wait on a long ingestion
	head: RwLock<StoredBlock>,
	// single lock serializing every mutating operation
	inner: Mutex<Ingest>,
	observers: RwLock<Vec<Arc<dyn Observer>>>,
}

impl<H: StoreHook, U: UtxoHook> Chain<H, U> {
	/// Initializes the chain on top of the given store and validation
	/// hook. An empty store is seeded with the genesis block of the
	/// network parameters.
	pub fn init(params: NetworkParameters, store: H, utxo: U) -> Result<Chain<H, U>, Error> {
		let head = match store.chain_head()? {
			Some(head) => head,
			None => {
				let genesis = StoredBlock::genesis(params.genesis.header.clone());
				store.put(&genesis)?;
				store.set_chain_head(&genesis)?;
				info!("saved genesis block: {}", genesis.hash());
				genesis
			}
		};

		info!("chain init: {} at {}", head.hash(), head.height);

		Ok(Chain {
			params,
			store,
			utxo,
			head: RwLock::new(head),
			inner: Mutex::new(Ingest {
				orphans: OrphanBlockPool::new(),
				stats_last: Utc::now(),
				stats_blocks_added: 0,
			}),
			observers: RwLock::new(vec![]),
		})
	}

	/// Attempts to add a block with transactions to the chain. Returns
	/// true if the block connected somewhere in the tree, false if it
	/// was queued as an orphan.
	pub fn submit_full(&self, block: Block) -> Result<bool, Error> {
		self.ingest(block, true, None, None)
	}

	/// Attempts to add a filter-matched block: a header, the hashes of
	/// all matching transactions and the subset of them available in
	/// full. Hashes of transactions provided in full are dropped from
	/// the hash list before processing.
	pub fn submit_filtered(&self, filtered: FilteredBlock) -> Result<bool, Error> {
		let FilteredBlock {
			header,
			mut tx_hashes,
			transactions,
		} = filtered;
		for tx in &transactions {
			let hash = tx.hash();
			match tx_hashes.iter().position(|h| *h == hash) {
				Some(pos) => {
					tx_hashes.remove(pos);
				}
				None => {
					return Err(ErrorKind::Other(format!(
						"filtered transaction {} missing from its hash list",
						hash
					))
					.into());
				}
			}
		}
		self.ingest(
			Block::from_header(header),
			true,
			Some(tx_hashes),
			Some(transactions),
		)
	}

	/// Registers an observer, appended after all existing ones.
	pub fn add_observer(&self, observer: Arc<dyn Observer>) {
		let mut observers = self.observers.write().unwrap();
		observers.push(observer);
	}

	/// Removes a previously registered observer, comparing by identity.
	/// Safe to call from within a notification.
	pub fn remove_observer(&self, observer: &Arc<dyn Observer>) -> bool {
		let mut observers = self.observers.write().unwrap();
		match observers.iter().position(|o| Arc::ptr_eq(o, observer)) {
			Some(pos) => {
				observers.remove(pos);
				true
			}
			None => false,
		}
	}

	/// The network parameters the chain was initialized with.
	pub fn params(&self) -> &NetworkParameters {
		&self.params
	}

	/// The current best block.
	pub fn chain_head(&self) -> StoredBlock {
		self.head.read().unwrap().clone()
	}

	/// Height of the current best block.
	pub fn best_height(&self) -> u64 {
		self.head.read().unwrap().height
	}

	/// Whether the hash belongs to a block waiting for its parent.
	pub fn is_orphan(&self, hash: &Hash) -> bool {
		let ing = self.inner.lock().unwrap();
		ing.orphans.contains(hash)
	}

	/// Walks the orphan pool backwards from the given hash to the
	/// deepest queued ancestor, the block whose parent should be
	/// requested from the network.
	pub fn orphan_root(&self, from: &Hash) -> Option<Block> {
		let ing = self.inner.lock().unwrap();
		let mut cursor = ing.orphans.get(from)?;
		while let Some(parent) = ing.orphans.get(&cursor.block.header.prev_hash) {
			cursor = parent;
		}
		Some(cursor.block.clone())
	}

	/// Estimates the wall-clock time at which the given height will be
	/// reached, assuming ten minute spacing between blocks.
	pub fn estimate_block_time(&self, height: u64) -> DateTime<Utc> {
		let head = self.chain_head();
		let offset = height as i64 - head.height as i64;
		let estimated = head.header.timestamp as i64 * 1000 + 1000 * 60 * 10 * offset;
		Utc.timestamp_millis(estimated)
	}

	fn ingest(
		&self,
		block: Block,
		external: bool,
		filtered_tx_hashes: Option<Vec<Hash>>,
		filtered_transactions: Option<Vec<Transaction>>,
	) -> Result<bool, Error> {
		let mut ing = self.inner.lock().unwrap();
		self.ingest_locked(
			&mut ing,
			block,
			external,
			filtered_tx_hashes,
			filtered_transactions,
		)
	}

	// The ingestion pipeline proper, run under the ingestion lock. The
	// orphan drain re-enters here directly with `external` cleared.
	fn ingest_locked(
		&self,
		ing: &mut Ingest,
		block: Block,
		external: bool,
		filtered_tx_hashes: Option<Vec<Hash>>,
		filtered_transactions: Option<Vec<Transaction>>,
	) -> Result<bool, Error> {
		let now = Utc::now();
		if now.signed_duration_since(ing.stats_last) >= Duration::seconds(1) {
			if ing.stats_blocks_added > 1 {
				info!("{} blocks per second", ing.stats_blocks_added);
			}
			ing.stats_last = now;
			ing.stats_blocks_added = 0;
		}

		let head = self.chain_head();
		if block.header == head.header {
			return Ok(true);
		}
		if external && ing.orphans.contains(&block.hash()) {
			return Ok(false);
		}
		if self.utxo.should_verify_transactions() {
			if block.transactions.is_none() {
				return Err(ErrorKind::HeaderInFullMode.into());
			}
			// full stores answer duplicate lookups quickly, use that to
			// re-accept a block we already processed
			if self.store.get(&block.hash())?.is_some() {
				return Ok(true);
			}
		}

		// in lightweight mode the block contents only matter when some
		// observer cares about one of the transactions
		let mut contents_important = self.utxo.should_verify_transactions();
		if !contents_important {
			if let Some(txs) = &block.transactions {
				contents_important = txs.iter().any(|tx| self.any_observer_relevant(tx));
			}
		}

		block
			.verify_header(&self.params)
			.map_err(|e| Error::from(ErrorKind::HeaderInvalid(e)))?;
		if contents_important {
			block
				.verify_transactions()
				.map_err(|e| Error::from(ErrorKind::MerkleInvalid(e)))?;
		}

		let connected = match self.store.get(&block.header.prev_hash)? {
			None => {
				debug!(
					"block {} is an orphan, {} blocks pending",
					block.hash(),
					ing.orphans.len() + 1
				);
				ing.orphans.add(Orphan {
					block,
					filtered_tx_hashes,
					filtered_transactions,
				});
				false
			}
			Some(prev) => {
				difficulty::check_transition(&self.params, &self.store, &prev, &block.header)?;
				let res =
					self.connect_block(&block, &prev, &filtered_tx_hashes, &filtered_transactions);
				if let Err(e) = res {
					if e.is_verification() {
						// roll back whatever the validation hook already
						// applied before propagating
						if let Err(rollback) = self.utxo.not_setting_chain_head() {
							warn!("rollback after failed verification failed too: {}", rollback);
						}
					}
					return Err(e);
				}
				ing.stats_blocks_added += 1;
				true
			}
		};

		if external {
			self.try_connecting_orphans(ing)?;
		}
		Ok(connected)
	}

	// Connects a block whose parent is known: extends the best chain,
	// stores a side branch, or triggers a reorganize when the branch
	// overtakes the head.
	fn connect_block(
		&self,
		block: &Block,
		prev: &StoredBlock,
		filtered_tx_hashes: &Option<Vec<Hash>>,
		filtered_transactions: &Option<Vec<Transaction>>,
	) -> Result<(), Error> {
		let filtered = filtered_tx_hashes.is_some() && filtered_transactions.is_some();
		let height = prev.height + 1;

		if !self.params.passes_checkpoint(height, &block.hash()) {
			return Err(ErrorKind::CheckpointMismatch(height).into());
		}
		let expensive_checks = self.utxo.should_verify_transactions();
		if expensive_checks {
			if let Some(txs) = &block.transactions {
				for tx in txs {
					if !tx.is_final(height, block.header.timestamp) {
						return Err(ErrorKind::NonFinalTransaction.into());
					}
				}
			}
		}

		let head = self.chain_head();
		if prev.hash() == head.hash() {
			// extending the best chain
			if expensive_checks
				&& block.header.timestamp <= pipe::median_time_of_recent_blocks(&self.store, &head)?
			{
				return Err(ErrorKind::TimestampTooEarly.into());
			}
			let changes = if self.utxo.should_verify_transactions() {
				Some(self.utxo.connect_transactions(height, block)?)
			} else {
				None
			};
			// only the header goes into the block record, the contents
			// are covered by the undo data
			let block_for_store = if block.transactions.is_some() {
				block.to_header()
			} else {
				block.clone()
			};
			let new_head = self.store.add_to_store(prev, &block_for_store, changes)?;
			self.set_chain_head(&new_head)?;
			self.inform_new_block(
				block,
				BlockOrigin::BestChain,
				filtered_tx_hashes,
				filtered_transactions,
				&new_head,
			);
			Ok(())
		} else {
			// the block connects somewhere below the top of the best
			// chain, so it starts or extends a side branch
			let new_block = prev.build(block.header.clone());
			let have_new_best = new_block.more_work_than(&head);
			if !have_new_best {
				match pipe::find_split(&self.store, &new_block, &head)? {
					Some(split) => {
						if split.hash() == new_block.hash() {
							// a block we already linked into the main
							// chain, reprocessing it would confuse wallets
							warn!(
								"saw duplicated block in main chain at height {}: {}",
								new_block.height,
								new_block.hash()
							);
							return Ok(());
						}
						// not spending anything yet, the branch may never win
						self.store.add_to_store(prev, block, None)?;
						info!(
							"block forks the chain at height {}/block {}, but it did not cause a reorganize",
							split.height,
							split.hash()
						);
					}
					None => return Err(ErrorKind::ForkWithoutAncestor.into()),
				}
			}

			// a bare header carries nothing an observer could use
			if block.transactions.is_some() || filtered {
				self.inform_new_block(
					block,
					BlockOrigin::SideChain,
					filtered_tx_hashes,
					filtered_transactions,
					&new_block,
				);
			}

			if have_new_best {
				self.handle_new_best_chain(prev, new_block, block)?;
			}
			Ok(())
		}
	}

	// The side branch carrying `new_head` has overtaken the current
	// chain: disconnect the old segment, reconnect the new one and swap
	// the head over.
	fn handle_new_best_chain(
		&self,
		prev: &StoredBlock,
		new_head: StoredBlock,
		block: &Block,
	) -> Result<(), Error> {
		let head = self.chain_head();
		let split = pipe::find_split(&self.store, &new_head, &head)?
			.ok_or_else(|| Error::from(ErrorKind::ForkWithoutAncestor))?;

		info!("re-organize after split at height {}", split.height);
		info!("old chain head: {}", head.hash());
		info!("new chain head: {}", new_head.hash());
		info!("split at block: {}", split.hash());

		let old_blocks = pipe::get_partial_chain(&self.store, &head, &split)?;
		let new_blocks = pipe::get_partial_chain(&self.store, &new_head, &split)?;

		let mut stored_new_head = split.clone();
		if self.utxo.should_verify_transactions() && !old_blocks.is_empty() {
			// disconnect the losing segment top-down; a pruned block
			// here is not recoverable locally and must surface untouched
			for old in &old_blocks {
				self.utxo.disconnect_transactions(old)?;
			}
			// reconnect the winning segment in ascending height order
			for cursor in new_blocks.iter().rev() {
				let parent = cursor
					.get_prev(&self.store)?
					.ok_or_else(|| Error::from(ErrorKind::OrphanedSegment))?;
				if cursor.header.timestamp
					<= pipe::median_time_of_recent_blocks(&self.store, &parent)?
				{
					return Err(ErrorKind::TimestampTooEarly.into());
				}
				let changes = if cursor.hash() == new_head.hash() {
					// the submitted block is still in hand, no need to
					// read it back from the store
					self.utxo.connect_transactions(new_head.height, block)?
				} else {
					self.utxo.connect_stored_block(cursor)?
				};
				stored_new_head = self.store.add_to_store(
					&stored_new_head,
					&Block::from_header(cursor.header.clone()),
					Some(changes),
				)?;
			}
		} else {
			// lightweight mode, just trust the headers
			stored_new_head =
				self.store
					.add_to_store(prev, &Block::from_header(new_head.header.clone()), None)?;
		}

		self.inform_reorganize(&split, &old_blocks, &new_blocks);
		self.set_chain_head(&stored_new_head)?;
		Ok(())
	}

	// Repeatedly sweeps the orphan pool in insertion order, moving any
	// orphan whose parent has appeared through the regular ingestion
	// path, until a full pass connects nothing.
	fn try_connecting_orphans(&self, ing: &mut Ingest) -> Result<(), Error> {
		loop {
			let mut ready = vec![];
			for (hash, orphan) in ing.orphans.iter() {
				if self.store.get(&orphan.block.header.prev_hash)?.is_some() {
					ready.push(*hash);
				}
			}
			if ready.is_empty() {
				return Ok(());
			}
			let mut connected = 0;
			for hash in ready {
				if let Some(orphan) = ing.orphans.remove(&hash) {
					self.ingest_locked(
						ing,
						orphan.block,
						false,
						orphan.filtered_tx_hashes,
						orphan.filtered_transactions,
					)?;
					connected += 1;
				}
			}
			info!("connected {} orphan blocks", connected);
		}
	}

	// Durably record the new head, then flip the in-memory pointer
	// under the head lock.
	fn set_chain_head(&self, new_head: &StoredBlock) -> Result<(), Error> {
		self.store.set_chain_head(new_head)?;
		let mut head = self.head.write().unwrap();
		*head = new_head.clone();
		Ok(())
	}

	fn any_observer_relevant(&self, tx: &Transaction) -> bool {
		let observers = self.observers.read().unwrap();
		observers.iter().any(|obs| obs.is_transaction_relevant(tx))
	}

	// Walks the observer list by index, re-reading the slot after each
	// notification so an observer removing itself does not skip its
	// successor. No lock is held while an observer runs.
	fn each_observer<F: FnMut(&Arc<dyn Observer>)>(&self, mut f: F) {
		let mut i = 0;
		loop {
			let obs = {
				let observers = self.observers.read().unwrap();
				match observers.get(i) {
					Some(obs) => obs.clone(),
					None => break,
				}
			};
			f(&obs);
			let observers = self.observers.read().unwrap();
			match observers.get(i) {
				Some(current) if Arc::ptr_eq(current, &obs) => i += 1,
				// the slot changed under us, revisit the same index
				_ => {}
			}
		}
	}

	fn inform_new_block(
		&self,
		block: &Block,
		origin: BlockOrigin,
		filtered_tx_hashes: &Option<Vec<Hash>>,
		filtered_transactions: &Option<Vec<Transaction>>,
		stored: &StoredBlock,
	) {
		self.each_observer(|obs| {
			if let Some(txs) = block.transactions.as_ref().or(filtered_transactions.as_ref()) {
				for tx in txs {
					if obs.is_transaction_relevant(tx) {
						// every observer gets its own copy so none can
						// corrupt what another one sees
						obs.receive_from_block(tx.clone(), stored, origin);
					}
				}
			}
			if let Some(hashes) = filtered_tx_hashes {
				for hash in hashes {
					obs.notify_transaction_in_block(hash, stored, origin);
				}
			}
			if origin == BlockOrigin::BestChain {
				obs.notify_new_best_block(stored);
			}
		});
	}

	fn inform_reorganize(
		&self,
		split: &StoredBlock,
		old_blocks: &[StoredBlock],
		new_blocks: &[StoredBlock],
	) {
		self.each_observer(|obs| {
			obs.reorganize(split, old_blocks, new_blocks);
		});
	}
}
