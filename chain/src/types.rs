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

//! Base types that the block chain pipeline requires: the stored block
//! record and the capability seams (storage, validation hook,
//! observers) the engine is wired with.

use crate::core::core::block::{Block, BlockHeader};
use crate::core::core::hash::{Hash, Hashed};
use crate::core::core::target::Work;
use crate::core::core::transaction::Transaction;
use crate::error::Error;

/// Which chain a connected block landed on, from the point of view of
/// the observer being notified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockOrigin {
	/// The block extends (or becomes part of) the best chain
	BestChain,
	/// The block sits on a side branch
	SideChain,
}

/// A block as stored in the block tree: its header plus the position
/// and cumulative work that place it in the tree. Parents are
/// referenced by hash only and resolved through the store, keeping the
/// in-memory model acyclic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredBlock {
	/// The block header
	pub header: BlockHeader,
	/// Distance from genesis along parent links
	pub height: u64,
	/// Work of this block plus all its ancestors
	pub total_work: Work,
}

impl StoredBlock {
	/// The stored form of a genesis header, at height zero with its own
	/// work.
	pub fn genesis(header: BlockHeader) -> StoredBlock {
		let work = Work::from_target(&header.target());
		StoredBlock {
			header,
			height: 0,
			total_work: work,
		}
	}

	/// Builds the stored form of a child block of this one, one higher
	/// and heavier by the child's own work.
	pub fn build(&self, header: BlockHeader) -> StoredBlock {
		let total_work = self.total_work.clone() + Work::from_target(&header.target());
		StoredBlock {
			header,
			height: self.height + 1,
			total_work,
		}
	}

	/// Hash of the underlying header.
	pub fn hash(&self) -> Hash {
		self.header.hash()
	}

	/// Resolves the parent block through the store. Genesis has none.
	pub fn get_prev(&self, store: &dyn BlockStore) -> Result<Option<StoredBlock>, Error> {
		if self.height == 0 {
			return Ok(None);
		}
		store.get(&self.header.prev_hash)
	}

	/// Whether this block accumulates strictly more work than the other.
	pub fn more_work_than(&self, other: &StoredBlock) -> bool {
		self.total_work > other.total_work
	}
}

/// Opaque record of the transaction output changes a connected block
/// produced. Produced by the validation hook, persisted by an undoable
/// store, never inspected by the chain core.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutputChanges(pub Vec<u8>);

/// A block record with enough data to undo its effects during a
/// reorganisation: either the output changes recorded when it was
/// connected, or its full transaction list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredUndoableBlock {
	/// Hash of the block this record belongs to
	pub hash: Hash,
	/// Full transactions, when no change record is available
	pub transactions: Option<Vec<Transaction>>,
	/// Output changes recorded at connect time
	pub changes: Option<TxOutputChanges>,
}

/// The persistent mapping from header hash to stored block, which also
/// owns the durable chain head pointer. Implementations live outside
/// this crate; in-memory versions are provided for tests and tooling.
pub trait BlockStore: Send + Sync {
	/// Looks a stored block up by its header hash.
	fn get(&self, hash: &Hash) -> Result<Option<StoredBlock>, Error>;

	/// Saves a stored block, keyed by its header hash.
	fn put(&self, block: &StoredBlock) -> Result<(), Error>;

	/// The current chain head, if one was ever saved.
	fn chain_head(&self) -> Result<Option<StoredBlock>, Error>;

	/// Durably records the new chain head. In full-validation mode this
	/// commits the store transaction opened by the validation hook.
	fn set_chain_head(&self, head: &StoredBlock) -> Result<(), Error>;
}

impl<S: BlockStore + ?Sized> BlockStore for std::sync::Arc<S> {
	fn get(&self, hash: &Hash) -> Result<Option<StoredBlock>, Error> {
		(**self).get(hash)
	}

	fn put(&self, block: &StoredBlock) -> Result<(), Error> {
		(**self).put(block)
	}

	fn chain_head(&self) -> Result<Option<StoredBlock>, Error> {
		(**self).chain_head()
	}

	fn set_chain_head(&self, head: &StoredBlock) -> Result<(), Error> {
		(**self).set_chain_head(head)
	}
}

/// A block store that additionally keeps undo records, required by the
/// full-validation configuration.
pub trait UndoableBlockStore: BlockStore {
	/// Looks up the undo-augmented record of a stored block.
	fn get_undoable(&self, hash: &Hash) -> Result<Option<StoredUndoableBlock>, Error>;

	/// Saves the undo-augmented record alongside the stored block.
	fn put_undoable(&self, block: &StoredBlock, undo: &StoredUndoableBlock) -> Result<(), Error>;
}

impl<S: UndoableBlockStore + ?Sized> UndoableBlockStore for std::sync::Arc<S> {
	fn get_undoable(&self, hash: &Hash) -> Result<Option<StoredUndoableBlock>, Error> {
		(**self).get_undoable(hash)
	}

	fn put_undoable(&self, block: &StoredBlock, undo: &StoredUndoableBlock) -> Result<(), Error> {
		(**self).put_undoable(block, undo)
	}
}

/// Storage capability the chain engine is generic over. The two
/// shipped shapes are a plain header store for the lightweight mode and
/// an undoable store for full validation.
pub trait StoreHook: BlockStore {
	/// Builds the stored form of a block on top of its parent and
	/// persists it, together with whatever undo data the configuration
	/// keeps. The block is header-only by the time it gets here.
	fn add_to_store(
		&self,
		prev: &StoredBlock,
		block: &Block,
		changes: Option<TxOutputChanges>,
	) -> Result<StoredBlock, Error>;
}

/// Body-validation capability: everything the engine needs from the
/// transaction layer without knowing how outputs are tracked. The
/// lightweight configuration wires in [`NullUtxo`], full validation
/// wires in a real engine.
pub trait UtxoHook: Send + Sync {
	/// Whether blocks must carry transactions and be fully validated.
	fn should_verify_transactions(&self) -> bool;

	/// Applies the transactions of a freshly received block at the
	/// given height, returning the output changes to persist.
	fn connect_transactions(&self, height: u64, block: &Block) -> Result<TxOutputChanges, Error>;

	/// Applies the transactions of a historical block being reconnected
	/// during a reorganisation, reading its data back from the store.
	fn connect_stored_block(&self, block: &StoredBlock) -> Result<TxOutputChanges, Error>;

	/// Undoes the effects of a block being disconnected. Fails with
	/// `Pruned` when the undo data is gone.
	fn disconnect_transactions(&self, block: &StoredBlock) -> Result<(), Error>;

	/// Rolls back any in-flight store transaction after verification
	/// failed post-connect.
	fn not_setting_chain_head(&self) -> Result<(), Error>;
}

impl<U: UtxoHook + ?Sized> UtxoHook for std::sync::Arc<U> {
	fn should_verify_transactions(&self) -> bool {
		(**self).should_verify_transactions()
	}

	fn connect_transactions(&self, height: u64, block: &Block) -> Result<TxOutputChanges, Error> {
		(**self).connect_transactions(height, block)
	}

	fn connect_stored_block(&self, block: &StoredBlock) -> Result<TxOutputChanges, Error> {
		(**self).connect_stored_block(block)
	}

	fn disconnect_transactions(&self, block: &StoredBlock) -> Result<(), Error> {
		(**self).disconnect_transactions(block)
	}

	fn not_setting_chain_head(&self) -> Result<(), Error> {
		(**self).not_setting_chain_head()
	}
}

/// Validation hook of the lightweight configuration. The engine never
/// calls into it since `should_verify_transactions` is false.
pub struct NullUtxo;

impl UtxoHook for NullUtxo {
	fn should_verify_transactions(&self) -> bool {
		false
	}

	fn connect_transactions(&self, _height: u64, _block: &Block) -> Result<TxOutputChanges, Error> {
		Err(crate::error::ErrorKind::Other(
			"connect_transactions on a header-only chain".to_owned(),
		)
		.into())
	}

	fn connect_stored_block(&self, _block: &StoredBlock) -> Result<TxOutputChanges, Error> {
		Err(crate::error::ErrorKind::Other(
			"connect_stored_block on a header-only chain".to_owned(),
		)
		.into())
	}

	fn disconnect_transactions(&self, _block: &StoredBlock) -> Result<(), Error> {
		Err(crate::error::ErrorKind::Other(
			"disconnect_transactions on a header-only chain".to_owned(),
		)
		.into())
	}

	fn not_setting_chain_head(&self) -> Result<(), Error> {
		Ok(())
	}
}

/// Downstream party interested in what lands on the chain, typically a
/// wallet. Registered observers are notified of relevant transactions,
/// new best blocks and reorganisations; an observer may remove itself
/// while being notified.
pub trait Observer: Send + Sync {
	/// Whether the observer wants the given transaction delivered.
	fn is_transaction_relevant(&self, _tx: &Transaction) -> bool {
		false
	}

	/// Delivers a relevant transaction from a connected block. Each
	/// observer receives its own copy.
	fn receive_from_block(&self, _tx: Transaction, _block: &StoredBlock, _origin: BlockOrigin) {}

	/// Announces that a transaction with the given hash (body unknown)
	/// is part of a connected block.
	fn notify_transaction_in_block(&self, _tx_hash: &Hash, _block: &StoredBlock, _origin: BlockOrigin) {
	}

	/// Announces the new best block after the head moved forward.
	fn notify_new_best_block(&self, _block: &StoredBlock) {}

	/// Announces a reorganisation: the chain above `split` was replaced
	/// by `new_blocks` (both segments ordered tip first).
	fn reorganize(&self, _split: &StoredBlock, _old_blocks: &[StoredBlock], _new_blocks: &[StoredBlock]) {
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::core::core::hash::ZERO_HASH;

	fn header(bits: u32) -> BlockHeader {
		BlockHeader {
			prev_hash: ZERO_HASH,
			merkle_root: ZERO_HASH,
			timestamp: 0,
			bits,
			nonce: 0,
		}
	}

	#[test]
	fn build_accumulates_work_and_height() {
		let genesis = StoredBlock::genesis(header(0x207f_ffff));
		assert_eq!(genesis.height, 0);

		let mut child_header = header(0x207f_ffff);
		child_header.prev_hash = genesis.hash();
		let child = genesis.build(child_header);
		assert_eq!(child.height, 1);
		assert!(child.more_work_than(&genesis));
	}
}
