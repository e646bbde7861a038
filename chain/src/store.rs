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

//! Storage primitives required by the chain: the two engine-facing
//! store hooks (plain headers vs undo-capable) and in-memory store
//! implementations backing tests and tooling. Durable stores implement
//! the same traits outside this crate.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::core::core::block::Block;
use crate::core::core::hash::Hash;
use crate::error::Error;
use crate::types::{
	BlockStore, StoreHook, StoredBlock, StoredUndoableBlock, TxOutputChanges, UndoableBlockStore,
};

/// In-memory block store keyed by header hash.
pub struct MemoryBlockStore {
	inner: RwLock<MemoryInner>,
}

struct MemoryInner {
	blocks: HashMap<Hash, StoredBlock>,
	head: Option<StoredBlock>,
}

impl MemoryBlockStore {
	/// An empty store with no head.
	pub fn new() -> MemoryBlockStore {
		MemoryBlockStore {
			inner: RwLock::new(MemoryInner {
				blocks: HashMap::new(),
				head: None,
			}),
		}
	}
}

impl BlockStore for MemoryBlockStore {
	fn get(&self, hash: &Hash) -> Result<Option<StoredBlock>, Error> {
		let inner = self.inner.read().unwrap();
		Ok(inner.blocks.get(hash).cloned())
	}

	fn put(&self, block: &StoredBlock) -> Result<(), Error> {
		let mut inner = self.inner.write().unwrap();
		inner.blocks.insert(block.hash(), block.clone());
		Ok(())
	}

	fn chain_head(&self) -> Result<Option<StoredBlock>, Error> {
		let inner = self.inner.read().unwrap();
		Ok(inner.head.clone())
	}

	fn set_chain_head(&self, head: &StoredBlock) -> Result<(), Error> {
		let mut inner = self.inner.write().unwrap();
		inner.head = Some(head.clone());
		Ok(())
	}
}

/// In-memory store that also keeps undo records, for the
/// full-validation configuration.
pub struct MemoryUndoableStore {
	inner: RwLock<UndoableInner>,
}

struct UndoableInner {
	blocks: HashMap<Hash, StoredBlock>,
	undo: HashMap<Hash, StoredUndoableBlock>,
	head: Option<StoredBlock>,
}

impl MemoryUndoableStore {
	/// An empty store with no head.
	pub fn new() -> MemoryUndoableStore {
		MemoryUndoableStore {
			inner: RwLock::new(UndoableInner {
				blocks: HashMap::new(),
				undo: HashMap::new(),
				head: None,
			}),
		}
	}

	/// Drops the undo record of a block, simulating pruning.
	pub fn prune_undo(&self, hash: &Hash) {
		let mut inner = self.inner.write().unwrap();
		inner.undo.remove(hash);
	}
}

impl BlockStore for MemoryUndoableStore {
	fn get(&self, hash: &Hash) -> Result<Option<StoredBlock>, Error> {
		let inner = self.inner.read().unwrap();
		Ok(inner.blocks.get(hash).cloned())
	}

	fn put(&self, block: &StoredBlock) -> Result<(), Error> {
		let mut inner = self.inner.write().unwrap();
		inner.blocks.insert(block.hash(), block.clone());
		Ok(())
	}

	fn chain_head(&self) -> Result<Option<StoredBlock>, Error> {
		let inner = self.inner.read().unwrap();
		Ok(inner.head.clone())
	}

	fn set_chain_head(&self, head: &StoredBlock) -> Result<(), Error> {
		let mut inner = self.inner.write().unwrap();
		inner.head = Some(head.clone());
		Ok(())
	}
}

impl UndoableBlockStore for MemoryUndoableStore {
	fn get_undoable(&self, hash: &Hash) -> Result<Option<StoredUndoableBlock>, Error> {
		let inner = self.inner.read().unwrap();
		Ok(inner.undo.get(hash).cloned())
	}

	fn put_undoable(&self, block: &StoredBlock, undo: &StoredUndoableBlock) -> Result<(), Error> {
		let mut inner = self.inner.write().unwrap();
		inner.blocks.insert(block.hash(), block.clone());
		inner.undo.insert(block.hash(), undo.clone());
		Ok(())
	}
}

/// Store hook of the lightweight configuration: persists bare headers,
/// never sees output changes.
pub struct HeaderStore<S> {
	store: S,
}

impl<S: BlockStore> HeaderStore<S> {
	/// Wraps a block store for header-only use.
	pub fn new(store: S) -> HeaderStore<S> {
		HeaderStore { store }
	}
}

impl<S: BlockStore> BlockStore for HeaderStore<S> {
	fn get(&self, hash: &Hash) -> Result<Option<StoredBlock>, Error> {
		self.store.get(hash)
	}

	fn put(&self, block: &StoredBlock) -> Result<(), Error> {
		self.store.put(block)
	}

	fn chain_head(&self) -> Result<Option<StoredBlock>, Error> {
		self.store.chain_head()
	}

	fn set_chain_head(&self, head: &StoredBlock) -> Result<(), Error> {
		self.store.set_chain_head(head)
	}
}

impl<S: BlockStore> StoreHook for HeaderStore<S> {
	fn add_to_store(
		&self,
		prev: &StoredBlock,
		block: &Block,
		changes: Option<TxOutputChanges>,
	) -> Result<StoredBlock, Error> {
		debug_assert!(changes.is_none());
		let stored = prev.build(block.header.clone());
		self.store.put(&stored)?;
		Ok(stored)
	}
}

/// Store hook of the full-validation configuration: every stored block
/// is accompanied by an undo record carrying either the connect-time
/// output changes or the full transactions.
pub struct UndoableStore<S> {
	store: S,
}

impl<S: UndoableBlockStore> UndoableStore<S> {
	/// Wraps an undo-capable block store.
	pub fn new(store: S) -> UndoableStore<S> {
		UndoableStore { store }
	}
}

impl<S: UndoableBlockStore> BlockStore for UndoableStore<S> {
	fn get(&self, hash: &Hash) -> Result<Option<StoredBlock>, Error> {
		self.store.get(hash)
	}

	fn put(&self, block: &StoredBlock) -> Result<(), Error> {
		self.store.put(block)
	}

	fn chain_head(&self) -> Result<Option<StoredBlock>, Error> {
		self.store.chain_head()
	}

	fn set_chain_head(&self, head: &StoredBlock) -> Result<(), Error> {
		self.store.set_chain_head(head)
	}
}

impl<S: UndoableBlockStore> StoreHook for UndoableStore<S> {
	fn add_to_store(
		&self,
		prev: &StoredBlock,
		block: &Block,
		changes: Option<TxOutputChanges>,
	) -> Result<StoredBlock, Error> {
		let stored = prev.build(block.header.clone());
		let undo = StoredUndoableBlock {
			hash: stored.hash(),
			transactions: block.transactions.clone(),
			changes,
		};
		self.store.put_undoable(&stored, &undo)?;
		Ok(stored)
	}
}
