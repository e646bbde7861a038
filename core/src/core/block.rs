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

//! Blocks and block headers.

use byteorder::{ByteOrder, LittleEndian};
use chrono::Utc;
use failure::Fail;
use num_bigint::BigUint;
use num_traits::Zero;

use crate::core::hash::{Hash, Hashed, ZERO_HASH};
use crate::core::target;
use crate::core::transaction::Transaction;
use crate::params::NetworkParameters;

/// Seconds a block timestamp may run ahead of our clock before the
/// header is rejected outright.
pub const ALLOWED_TIME_DRIFT: u64 = 2 * 60 * 60;

/// Errors thrown by block and header verification.
#[derive(Clone, Debug, Eq, PartialEq, Fail)]
pub enum Error {
	/// The encoded target is zero, negative or above the network limit
	#[fail(display = "difficulty target out of range")]
	InvalidTarget,
	/// The header hash does not satisfy its own claimed target
	#[fail(display = "hash exceeds the claimed difficulty target")]
	ProofOfWork,
	/// Timestamp is unreasonably far ahead of our clock
	#[fail(display = "timestamp too far in the future")]
	TimeTooFarInFuture,
	/// The merkle root does not commit to the carried transactions
	#[fail(display = "merkle root does not match the transactions")]
	MerkleRootMismatch,
}

/// Block header, fairly standard compared to other proof-of-work
/// chains: parent link, transaction commitment, timestamp and the
/// difficulty fields the mining loop iterates on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
	/// Hash of the previous block header
	pub prev_hash: Hash,
	/// Merkle root of the block transactions
	pub merkle_root: Hash,
	/// Timestamp in seconds since the unix epoch
	pub timestamp: u64,
	/// Difficulty target in compact form
	pub bits: u32,
	/// Nonce iterated on to satisfy the target
	pub nonce: u32,
}

impl Default for BlockHeader {
	fn default() -> BlockHeader {
		BlockHeader {
			prev_hash: ZERO_HASH,
			merkle_root: ZERO_HASH,
			timestamp: 0,
			bits: 0,
			nonce: 0,
		}
	}
}

// make sure to not introduce any variable length data before the nonce
// to keep the mining loop simple
impl Hashed for BlockHeader {
	fn bytes(&self) -> Vec<u8> {
		let mut data = Vec::with_capacity(80);
		data.extend_from_slice(self.prev_hash.to_slice());
		data.extend_from_slice(self.merkle_root.to_slice());
		let mut buf = [0; 8];
		LittleEndian::write_u64(&mut buf, self.timestamp);
		data.extend_from_slice(&buf);
		LittleEndian::write_u32(&mut buf[..4], self.bits);
		data.extend_from_slice(&buf[..4]);
		LittleEndian::write_u32(&mut buf[..4], self.nonce);
		data.extend_from_slice(&buf[..4]);
		data
	}
}

impl BlockHeader {
	/// The full 256-bit difficulty target this header claims.
	pub fn target(&self) -> BigUint {
		target::from_compact(self.bits)
	}

	/// Checks the header stands on its own: the claimed target is in
	/// range, the hash satisfies it and the timestamp is sane.
	pub fn verify(&self, params: &NetworkParameters) -> Result<(), Error> {
		let target = self.target();
		if target.is_zero() || target > params.proof_of_work_limit {
			return Err(Error::InvalidTarget);
		}
		if BigUint::from_bytes_be(self.hash().to_slice()) > target {
			return Err(Error::ProofOfWork);
		}
		let now = Utc::now().timestamp() as u64;
		if self.timestamp > now + ALLOWED_TIME_DRIFT {
			return Err(Error::TimeTooFarInFuture);
		}
		Ok(())
	}
}

/// A block: a header plus, when the sender had them, the transactions
/// it commits to. Headers alone are enough for the lightweight mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
	/// The header the chain links on
	pub header: BlockHeader,
	/// Full transaction list, absent for a bare header
	pub transactions: Option<Vec<Transaction>>,
}

impl Block {
	/// A block carrying only its header.
	pub fn from_header(header: BlockHeader) -> Block {
		Block {
			header,
			transactions: None,
		}
	}

	/// A block carrying its full transaction list.
	pub fn with_transactions(header: BlockHeader, transactions: Vec<Transaction>) -> Block {
		Block {
			header,
			transactions: Some(transactions),
		}
	}

	/// Hash of the block, which is the hash of its header.
	pub fn hash(&self) -> Hash {
		self.header.hash()
	}

	/// Copy of this block stripped down to its header.
	pub fn to_header(&self) -> Block {
		Block::from_header(self.header.clone())
	}

	/// Header-only verification, cheap enough to run on every incoming
	/// block.
	pub fn verify_header(&self, params: &NetworkParameters) -> Result<(), Error> {
		self.header.verify(params)
	}

	/// Checks the merkle root commits to the carried transactions. A
	/// bare header has nothing to check.
	pub fn verify_transactions(&self) -> Result<(), Error> {
		if let Some(txs) = &self.transactions {
			let hashes = txs.iter().map(|tx| tx.hash()).collect::<Vec<_>>();
			if merkle_root(&hashes) != self.header.merkle_root {
				return Err(Error::MerkleRootMismatch);
			}
		}
		Ok(())
	}
}

/// A block received through a matched filter: the header, the hashes of
/// every matching transaction and the subset of those transactions the
/// sender still had in full.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilteredBlock {
	/// The header the chain links on
	pub header: BlockHeader,
	/// Hashes of all transactions that matched the filter
	pub tx_hashes: Vec<Hash>,
	/// Matching transactions available in full, a subset of `tx_hashes`
	pub transactions: Vec<Transaction>,
}

/// Merkle root over a list of transaction hashes, pairing adjacent
/// hashes and duplicating the last on odd levels.
pub fn merkle_root(hashes: &[Hash]) -> Hash {
	if hashes.is_empty() {
		return ZERO_HASH;
	}
	let mut level = hashes.to_vec();
	while level.len() > 1 {
		let mut next = Vec::with_capacity((level.len() + 1) / 2);
		for pair in level.chunks(2) {
			let right = if pair.len() == 2 { pair[1] } else { pair[0] };
			let mut data = pair[0].to_vec();
			data.extend_from_slice(right.to_slice());
			next.push(data[..].hash());
		}
		level = next;
	}
	level[0]
}
