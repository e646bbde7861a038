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

//! Transactions as the chain core sees them. Script evaluation and
//! output tracking happen behind the validation hook; the core itself
//! only needs hashing, lock-time finality and an opaque body to hand
//! to observers.

use byteorder::{ByteOrder, LittleEndian};

use crate::core::hash::Hashed;

/// Lock-time values below this threshold are block heights, values at
/// or above it are unix timestamps.
pub const LOCK_TIME_THRESHOLD: u64 = 500_000_000;

/// A value transfer recorded in a block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
	/// Earliest height or time this transaction may be mined at, zero
	/// for none.
	pub lock_time: u64,
	/// Serialized body, opaque to the chain core.
	pub body: Vec<u8>,
}

impl Transaction {
	/// Builds a transaction from its lock time and serialized body.
	pub fn new(lock_time: u64, body: Vec<u8>) -> Transaction {
		Transaction { lock_time, body }
	}

	/// Whether the transaction is final when mined at the given height
	/// and block time.
	pub fn is_final(&self, height: u64, block_time: u64) -> bool {
		if self.lock_time == 0 {
			return true;
		}
		let cutoff = if self.lock_time < LOCK_TIME_THRESHOLD {
			height
		} else {
			block_time
		};
		self.lock_time < cutoff
	}
}

impl Hashed for Transaction {
	fn bytes(&self) -> Vec<u8> {
		let mut data = vec![0; 8];
		LittleEndian::write_u64(&mut data, self.lock_time);
		data.extend_from_slice(&self.body);
		data
	}
}
