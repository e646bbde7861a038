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

//! Per-network parameters: genesis block, proof-of-work limit,
//! checkpoints and the era accessors the difficulty engine consults.
//! Sets exist for production, the public testnet and unit tests.

use std::collections::HashMap;

use num_bigint::BigUint;

use crate::consensus;
use crate::core::block::{Block, BlockHeader};
use crate::core::hash::{Hash, ZERO_HASH};
use crate::core::target;

/// Identifier of the production network
pub const MAINNET_ID: &str = "main";
/// Identifier of the public test network
pub const TESTNET_ID: &str = "test";
/// Identifier of the unit-test parameter set
pub const UNIT_TEST_ID: &str = "unittest";

lazy_static! {
	/// Lowest difficulty accepted on the production network
	pub static ref MAINNET_POW_LIMIT: BigUint = target::from_compact(0x1e0f_ffff);
	/// Lowest difficulty accepted on the test network
	pub static ref TESTNET_POW_LIMIT: BigUint = target::from_compact(0x1e0f_ffff);
	/// Trivial difficulty floor so unit tests can mine instantly
	pub static ref UNIT_TEST_POW_LIMIT: BigUint = target::from_compact(0x207f_ffff);
}

/// Everything the chain engine needs to know about the network it runs
/// on. Collaborators (stores, hooks, miners) receive the whole set
/// rather than individual values.
#[derive(Debug, Clone)]
pub struct NetworkParameters {
	/// Network identifier, one of the `*_ID` constants
	pub id: String,
	/// The block every chain starts from
	pub genesis: Block,
	/// Highest (easiest) target a block may claim
	pub proof_of_work_limit: BigUint,
	/// Block hashes the chain refuses to contradict, keyed by height
	pub checkpoints: HashMap<u64, Hash>,
}

impl NetworkParameters {
	/// Parameters of the production network.
	pub fn mainnet() -> NetworkParameters {
		NetworkParameters {
			id: MAINNET_ID.to_owned(),
			genesis: genesis_block(1_368_560_876, 0x1e0f_ffff, 380_342),
			proof_of_work_limit: MAINNET_POW_LIMIT.clone(),
			checkpoints: HashMap::new(),
		}
	}

	/// Parameters of the public test network.
	pub fn testnet() -> NetworkParameters {
		NetworkParameters {
			id: TESTNET_ID.to_owned(),
			genesis: genesis_block(1_368_560_876, 0x1e0f_ffff, 386_245),
			proof_of_work_limit: TESTNET_POW_LIMIT.clone(),
			checkpoints: HashMap::new(),
		}
	}

	/// Parameters for unit tests: same rules, trivial mining.
	pub fn unit_tests() -> NetworkParameters {
		NetworkParameters {
			id: UNIT_TEST_ID.to_owned(),
			genesis: genesis_block(1_368_560_876, 0x207f_ffff, 0),
			proof_of_work_limit: UNIT_TEST_POW_LIMIT.clone(),
			checkpoints: HashMap::new(),
		}
	}

	/// Whether the relaxed testnet difficulty rules apply.
	pub fn is_testnet(&self) -> bool {
		self.id == TESTNET_ID
	}

	/// Compact form of the proof-of-work limit.
	pub fn pow_limit_bits(&self) -> u32 {
		target::to_compact(&self.proof_of_work_limit)
	}

	/// Number of blocks between retargets at the given height.
	pub fn interval(&self, height: u64) -> u64 {
		consensus::retarget_interval(height)
	}

	/// Seconds a retarget window is expected to span at the given height.
	pub fn target_timespan(&self, height: u64) -> u64 {
		consensus::target_timespan(height)
	}

	/// Seconds targeted between blocks at the given height.
	pub fn target_spacing(&self, height: u64) -> u64 {
		consensus::target_spacing(height)
	}

	/// Whether the given block hash is acceptable at the given height.
	/// Heights without a checkpoint accept anything.
	pub fn passes_checkpoint(&self, height: u64, hash: &Hash) -> bool {
		match self.checkpoints.get(&height) {
			Some(expected) => expected == hash,
			None => true,
		}
	}
}

fn genesis_block(timestamp: u64, bits: u32, nonce: u32) -> Block {
	Block::from_header(BlockHeader {
		prev_hash: ZERO_HASH,
		merkle_root: ZERO_HASH,
		timestamp,
		bits,
		nonce,
	})
}
