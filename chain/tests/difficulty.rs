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

//! Era by era coverage of the difficulty retargeting state machine,
//! driven directly against a seeded store.

use num_bigint::BigUint;

use aurum_chain::store::MemoryBlockStore;
use aurum_chain::{difficulty, BlockStore, ErrorKind, StoredBlock};
use aurum_core::consensus::{
	JULY_FORK, JULY_FORK_2, MAY_FORK, NOVEMBER_FORK, NOVEMBER_FORK_2,
};
use aurum_core::core::block::BlockHeader;
use aurum_core::core::hash::ZERO_HASH;
use aurum_core::core::target::{from_compact, to_compact, Work};
use aurum_core::params::NetworkParameters;

const SEED_BITS: u32 = 0x1d00_ffff;

// Seeds a parent chain ending at `tip_height` whose inter-block gaps,
// oldest first, are `gaps`. Returns the chain tip. The first seeded
// block has no parent in the store, which the engine treats as the
// edge of pruned history.
fn seed_chain(store: &MemoryBlockStore, tip_height: u64, gaps: &[u64], bits: u32) -> StoredBlock {
	let base_time = 1_500_000_000u64;
	let start_height = tip_height - gaps.len() as u64;
	let mut cursor = StoredBlock {
		header: BlockHeader {
			prev_hash: ZERO_HASH,
			merkle_root: ZERO_HASH,
			timestamp: base_time,
			bits,
			nonce: 0,
		},
		height: start_height,
		total_work: Work::from_num(1),
	};
	store.put(&cursor).unwrap();
	let mut time = base_time;
	for gap in gaps {
		time += gap;
		let mut header = cursor.header.clone();
		header.prev_hash = cursor.hash();
		header.timestamp = time;
		cursor = cursor.build(header);
		store.put(&cursor).unwrap();
	}
	assert_eq!(cursor.height, tip_height);
	cursor
}

fn next_header(prev: &StoredBlock, gap: u64, bits: u32) -> BlockHeader {
	BlockHeader {
		prev_hash: prev.hash(),
		merkle_root: ZERO_HASH,
		timestamp: prev.header.timestamp + gap,
		bits,
		nonce: 0,
	}
}

fn expect_target(params: &NetworkParameters, store: &MemoryBlockStore, prev: &StoredBlock) -> BigUint {
	difficulty::next_target(params, store, prev).unwrap().unwrap()
}

// checks both directions: the computed bits pass, a flipped mantissa
// bit fails
fn assert_roundtrip(
	params: &NetworkParameters,
	store: &MemoryBlockStore,
	prev: &StoredBlock,
	expected: &BigUint,
) {
	let bits = to_compact(expected);
	let good = next_header(prev, 120, bits);
	difficulty::check_transition(params, store, prev, &good).unwrap();

	let bad = next_header(prev, 120, bits ^ 1);
	match difficulty::check_transition(params, store, prev, &bad)
		.unwrap_err()
		.kind()
	{
		ErrorKind::DifficultyMismatch(_) => {}
		e => panic!("unexpected error {:?}", e),
	}
}

#[test]
fn launch_era_repeats_bits_between_retargets() {
	let params = NetworkParameters::mainnet();
	let store = MemoryBlockStore::new();
	// height 10 is far from the 504 block boundary
	let prev = seed_chain(&store, 9, &[150; 5], SEED_BITS);

	let good = next_header(&prev, 150, SEED_BITS);
	difficulty::check_transition(&params, &store, &prev, &good).unwrap();

	let bad = next_header(&prev, 150, SEED_BITS ^ 1);
	match difficulty::check_transition(&params, &store, &prev, &bad)
		.unwrap_err()
		.kind()
	{
		ErrorKind::DifficultyMismatch(_) => {}
		e => panic!("unexpected error {:?}", e),
	}

	assert_eq!(
		expect_target(&params, &store, &prev),
		from_compact(SEED_BITS)
	);
}

#[test]
fn launch_era_retargets_on_the_endpoint_timespan() {
	let params = NetworkParameters::mainnet();
	let store = MemoryBlockStore::new();
	// next height is 504, the launch era boundary; the walk crosses 503
	// gaps of 150 seconds
	let prev = seed_chain(&store, 503, &[150; 503], SEED_BITS);

	let timespan = 503u64 * 150;
	let expected = from_compact(SEED_BITS) * timespan / 75_600u64;
	assert_eq!(expect_target(&params, &store, &prev), expected);
	assert_roundtrip(&params, &store, &prev, &expected);
}

#[test]
fn second_era_retargets_every_sixty_blocks() {
	let params = NetworkParameters::mainnet();
	let store = MemoryBlockStore::new();
	// a boundary height between the july and november forks
	let tip = JULY_FORK + 60 * 100 - 1;
	assert_eq!((tip + 1) % 60, 0);
	let prev = seed_chain(&store, tip, &[120; 70], SEED_BITS);

	// 59 gaps of 120 seconds between the window endpoints
	let expected = from_compact(SEED_BITS) * (59u64 * 120) / 7_200u64;
	assert_eq!(expect_target(&params, &store, &prev), expected);
	assert_roundtrip(&params, &store, &prev, &expected);
}

#[test]
fn median_era_with_constant_spacing_keeps_the_target() {
	let params = NetworkParameters::mainnet();
	let store = MemoryBlockStore::new();
	// boundary height in the median era, before the stuck-interval
	// defence activates
	let tip = NOVEMBER_FORK + 60 * 10 - 1;
	assert!(tip + 1 <= NOVEMBER_FORK_2);
	let prev = seed_chain(&store, tip, &[120; 80], SEED_BITS);

	// constant two minute spacing: the median is spot on target and
	// the difficulty must not move
	assert_eq!(
		expect_target(&params, &store, &prev),
		from_compact(SEED_BITS)
	);
	assert_roundtrip(&params, &store, &prev, &from_compact(SEED_BITS));
}

#[test]
fn median_era_aborts_silently_when_history_is_short() {
	let params = NetworkParameters::mainnet();
	let store = MemoryBlockStore::new();
	let tip = NOVEMBER_FORK + 60 * 10 - 1;
	// only 30 blocks of history, the 60 block window cannot be filled
	let prev = seed_chain(&store, tip, &[120; 30], SEED_BITS);

	// any advertised bits pass, as after a checkpoint restart
	let header = next_header(&prev, 120, SEED_BITS ^ 1);
	difficulty::check_transition(&params, &store, &prev, &header).unwrap();
	assert!(difficulty::next_target(&params, &store, &prev)
		.unwrap()
		.is_none());
}

#[test]
fn stuck_interval_defence_in_the_median_era() {
	let params = NetworkParameters::mainnet();
	let store = MemoryBlockStore::new();
	// a boundary past the second november fork, before the may fork
	let tip = NOVEMBER_FORK_2 + 60 * 10 - 1;
	assert!(tip + 1 <= MAY_FORK);
	// constant 120 second gaps: blocks five apart sit exactly ten
	// minutes from each other, which is the defence fingerprint
	let prev = seed_chain(&store, tip, &[120; 80], SEED_BITS);

	let expected = from_compact(SEED_BITS) * 6_600u64 / 7_200u64;
	assert_eq!(expect_target(&params, &store, &prev), expected);
	assert_roundtrip(&params, &store, &prev, &expected);
}

#[test]
fn average_correction_pulls_a_low_median_up() {
	let params = NetworkParameters::mainnet();
	let store = MemoryBlockStore::new();
	let tip = MAY_FORK + 60 * 10 - 1;
	assert!(tip + 1 <= JULY_FORK_2);

	// newest 59 gaps of 100 seconds, older 60 of 120: median 100 with
	// a 110 average lands in the correction band
	let mut gaps = vec![120u64; 60];
	gaps.extend(vec![100u64; 59]);
	let prev = seed_chain(&store, tip, &gaps, SEED_BITS);

	let expected = from_compact(SEED_BITS) * (110u64 * 60) / 7_200u64;
	assert_eq!(expect_target(&params, &store, &prev), expected);
}

#[test]
fn average_correction_caps_a_slow_window() {
	let params = NetworkParameters::mainnet();
	let store = MemoryBlockStore::new();
	let tip = MAY_FORK + 60 * 10 - 1;

	// every gap 200 seconds: the 120 block average crosses 180 and the
	// median is forced to 130
	let prev = seed_chain(&store, tip, &[200; 120], SEED_BITS);

	let expected = from_compact(SEED_BITS) * (130u64 * 60) / 7_200u64;
	assert_eq!(expect_target(&params, &store, &prev), expected);
}

#[test]
fn per_block_era_applies_the_fall_clamp() {
	let params = NetworkParameters::mainnet();
	let store = MemoryBlockStore::new();
	let tip = JULY_FORK_2 + 300;

	// newest 59 gaps of 150 seconds, older ones of 170 (plus one of
	// 160 to keep the average at 160): the median would allow a 25%
	// difficulty fall but the per-block clamp holds it to 120/119
	let mut gaps = vec![160u64];
	gaps.extend(vec![170u64; 59]);
	gaps.extend(vec![150u64; 59]);
	let prev = seed_chain(&store, tip, &gaps, SEED_BITS);

	let expected = from_compact(SEED_BITS) * (121u64 * 60) / 7_200u64;
	assert_eq!(expect_target(&params, &store, &prev), expected);
	assert_roundtrip(&params, &store, &prev, &expected);
}

#[test]
fn per_block_era_stuck_defence_forces_the_median_down() {
	let params = NetworkParameters::mainnet();
	let store = MemoryBlockStore::new();
	let tip = JULY_FORK_2 + 300;

	// constant two minute spacing trips the defence past the second
	// july fork, pinning the median to 119
	let prev = seed_chain(&store, tip, &[120; 241], SEED_BITS);

	let expected = from_compact(SEED_BITS) * (119u64 * 60) / 7_200u64;
	assert_eq!(expect_target(&params, &store, &prev), expected);
	assert_roundtrip(&params, &store, &prev, &expected);
}

#[test]
fn per_block_era_rise_is_bounded_by_the_sixty_block_ceiling() {
	let params = NetworkParameters::mainnet();
	let store = MemoryBlockStore::new();
	let tip = JULY_FORK_2 + 300;

	// one minute gaps everywhere: the rise clamp takes the median to
	// 117, then the 60 block ceiling bounds the target from below
	let prev = seed_chain(&store, tip, &[60; 241], SEED_BITS);

	let expected = from_compact(SEED_BITS) * 100u64 / 102u64;
	assert_eq!(expect_target(&params, &store, &prev), expected);
	assert_roundtrip(&params, &store, &prev, &expected);
}

#[test]
fn per_block_era_half_adjust_after_two_stalls() {
	let params = NetworkParameters::mainnet();
	let store = MemoryBlockStore::new();
	let tip = JULY_FORK_2 + 300;

	// two most recent gaps are 20 minute stalls and the average sits
	// above 180: difficulty is allowed to nearly halve in one step
	let mut gaps = vec![170u64; 117];
	gaps.extend(vec![1_300u64; 2]);
	let prev = seed_chain(&store, tip, &gaps, SEED_BITS);

	let expected = from_compact(SEED_BITS) * (170u64 * 60) / 7_200u64;
	assert_eq!(expect_target(&params, &store, &prev), expected);
	assert_roundtrip(&params, &store, &prev, &expected);
}

#[test]
fn per_block_era_caps_at_the_proof_of_work_limit() {
	let params = NetworkParameters::mainnet();
	let store = MemoryBlockStore::new();
	let tip = JULY_FORK_2 + 300;

	// the parent already sits at the limit, a falling difficulty can
	// not go past it
	let limit_bits = params.pow_limit_bits();
	let prev = seed_chain(&store, tip, &[150; 241], limit_bits);

	assert_eq!(
		expect_target(&params, &store, &prev),
		params.proof_of_work_limit
	);
}

#[test]
fn per_block_era_accepts_anything_past_pruned_history() {
	let params = NetworkParameters::mainnet();
	let store = MemoryBlockStore::new();
	let tip = JULY_FORK_2 + 300;
	// far fewer than the 120 blocks the averaging window needs
	let prev = seed_chain(&store, tip, &[120; 50], SEED_BITS);

	let header = next_header(&prev, 120, SEED_BITS ^ 1);
	difficulty::check_transition(&params, &store, &prev, &header).unwrap();
}

#[test]
fn testnet_allows_min_difficulty_after_a_long_gap() {
	let params = NetworkParameters::testnet();
	let store = MemoryBlockStore::new();
	// a non-retarget height in the sixty block era
	let prev = seed_chain(&store, JULY_FORK + 69, &[120; 9], SEED_BITS);

	// gap beyond twice the spacing: any difficulty goes
	let relief = next_header(&prev, 2 * 120 + 1, params.pow_limit_bits());
	difficulty::check_transition(&params, &store, &prev, &relief).unwrap();
}

#[test]
fn testnet_walks_back_to_the_last_real_difficulty() {
	let params = NetworkParameters::testnet();
	let store = MemoryBlockStore::new();
	let limit_bits = params.pow_limit_bits();

	// the boundary block carries a real difficulty, the nine blocks
	// after it were mined with the relief rule at the minimum
	let boundary_height = JULY_FORK + 60;
	assert_eq!(boundary_height % 60, 0);
	let boundary = seed_chain(&store, boundary_height, &[120; 10], SEED_BITS);
	let mut cursor = boundary.clone();
	for _ in 0..9 {
		let header = next_header(&cursor, 120, limit_bits);
		cursor = cursor.build(header);
		store.put(&cursor).unwrap();
	}
	assert_eq!(cursor.height, boundary_height + 9);

	// a prompt block must match the difficulty of block 60
	let good = next_header(&cursor, 120, SEED_BITS);
	difficulty::check_transition(&params, &store, &cursor, &good).unwrap();

	let bad = next_header(&cursor, 120, limit_bits);
	match difficulty::check_transition(&params, &store, &cursor, &bad)
		.unwrap_err()
		.kind()
	{
		ErrorKind::DifficultyMismatch(_) => {}
		e => panic!("unexpected error {:?}", e),
	}
}
