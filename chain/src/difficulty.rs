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

//! The difficulty retargeting state machine. Four historical hard
//! forks changed the rules, so the expected target of a block depends
//! on its height:
//!
//! * up to the july fork, retargets happen every 504 blocks over the
//!   launch-era 2.5 minute spacing;
//! * up to the november fork, the same endpoint computation runs every
//!   60 blocks over the 2 minute spacing;
//! * past the november fork, retargets use the median of the last 60
//!   inter-block times, later corrected by a 120-block average and a
//!   stuck-interval defence;
//! * past the second july fork, difficulty retargets on every block,
//!   bounded by per-block and multi-block clamps.
//!
//! Retarget walks that run off the store return success silently, which
//! is what lets a node resume from a checkpoint without deep history.

use num_bigint::BigUint;

use crate::core::consensus::{
	self, AVERAGE_WINDOW, JULY_FORK_2, MAY_FORK, MEDIAN_WINDOW, NOVEMBER_FORK, NOVEMBER_FORK_2,
	TARGET_TIMESPAN,
};
use crate::core::core::block::BlockHeader;
use crate::core::core::target;
use crate::core::params::NetworkParameters;
use crate::error::{Error, ErrorKind};
use crate::types::{BlockStore, StoredBlock};

/// Checks that the difficulty advertised by a header matches the
/// protocol target computed from its parent chain, under the precision
/// mask of the compact encoding.
pub fn check_transition(
	params: &NetworkParameters,
	store: &dyn BlockStore,
	prev: &StoredBlock,
	header: &BlockHeader,
) -> Result<(), Error> {
	let height = prev.height + 1;

	if height > JULY_FORK_2 {
		return match per_block_target(params, store, prev)? {
			Some(computed) => verify_bits(&computed, header.bits),
			None => Ok(()),
		};
	}

	if height % params.interval(height) != 0 {
		// no retarget scheduled at this height
		if params.is_testnet() {
			return check_testnet_relief(params, store, prev, header);
		}
		if header.bits != prev.header.bits {
			return Err(ErrorKind::DifficultyMismatch(header.bits).into());
		}
		return Ok(());
	}

	match retarget_target(params, store, prev)? {
		Some(computed) => verify_bits(&computed, header.bits),
		None => Ok(()),
	}
}

/// The target the next block on top of `prev` is expected to carry, or
/// `None` when the store lacks the history to compute it. This is the
/// value a miner encodes into the header it works on.
pub fn next_target(
	params: &NetworkParameters,
	store: &dyn BlockStore,
	prev: &StoredBlock,
) -> Result<Option<BigUint>, Error> {
	let height = prev.height + 1;
	if height > JULY_FORK_2 {
		per_block_target(params, store, prev)
	} else if height % params.interval(height) == 0 {
		retarget_target(params, store, prev)
	} else {
		Ok(Some(prev.header.target()))
	}
}

// Scheduled retarget for the interval-gated eras. Before the november
// fork the timespan is the plain difference between the window
// endpoints; after it, the median of recent inter-block times scaled to
// the window, with the later corrections layered on top.
fn retarget_target(
	params: &NetworkParameters,
	store: &dyn BlockStore,
	prev: &StoredBlock,
) -> Result<Option<BigUint>, Error> {
	let height = prev.height + 1;
	let expected = params.target_timespan(height);

	let timespan: i64 = if height > NOVEMBER_FORK {
		let wanted = if height > MAY_FORK {
			AVERAGE_WINDOW
		} else {
			MEDIAN_WINDOW
		};
		let window = collect_window(store, prev, wanted)?;
		if window.len() < wanted {
			return Ok(None);
		}
		let times: Vec<u64> = window.iter().map(|b| b.header.timestamp).collect();
		let mut med = median_interval(&times[..MEDIAN_WINDOW]) as i64;
		if height > MAY_FORK {
			let avg = average_interval(&times) as i64;
			if avg >= 180 {
				med = 130;
			} else if avg >= 108 && med < 120 {
				med = 110;
			}
		}
		if height > NOVEMBER_FORK_2 && med >= 120 && stuck_interval_detected(&times[..MEDIAN_WINDOW])
		{
			med = 110;
		}
		med * 60
	} else {
		let interval = params.interval(height);
		let mut cursor = prev.clone();
		for _ in 0..(interval - 1) {
			cursor = match cursor.get_prev(store)? {
				Some(b) => b,
				None => return Ok(None),
			};
		}
		prev.header.timestamp as i64 - cursor.header.timestamp as i64
	};

	let timespan = consensus::clamp_timespan(timespan, expected);
	let mut new_target = prev.header.target() * timespan / expected;
	if new_target > params.proof_of_work_limit {
		new_target = params.proof_of_work_limit.clone();
	}
	Ok(Some(new_target))
}

// Per-block retarget of the final era. The median of the last 60
// inter-block times drives the target, corrected by the 120-block
// average, the stuck-interval defence and the per-block clamps, then
// bounded against the targets 1, 60 and 240 blocks back.
fn per_block_target(
	params: &NetworkParameters,
	store: &dyn BlockStore,
	prev: &StoredBlock,
) -> Result<Option<BigUint>, Error> {
	let window = collect_window(store, prev, 241)?;
	if window.len() < AVERAGE_WINDOW {
		return Ok(None);
	}
	let times: Vec<u64> = window.iter().map(|b| b.header.timestamp).collect();

	let mut med = median_interval(&times[..MEDIAN_WINDOW]) as i64;
	let avg = average_interval(&times[..AVERAGE_WINDOW]) as i64;
	let mut did_half_adjust = false;

	med = med.min(avg);
	// two consecutive near-stalls halve difficulty in one step
	if avg >= 180 && gap(times[0], times[1]) >= 1200 && gap(times[1], times[2]) >= 1200 {
		did_half_adjust = true;
		med = 240;
	}
	if med >= 120 && stuck_interval_detected(&times[..MEDIAN_WINDOW]) {
		med = 119;
	}
	if avg > 216 || med > 122 {
		// 170 = 120 * 142/100, 121 = 120 * 120/119, the largest single
		// block falls with and without the half adjust
		med = if did_half_adjust { 170 } else { 121 };
	} else if avg < 117 || med < 117 {
		// cap the single block rise at 2%
		med = 117;
	}
	let timespan = (med * 60) as u64;

	let prev_target = prev.header.target();
	let mut new_target = prev_target.clone() * timespan / TARGET_TIMESPAN;

	if !did_half_adjust {
		let floor = prev_target * 10u32 / 8u32;
		if new_target > floor {
			new_target = floor;
		}
	}
	// difficulty may rise ~2% over 60 blocks and four times that over 240
	if window.len() > MEDIAN_WINDOW {
		let ceiling = window[MEDIAN_WINDOW].header.target() * 100u32 / 102u32;
		if new_target < ceiling {
			new_target = ceiling;
		}
	}
	if window.len() > 240 {
		let ceiling = window[240].header.target() * 100u32 / 408u32;
		if new_target < ceiling {
			new_target = ceiling;
		}
	}

	if new_target > params.proof_of_work_limit {
		new_target = params.proof_of_work_limit.clone();
	}
	Ok(Some(new_target))
}

// On testnet, a block arriving after a long pause may carry the minimum
// difficulty; otherwise it must match the last block that was not such
// a minimum difficulty special.
fn check_testnet_relief(
	params: &NetworkParameters,
	store: &dyn BlockStore,
	prev: &StoredBlock,
	header: &BlockHeader,
) -> Result<(), Error> {
	let height = prev.height + 1;
	if header.timestamp > prev.header.timestamp + 2 * params.target_spacing(height) {
		return Ok(());
	}
	let limit_bits = params.pow_limit_bits();
	let mut cursor = prev.clone();
	while cursor.height % params.interval(cursor.height) != 0 && cursor.header.bits == limit_bits {
		cursor = match cursor.get_prev(store)? {
			Some(b) => b,
			None => return Ok(()),
		};
	}
	if header.bits != cursor.header.bits {
		return Err(ErrorKind::DifficultyMismatch(header.bits).into());
	}
	Ok(())
}

fn verify_bits(computed: &BigUint, received_bits: u32) -> Result<(), Error> {
	let received = target::from_compact(received_bits);
	if computed & target::accuracy_mask(received_bits) != received {
		return Err(ErrorKind::DifficultyMismatch(received_bits).into());
	}
	Ok(())
}

// Walks up to `n` blocks back from `from` inclusive, newest first. The
// walk simply stops where the store does.
fn collect_window(
	store: &dyn BlockStore,
	from: &StoredBlock,
	n: usize,
) -> Result<Vec<StoredBlock>, Error> {
	let mut window = Vec::with_capacity(n);
	let mut cursor = from.clone();
	loop {
		window.push(cursor.clone());
		if window.len() == n {
			break;
		}
		cursor = match cursor.get_prev(store)? {
			Some(b) => b,
			None => break,
		};
	}
	Ok(window)
}

fn gap(a: u64, b: u64) -> u64 {
	if a > b {
		a - b
	} else {
		b - a
	}
}

// Median of the absolute differences between adjacent timestamps.
fn median_interval(times: &[u64]) -> u64 {
	let mut intervals: Vec<u64> = times.windows(2).map(|w| gap(w[0], w[1])).collect();
	intervals.sort();
	intervals[intervals.len() / 2]
}

// Arithmetic mean of the absolute differences between adjacent
// timestamps.
fn average_interval(times: &[u64]) -> u64 {
	let intervals: Vec<u64> = times.windows(2).map(|w| gap(w[0], w[1])).collect();
	intervals.iter().sum::<u64>() / intervals.len() as u64
}

// The 51% defence pins pairs of blocks five apart exactly ten minutes
// from each other; seeing that pattern means the defence is active and
// the median must not be trusted upward.
fn stuck_interval_detected(times: &[u64]) -> bool {
	(1..=54).any(|i| gap(times[i], times[i + 5]) == 600)
}
