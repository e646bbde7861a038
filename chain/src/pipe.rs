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

//! Chain walking helpers used by the block acceptance pipeline: fork
//! point location, partial chain extraction and the median timestamp of
//! recent blocks.

use crate::core::consensus::MEDIAN_TIME_SPAN;
use crate::error::{Error, ErrorKind};
use crate::types::{BlockStore, StoredBlock};

/// Locates the split point (deepest common ancestor) of two chain tips.
/// The higher cursor is walked down until the heights match, then both
/// walk in lock-step until they meet. Returns `None` when either cursor
/// runs off the store before meeting.
pub fn find_split(
	store: &dyn BlockStore,
	new_tip: &StoredBlock,
	old_tip: &StoredBlock,
) -> Result<Option<StoredBlock>, Error> {
	let mut new_cursor = new_tip.clone();
	let mut old_cursor = old_tip.clone();
	loop {
		if new_cursor.hash() == old_cursor.hash() {
			return Ok(Some(new_cursor));
		}
		if old_cursor.height > new_cursor.height {
			old_cursor = match old_cursor.get_prev(store)? {
				Some(b) => b,
				None => return Ok(None),
			};
		} else {
			new_cursor = match new_cursor.get_prev(store)? {
				Some(b) => b,
				None => return Ok(None),
			};
		}
	}
}

/// Returns the blocks from `higher` down to, but not including,
/// `lower`, ordered tip first. Walking off the store mid-segment is an
/// invariant violation.
pub fn get_partial_chain(
	store: &dyn BlockStore,
	higher: &StoredBlock,
	lower: &StoredBlock,
) -> Result<Vec<StoredBlock>, Error> {
	assert!(
		higher.height > lower.height,
		"higher and lower are reversed"
	);
	let mut results = vec![];
	let mut cursor = higher.clone();
	loop {
		results.push(cursor.clone());
		cursor = match cursor.get_prev(store)? {
			Some(b) => b,
			None => return Err(ErrorKind::OrphanedSegment.into()),
		};
		if cursor.hash() == lower.hash() {
			break;
		}
	}
	Ok(results)
}

/// Median timestamp of the last eleven blocks ending at `from`. Chains
/// shorter than the window use whatever blocks they have.
pub fn median_time_of_recent_blocks(
	store: &dyn BlockStore,
	from: &StoredBlock,
) -> Result<u64, Error> {
	let mut timestamps = Vec::with_capacity(MEDIAN_TIME_SPAN);
	timestamps.push(from.header.timestamp);
	let mut cursor = from.get_prev(store)?;
	while let Some(b) = cursor {
		timestamps.push(b.header.timestamp);
		if timestamps.len() == MEDIAN_TIME_SPAN {
			break;
		}
		cursor = b.get_prev(store)?;
	}
	timestamps.sort();
	Ok(timestamps[(timestamps.len() - 1) / 2])
}
