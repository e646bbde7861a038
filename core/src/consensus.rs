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

//! All the rules required for the network to reach consensus are complex
//! and hard to completely isolate. Some can be simple parameters (like
//! the block spacing), others complex algorithms (like the retargeting
//! rules). As long as they're simple enough, consensus-relevant
//! constants and short functions are kept here.

/// Seconds targeted between blocks from the second era onward.
pub const TARGET_SPACING: u64 = 120;

/// Seconds a full retarget window is expected to span from the second
/// era onward (60 blocks).
pub const TARGET_TIMESPAN: u64 = 7_200;

/// Blocks between scheduled retargets outside the per-block era.
pub const RETARGET_INTERVAL: u64 = TARGET_TIMESPAN / TARGET_SPACING;

/// Seconds targeted between blocks during the launch era.
pub const LAUNCH_TARGET_SPACING: u64 = 150;

/// Seconds a launch-era retarget window is expected to span (seven
/// eighths of a day).
pub const LAUNCH_TARGET_TIMESPAN: u64 = 75_600;

/// Blocks between retargets during the launch era.
pub const LAUNCH_RETARGET_INTERVAL: u64 = LAUNCH_TARGET_TIMESPAN / LAUNCH_TARGET_SPACING;

/// Height of the first difficulty hard fork: the 60-block retarget
/// interval and 2 minute spacing take over.
pub const JULY_FORK: u64 = 45_000;

/// Height of the second hard fork: retargets start using the median of
/// recent inter-block times instead of the window endpoints.
pub const NOVEMBER_FORK: u64 = 103_000;

/// Height at which the stuck-interval defence activates.
pub const NOVEMBER_FORK_2: u64 = 118_800;

/// Height at which the 120-block average correction activates.
pub const MAY_FORK: u64 = 248_000;

/// Height of the last hard fork: difficulty retargets on every block,
/// bounded by the per-block and multi-block clamps.
pub const JULY_FORK_2: u64 = 251_230;

/// Blocks whose timestamps feed the median inter-block time.
pub const MEDIAN_WINDOW: usize = 60;

/// Blocks whose timestamps feed the average inter-block time.
pub const AVERAGE_WINDOW: usize = 120;

/// Blocks whose timestamps feed the too-early median check applied to
/// fully validated blocks.
pub const MEDIAN_TIME_SPAN: usize = 11;

/// Number of blocks between retargets at the given height.
pub fn retarget_interval(height: u64) -> u64 {
	if height <= JULY_FORK {
		LAUNCH_RETARGET_INTERVAL
	} else {
		RETARGET_INTERVAL
	}
}

/// Seconds a retarget window is expected to span at the given height.
pub fn target_timespan(height: u64) -> u64 {
	if height <= JULY_FORK {
		LAUNCH_TARGET_TIMESPAN
	} else {
		TARGET_TIMESPAN
	}
}

/// Seconds targeted between blocks at the given height.
pub fn target_spacing(height: u64) -> u64 {
	if height <= JULY_FORK {
		LAUNCH_TARGET_SPACING
	} else {
		TARGET_SPACING
	}
}

/// Clamps an observed retarget timespan to the allowed band around the
/// expected timespan, limiting how fast difficulty can move in a single
/// retarget.
pub fn clamp_timespan(timespan: i64, expected: u64) -> u64 {
	let min = (expected * 70 / 99) as i64;
	let max = (expected * 99 / 70) as i64;
	if timespan < min {
		min as u64
	} else if timespan > max {
		max as u64
	} else {
		timespan as u64
	}
}
