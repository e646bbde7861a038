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

//! Error types for chain
use failure::{Backtrace, Context, Fail};
use std::fmt::{self, Display};

use crate::core::core::block;
use crate::core::core::hash::Hash;

/// Error definition
#[derive(Debug, Fail)]
pub struct Error {
	inner: Context<ErrorKind>,
}

/// Chain error definitions
#[derive(Clone, Eq, PartialEq, Debug, Fail)]
pub enum ErrorKind {
	/// Standalone header verification failed
	#[fail(display = "invalid block header: {}", _0)]
	HeaderInvalid(block::Error),
	/// The merkle root does not commit to the block transactions
	#[fail(display = "invalid block contents: {}", _0)]
	MerkleInvalid(block::Error),
	/// A bare header arrived while running full validation
	#[fail(display = "block header received while running in full-block mode")]
	HeaderInFullMode,
	/// Block at a checkpointed height carries the wrong hash
	#[fail(display = "block failed checkpoint lock-in at height {}", _0)]
	CheckpointMismatch(u64),
	/// A transaction is not final at the block height and time
	#[fail(display = "block contains a non-final transaction")]
	NonFinalTransaction,
	/// Timestamp is not later than the median of recent blocks
	#[fail(display = "block timestamp is too early")]
	TimestampTooEarly,
	/// Advertised difficulty differs from the protocol target
	#[fail(display = "advertised difficulty {:#010x} does not match the computed target", _0)]
	DifficultyMismatch(u32),
	/// A forking block shares no ancestor with the current chain
	#[fail(display = "block forks the chain without a common ancestor")]
	ForkWithoutAncestor,
	/// A chain segment walk ran off the end of the store
	#[fail(display = "chain segment walk ran off the store")]
	OrphanedSegment,
	/// Internal issue when trying to save or load data from the store
	#[fail(display = "store unavailable: {}", _0)]
	StoreUnavailable(String),
	/// Undo data required to disconnect a block has been pruned
	#[fail(display = "undo data pruned for block {}", _0)]
	Pruned(Hash),
	/// Anything else
	#[fail(display = "other error: {}", _0)]
	Other(String),
}

impl Display for Error {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		Display::fmt(&self.inner, f)
	}
}

impl Error {
	/// get kind
	pub fn kind(&self) -> ErrorKind {
		self.inner.get_context().clone()
	}
	/// get cause
	pub fn cause(&self) -> Option<&dyn Fail> {
		self.inner.cause()
	}
	/// get backtrace
	pub fn backtrace(&self) -> Option<&Backtrace> {
		self.inner.backtrace()
	}

	/// Whether the error means the block itself failed verification, as
	/// opposed to the chain being unable to process it right now.
	pub fn is_verification(&self) -> bool {
		match self.kind() {
			ErrorKind::StoreUnavailable(_)
			| ErrorKind::Pruned(_)
			| ErrorKind::OrphanedSegment
			| ErrorKind::Other(_) => false,
			_ => true,
		}
	}
}

impl From<ErrorKind> for Error {
	fn from(kind: ErrorKind) -> Error {
		Error {
			inner: Context::new(kind),
		}
	}
}

impl From<Context<ErrorKind>> for Error {
	fn from(inner: Context<ErrorKind>) -> Error {
		Error { inner }
	}
}
