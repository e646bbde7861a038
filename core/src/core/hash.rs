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

//! Hash Function
//!
//! Primary hash function used in the protocol.

use std::fmt;

use blake2_rfc::blake2b::blake2b;

/// A hash to uniquely (or close enough) identify one of the main
/// blockchain constructs. Used pervasively for blocks and transactions.
#[derive(Debug, Copy, Clone, PartialEq, PartialOrd, Eq, Ord, Hash, Serialize, Deserialize)]
pub struct Hash(pub [u8; 32]);

impl fmt::Display for Hash {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		for i in self.0[..].iter().cloned() {
			write!(f, "{:02x}", i)?;
		}
		Ok(())
	}
}

impl Hash {
	/// Creates a new hash from a vector, which must hold at least 32 bytes.
	pub fn from_vec(v: Vec<u8>) -> Hash {
		let mut a = [0; 32];
		a.copy_from_slice(&v[..32]);
		Hash(a)
	}

	/// Converts the hash to a byte vector
	pub fn to_vec(&self) -> Vec<u8> {
		self.0.to_vec()
	}

	/// Converts the hash to a byte slice
	pub fn to_slice(&self) -> &[u8] {
		&self.0
	}
}

/// The all-zeros hash, used where no parent or commitment exists.
pub const ZERO_HASH: Hash = Hash([0; 32]);

/// A trait for types that get their hash from their byte serialization.
pub trait Hashed {
	/// Hash of the serialized form of the type.
	fn hash(&self) -> Hash {
		let data = self.bytes();
		let digest = blake2b(32, &[], &data);
		Hash::from_vec(digest.as_bytes().to_vec())
	}

	/// Byte serialization the hash commits to.
	fn bytes(&self) -> Vec<u8>;
}

impl Hashed for [u8] {
	fn bytes(&self) -> Vec<u8> {
		self.to_owned()
	}
}
