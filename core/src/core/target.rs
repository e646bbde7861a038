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

//! The 256-bit difficulty target a block hash must not exceed, its
//! 32-bit compact encoding (a floating-point-like format with a 3-byte
//! mantissa), and the cumulative work measure derived from it.

use std::fmt;
use std::ops::Add;

use num_bigint::BigUint;
use num_traits::{One, ToPrimitive, Zero};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

/// Decodes a compact target to its full 256-bit value. A set sign bit
/// or a zero mantissa decodes to zero, which no hash can satisfy.
pub fn from_compact(bits: u32) -> BigUint {
	let size = (bits >> 24) as usize;
	let word = bits & 0x007f_ffff;
	if bits & 0x0080_0000 != 0 {
		return BigUint::zero();
	}
	if size <= 3 {
		BigUint::from(word >> (8 * (3 - size)))
	} else {
		BigUint::from(word) << (8 * (size - 3))
	}
}

/// Encodes a target in compact form. Lossy: only the top three bytes of
/// the target survive, which is exactly the precision the header format
/// carries.
pub fn to_compact(target: &BigUint) -> u32 {
	if target.is_zero() {
		return 0;
	}
	let mut size = (target.bits() + 7) / 8;
	let mut mantissa = if size <= 3 {
		target.to_u32().unwrap_or(0) << (8 * (3 - size))
	} else {
		((target >> (8 * (size - 3))) & BigUint::from(0x00ff_ffffu32))
			.to_u32()
			.unwrap_or(0)
	};
	// the sign bit must stay clear, shift the mantissa under it
	if mantissa & 0x0080_0000 != 0 {
		mantissa >>= 8;
		size += 1;
	}
	mantissa | ((size as u32) << 24)
}

/// Mask covering the bits of a full target that the given compact
/// encoding can actually represent. Comparing a computed target to a
/// received one must be done under this mask.
pub fn accuracy_mask(bits: u32) -> BigUint {
	let accuracy_bytes = ((bits >> 24) & 0xff).saturating_sub(3) as usize;
	BigUint::from(0x00ff_ffffu32) << (8 * accuracy_bytes)
}

/// Cumulative proof of work. A single block at a given target
/// contributes 2^256 / (target + 1); a chain accumulates the
/// contributions of all its blocks.
#[derive(Debug, Clone, PartialEq, PartialOrd, Eq, Ord)]
pub struct Work {
	num: BigUint,
}

impl Work {
	/// No work at all, the neutral element of accumulation.
	pub fn zero() -> Work {
		Work {
			num: BigUint::zero(),
		}
	}

	/// The work a single block proves by hashing under the given target.
	pub fn from_target(target: &BigUint) -> Work {
		let numerator = BigUint::one() << 256;
		Work {
			num: numerator / (target + BigUint::one()),
		}
	}

	/// Convert a `u64` into a `Work`
	pub fn from_num(num: u64) -> Work {
		Work {
			num: BigUint::from(num),
		}
	}

	/// Borrows the work as a bignum
	pub fn as_biguint(&self) -> &BigUint {
		&self.num
	}
}

impl fmt::Display for Work {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "{}", self.num)
	}
}

impl Add<Work> for Work {
	type Output = Work;
	fn add(self, other: Work) -> Work {
		Work {
			num: self.num + other.num,
		}
	}
}

impl Serialize for Work {
	fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		serializer.serialize_str(self.num.to_str_radix(10).as_str())
	}
}

impl<'de> Deserialize<'de> for Work {
	fn deserialize<D>(deserializer: D) -> Result<Work, D::Error>
	where
		D: Deserializer<'de>,
	{
		deserializer.deserialize_str(WorkVisitor)
	}
}

struct WorkVisitor;

impl<'de> de::Visitor<'de> for WorkVisitor {
	type Value = Work;

	fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
		formatter.write_str("a cumulative work value")
	}

	fn visit_str<E>(self, s: &str) -> Result<Self::Value, E>
	where
		E: de::Error,
	{
		let num = BigUint::parse_bytes(s.as_bytes(), 10)
			.ok_or_else(|| de::Error::invalid_value(de::Unexpected::Str(s), &"a decimal number"))?;
		Ok(Work { num })
	}
}
