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

//! Core data types: hashes, blocks, transactions and difficulty targets.

pub mod block;
pub mod hash;
pub mod target;
pub mod transaction;

pub use self::block::{Block, BlockHeader, FilteredBlock};
pub use self::hash::{Hash, Hashed, ZERO_HASH};
pub use self::target::Work;
pub use self::transaction::Transaction;
