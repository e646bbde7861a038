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

//! The block chain itself, validates and accepts new blocks, handles
//! reorgs and drives the difficulty retargeting protocol.

#![deny(non_upper_case_globals)]
#![deny(non_camel_case_types)]
#![deny(non_snake_case)]
#![deny(unused_mut)]
#![warn(missing_docs)]

#[macro_use]
extern crate log;
#[macro_use]
extern crate serde_derive;

use aurum_core as core;

mod chain;
pub mod difficulty;
pub mod error;
pub mod pipe;
pub mod store;
pub mod types;

// Re-export the base interface
pub use crate::chain::Chain;
pub use crate::error::{Error, ErrorKind};
pub use crate::types::{
	BlockOrigin, BlockStore, Observer, StoreHook, StoredBlock, StoredUndoableBlock,
	TxOutputChanges, UndoableBlockStore, UtxoHook,
};
