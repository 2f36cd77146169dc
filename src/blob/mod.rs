// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Data model shared by the blob graph and the drainer: edge tokens, blob
//! partitions and drain data snapshots.

mod drain_data;
mod partition;
mod token;

pub use drain_data::{BlobDrainData, DrainData, WorkerState};
pub use partition::BlobPartition;
pub use token::{ParseTokenError, Token, WorkerId};
