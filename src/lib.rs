// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

pub mod backends;   // simulated blobs
pub mod blob;       // tokens, partitions, drain data
pub mod config;     // pipeline config + runtime builder
pub mod engine;     // blob graph and drainer
pub mod errors;     // error handling
pub mod observability;
pub mod traits;     // blob and hook abstractions
