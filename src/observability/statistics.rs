// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::blob::{DrainData, Token};
use std::collections::BTreeMap;
use std::io::{self, Write};
use std::sync::{Mutex, PoisonError};

/// Receives every aggregated drain data snapshot the drainer produces.
///
/// Injected through [`DrainerBuilder::observer`](crate::engine::DrainerBuilder::observer);
/// the drainer works the same without one.
pub trait DrainDataObserver: Send + Sync {
    fn on_drain_data(&self, episode: u64, data: &DrainData);
}

/// Records how many items were buffered on each token, one entry per episode.
///
/// Useful to see which edges keep data in flight when the pipeline is
/// drained for reconfiguration.
#[derive(Debug, Default)]
pub struct DrainDataStatistics {
    sizes: Mutex<BTreeMap<Token, Vec<usize>>>,
}

impl DrainDataStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Item counts per token, oldest episode first.
    pub fn snapshot(&self) -> BTreeMap<Token, Vec<usize>> {
        self.sizes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Writes `token - count` lines, one block per token.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        for (token, sizes) in self.snapshot() {
            for size in sizes {
                writeln!(writer, "{} - {}", token, size)?;
            }
            writeln!(writer)?;
        }
        writer.flush()
    }
}

impl DrainDataObserver for DrainDataStatistics {
    fn on_drain_data(&self, _episode: u64, data: &DrainData) {
        let mut sizes = self.sizes.lock().unwrap_or_else(PoisonError::into_inner);
        for (token, items) in data.data() {
            sizes.entry(*token).or_default().push(items.len());
        }
    }
}
