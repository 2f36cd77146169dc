// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Snapshots of buffered items and worker state captured when blobs drain.
//!
//! A drained blob reports a [`BlobDrainData`]: the items left on its internal
//! edges and the state of its stateful workers (the [`DrainData`]), plus the
//! items sitting in its boundary input and output buffers. The drainer folds
//! the snapshots of every blob into one [`DrainData`] keyed by [`Token`] via
//! [`DrainData::aggregate`], which is what a reconfigured stream graph is
//! resumed from.
//!
//! # Ownership
//!
//! Internal edges belong to exactly one blob, so two blobs reporting items for
//! the same internal token is an ownership violation. Boundary edges are
//! shared: the consumer's input buffer and the producer's output buffer of the
//! same token are concatenated, consumer side first since those items were
//! produced earlier.

use crate::blob::token::{Token, WorkerId};
use crate::errors::DrainError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// Field name -> value table of one stateful worker.
pub type WorkerState = BTreeMap<String, Value>;

/// Buffered items per edge and state per worker.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DrainData {
    #[serde(default)]
    data: BTreeMap<Token, Vec<Value>>,
    #[serde(default)]
    state: BTreeMap<WorkerId, WorkerState>,
}

impl DrainData {
    pub fn new(data: BTreeMap<Token, Vec<Value>>, state: BTreeMap<WorkerId, WorkerState>) -> Self {
        Self { data, state }
    }

    pub fn data(&self) -> &BTreeMap<Token, Vec<Value>> {
        &self.data
    }

    /// Items buffered on `token`, if any were reported.
    pub fn data_for(&self, token: &Token) -> Option<&[Value]> {
        self.data.get(token).map(Vec::as_slice)
    }

    pub fn state(&self) -> &BTreeMap<WorkerId, WorkerState> {
        &self.state
    }

    pub fn worker_state(&self, worker: WorkerId) -> Option<&WorkerState> {
        self.state.get(&worker)
    }

    pub fn worker_field(&self, worker: WorkerId, field: &str) -> Option<&Value> {
        self.state.get(&worker).and_then(|fields| fields.get(field))
    }

    pub fn is_empty(&self) -> bool {
        self.data.values().all(Vec::is_empty) && self.state.is_empty()
    }

    /// Merges `other` into this snapshot.
    ///
    /// Item lists of tokens present in both snapshots are appended, ours
    /// first. A worker whose state appears in both snapshots fails the merge
    /// with [`DrainError::StateConflict`]: one worker's state must never be
    /// split across blobs.
    pub fn merge(mut self, other: DrainData) -> Result<DrainData, DrainError> {
        if let Some(worker) = self
            .state
            .keys()
            .find(|worker| other.state.contains_key(worker))
        {
            return Err(DrainError::StateConflict { worker: *worker });
        }

        for (token, items) in other.data {
            self.data.entry(token).or_default().extend(items);
        }
        self.state.extend(other.state);
        Ok(self)
    }

    /// Restricts the snapshot to the given workers.
    ///
    /// Keeps every token whose downstream worker is in `workers` and the state
    /// of those workers. Used to hand each blob of a new configuration only
    /// the data it will consume.
    pub fn subset(&self, workers: &BTreeSet<WorkerId>) -> DrainData {
        let data = self
            .data
            .iter()
            .filter(|(token, _)| {
                token
                    .downstream()
                    .map_or(false, |worker| workers.contains(&worker))
            })
            .map(|(token, items)| (*token, items.clone()))
            .collect();
        let state = self
            .state
            .iter()
            .filter(|(worker, _)| workers.contains(worker))
            .map(|(worker, fields)| (*worker, fields.clone()))
            .collect();
        DrainData { data, state }
    }

    /// Folds the per-blob snapshots of one draining episode into one result.
    ///
    /// Fails with [`DrainError::DuplicateTokenData`] when two blobs report
    /// internal items for the same token and with
    /// [`DrainError::StateConflict`] when two blobs report the same worker's
    /// state.
    pub fn aggregate<'a, I>(snapshots: I) -> Result<DrainData, DrainError>
    where
        I: IntoIterator<Item = (Token, &'a BlobDrainData)>,
    {
        let mut internal = DrainData::default();
        let mut owners: BTreeMap<Token, Token> = BTreeMap::new();
        let mut boundary_inputs: BTreeMap<Token, Vec<Value>> = BTreeMap::new();
        let mut boundary_outputs: BTreeMap<Token, Vec<Value>> = BTreeMap::new();

        for (blob, snapshot) in snapshots {
            for token in snapshot.drain_data.data.keys() {
                if let Some(owner) = owners.insert(*token, blob) {
                    return Err(DrainError::DuplicateTokenData {
                        token: *token,
                        first: owner,
                        second: blob,
                    });
                }
            }
            internal = internal.merge(snapshot.drain_data.clone())?;

            for (token, items) in &snapshot.input_data {
                boundary_inputs
                    .entry(*token)
                    .or_default()
                    .extend(items.iter().cloned());
            }
            for (token, items) in &snapshot.output_data {
                boundary_outputs
                    .entry(*token)
                    .or_default()
                    .extend(items.iter().cloned());
            }
        }

        let tokens: BTreeSet<Token> = boundary_inputs
            .keys()
            .chain(boundary_outputs.keys())
            .copied()
            .collect();
        let mut boundary = BTreeMap::new();
        for token in tokens {
            let mut items = boundary_inputs.remove(&token).unwrap_or_default();
            items.extend(boundary_outputs.remove(&token).unwrap_or_default());
            boundary.insert(token, items);
        }

        internal.merge(DrainData::new(boundary, BTreeMap::new()))
    }
}

/// Everything one blob reports after it drained.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BlobDrainData {
    /// Items on internal edges and worker state.
    #[serde(default)]
    pub drain_data: DrainData,
    /// Items left in the blob's boundary input buffers.
    #[serde(default)]
    pub input_data: BTreeMap<Token, Vec<Value>>,
    /// Items left in the blob's boundary output buffers.
    #[serde(default)]
    pub output_data: BTreeMap<Token, Vec<Value>>,
}

impl BlobDrainData {
    pub fn item_count(&self) -> usize {
        self.drain_data.data.values().map(Vec::len).sum::<usize>()
            + self.input_data.values().map(Vec::len).sum::<usize>()
            + self.output_data.values().map(Vec::len).sum::<usize>()
    }
}
