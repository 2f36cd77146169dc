// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::blob::token::{Token, WorkerId};
use std::collections::BTreeSet;

/// Boundary edges of one group of workers that will run as a blob.
///
/// The blob graph only needs to know which tokens cross the group boundary:
/// two groups are connected when one group's output tokens intersect the
/// other group's input tokens.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BlobPartition {
    inputs: BTreeSet<Token>,
    outputs: BTreeSet<Token>,
}

impl BlobPartition {
    pub fn new<I, O>(inputs: I, outputs: O) -> Self
    where
        I: IntoIterator<Item = Token>,
        O: IntoIterator<Item = Token>,
    {
        Self {
            inputs: inputs.into_iter().collect(),
            outputs: outputs.into_iter().collect(),
        }
    }

    /// Derives the boundary tokens of `workers` from the full edge list of the
    /// stream graph.
    ///
    /// An edge is an input when only its downstream worker belongs to the
    /// group (this includes the overall input edge) and an output when only
    /// its upstream worker does (this includes the overall output edge).
    /// Edges entirely inside the group are internal and ignored.
    pub fn from_workers(workers: &BTreeSet<WorkerId>, edges: &[Token]) -> Self {
        let mut partition = Self::default();
        for edge in edges {
            let upstream_inside = edge.upstream().map_or(false, |w| workers.contains(&w));
            let downstream_inside = edge.downstream().map_or(false, |w| workers.contains(&w));
            match (upstream_inside, downstream_inside) {
                (false, true) => {
                    partition.inputs.insert(*edge);
                }
                (true, false) => {
                    partition.outputs.insert(*edge);
                }
                _ => {}
            }
        }
        partition
    }

    /// The blob id: its smallest input token.
    pub fn id(&self) -> Option<Token> {
        self.inputs.iter().next().copied()
    }

    pub fn inputs(&self) -> &BTreeSet<Token> {
        &self.inputs
    }

    pub fn outputs(&self) -> &BTreeSet<Token> {
        &self.outputs
    }

    /// True when any of our outputs is consumed by `other`.
    pub fn feeds(&self, other: &BlobPartition) -> bool {
        !self.outputs.is_disjoint(&other.inputs)
    }
}
