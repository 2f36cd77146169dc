// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Blob dependency graph construction and verification.
//!
//! The blob graph is built from the boundary tokens of each blob partition.
//! Blob A is a predecessor of blob B when A's output tokens intersect B's
//! input tokens: the edge follows the producer/consumer relationship of the
//! data, not the identity of the partitions.
//!
//! # Construction Pipeline
//!
//! 1. **Identification**: each partition gets the id of its smallest input token
//! 2. **Linking**: every ordered pair of partitions is tested for token overlap
//! 3. **Cycle Detection**: three-color DFS over successor links
//! 4. **Source Resolution**: exactly one blob may have no predecessors
//!
//! Any failure is a [`GraphError`] and aborts pipeline construction; once a
//! `BlobGraph` exists its topology never changes.
//!
//! # Example
//!
//! ```rust
//! use stream_drainer::blob::{BlobPartition, Token};
//! use stream_drainer::engine::BlobGraph;
//!
//! let t1 = Token::new(0, 1);
//! let t2 = Token::new(1, 2);
//! let graph = BlobGraph::new(&[
//!     BlobPartition::new([Token::overall_input(0)], [t1]),
//!     BlobPartition::new([t1], [t2]),
//!     BlobPartition::new([t2], [Token::overall_output(2)]),
//! ])
//! .unwrap();
//!
//! assert_eq!(graph.source(), Token::overall_input(0));
//! assert_eq!(graph.len(), 3);
//! ```

use crate::blob::{BlobPartition, Token};
use crate::engine::blob_node::BlobNode;
use crate::errors::GraphError;
use crate::observability::messages::graph::{
    BlobCycleDetected, BlobGraphBuilt, SourceResolutionFailed,
};
use crate::observability::messages::StructuredLog;
use crate::traits::Blob;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Predecessor/successor relationship among the blobs of a running stream graph.
#[derive(Debug)]
pub struct BlobGraph {
    nodes: BTreeMap<Token, BlobNode>,
    source: Token,
    edge_count: usize,
}

impl BlobGraph {
    /// Builds and verifies the graph for the given partitions.
    pub fn new(partitions: &[BlobPartition]) -> Result<Self, GraphError> {
        let mut identified: Vec<(Token, &BlobPartition)> = Vec::with_capacity(partitions.len());
        let mut nodes = BTreeMap::new();
        for (index, partition) in partitions.iter().enumerate() {
            let id = partition
                .id()
                .ok_or(GraphError::BlobWithoutInputs { index })?;
            if nodes.insert(id, BlobNode::new(id, partition)).is_some() {
                return Err(GraphError::DuplicateBlob { blob: id });
            }
            identified.push((id, partition));
        }

        let mut edges = Vec::new();
        for (current_id, current) in &identified {
            for (other_id, other) in &identified {
                if current_id != other_id && current.feeds(other) {
                    edges.push((*current_id, *other_id));
                }
            }
        }

        for (from, to) in &edges {
            if let Some(node) = nodes.get_mut(from) {
                node.add_successor(*to);
            }
            if let Some(node) = nodes.get_mut(to) {
                node.add_predecessor(*from);
            }
        }

        check_cycles(&nodes)?;

        let sources: Vec<Token> = nodes
            .values()
            .filter(|node| node.predecessors().is_empty())
            .map(BlobNode::id)
            .collect();
        let source = match sources.as_slice() {
            [source] => *source,
            _ => {
                SourceResolutionFailed { sources: &sources }.log();
                return Err(GraphError::AmbiguousOrMissingSource { sources });
            }
        };

        BlobGraphBuilt {
            blob_count: nodes.len(),
            edge_count: edges.len(),
            source,
        }
        .log();

        Ok(Self {
            nodes,
            source,
            edge_count: edges.len(),
        })
    }

    /// Builds the graph from the blobs that will actually run.
    pub fn from_blobs(blobs: &[Arc<dyn Blob>]) -> Result<Self, GraphError> {
        let partitions: Vec<BlobPartition> = blobs
            .iter()
            .map(|blob| BlobPartition::new(blob.inputs().iter().copied(), blob.outputs().iter().copied()))
            .collect();
        Self::new(&partitions)
    }

    /// Ids of all blobs in the graph, in token order.
    pub fn blob_ids(&self) -> BTreeSet<Token> {
        self.nodes.keys().copied().collect()
    }

    pub fn node(&self, blob: Token) -> Result<&BlobNode, GraphError> {
        self.nodes.get(&blob).ok_or(GraphError::UnknownBlob { blob })
    }

    pub fn nodes(&self) -> impl Iterator<Item = &BlobNode> {
        self.nodes.values()
    }

    /// The blob that holds the overall input; draining starts here.
    pub fn source(&self) -> Token {
        self.source
    }

    pub fn inputs(&self, blob: Token) -> Result<&BTreeSet<Token>, GraphError> {
        self.node(blob).map(BlobNode::inputs)
    }

    pub fn outputs(&self, blob: Token) -> Result<&BTreeSet<Token>, GraphError> {
        self.node(blob).map(BlobNode::outputs)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn edge_count(&self) -> usize {
        self.edge_count
    }

    /// Every blob reachable from `blob` through successor links.
    pub fn descendants(&self, blob: Token) -> Result<BTreeSet<Token>, GraphError> {
        let mut reached = BTreeSet::new();
        let mut pending: Vec<Token> = self.node(blob)?.successors().to_vec();
        while let Some(next) = pending.pop() {
            if reached.insert(next) {
                pending.extend_from_slice(self.node(next)?.successors());
            }
        }
        Ok(reached)
    }

    /// Restores every node to its pre-episode state and clears stored drain data.
    pub(crate) fn reset(&self, episode: u64) {
        for node in self.nodes.values() {
            node.reset(episode);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Gray,
    Black,
}

/// Depth-first traversal from every unvisited node; fails on the first back edge.
fn check_cycles(nodes: &BTreeMap<Token, BlobNode>) -> Result<(), GraphError> {
    let mut colors: BTreeMap<Token, Color> = nodes.keys().map(|id| (*id, Color::White)).collect();
    let mut path = Vec::new();

    for id in nodes.keys() {
        if colors.get(id) == Some(&Color::White) {
            if let Some(cycle) = visit(*id, nodes, &mut colors, &mut path) {
                BlobCycleDetected { cycle: &cycle }.log();
                return Err(GraphError::Cyclic { cycle });
            }
        }
    }
    Ok(())
}

/// A back edge (successor still gray) closes a cycle; the returned path runs
/// from the gray successor to `vertex` and back to the successor.
fn visit(
    vertex: Token,
    nodes: &BTreeMap<Token, BlobNode>,
    colors: &mut BTreeMap<Token, Color>,
    path: &mut Vec<Token>,
) -> Option<Vec<Token>> {
    colors.insert(vertex, Color::Gray);
    path.push(vertex);

    let successors = nodes.get(&vertex).map(BlobNode::successors).unwrap_or_default();
    for successor in successors {
        match colors.get(successor).copied().unwrap_or(Color::Black) {
            Color::Gray => {
                let start = path.iter().position(|id| id == successor).unwrap_or(0);
                let mut cycle = path[start..].to_vec();
                cycle.push(*successor);
                return Some(cycle);
            }
            Color::White => {
                if let Some(cycle) = visit(*successor, nodes, colors, path) {
                    return Some(cycle);
                }
            }
            Color::Black => {}
        }
    }

    colors.insert(vertex, Color::Black);
    path.pop();
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn partition(inputs: &[Token], outputs: &[Token]) -> BlobPartition {
        BlobPartition::new(inputs.iter().copied(), outputs.iter().copied())
    }

    #[test]
    fn test_linear_chain() {
        let (t1, t2) = (Token::new(0, 1), Token::new(1, 2));
        let graph = BlobGraph::new(&[
            partition(&[t2], &[Token::overall_output(2)]),
            partition(&[Token::overall_input(0)], &[t1]),
            partition(&[t1], &[t2]),
        ])
        .unwrap();

        assert_eq!(graph.source(), Token::overall_input(0));
        assert_eq!(graph.edge_count(), 2);
        assert_eq!(graph.node(t1).unwrap().predecessors(), &[Token::overall_input(0)]);
        assert_eq!(graph.node(t1).unwrap().successors(), &[t2]);
        assert_eq!(graph.node(t2).unwrap().dependency_count(), 1);
        assert_eq!(
            graph.descendants(Token::overall_input(0)).unwrap(),
            BTreeSet::from([t1, t2])
        );
    }

    #[test]
    fn test_diamond_join_counts_both_predecessors() {
        let input = Token::overall_input(0);
        let (left, right) = (Token::new(0, 1), Token::new(0, 2));
        let (left_out, right_out) = (Token::new(1, 3), Token::new(2, 3));
        let graph = BlobGraph::new(&[
            partition(&[input], &[left, right]),
            partition(&[left], &[left_out]),
            partition(&[right], &[right_out]),
            partition(&[left_out, right_out], &[Token::overall_output(3)]),
        ])
        .unwrap();

        let join = graph.node(left_out).unwrap();
        assert_eq!(join.dependency_count(), 2);
        assert_eq!(graph.node(input).unwrap().successors().len(), 2);
        assert_eq!(graph.descendants(input).unwrap().len(), 3);
    }

    #[test]
    fn test_multiple_tokens_between_same_blobs_make_one_edge() {
        let input = Token::overall_input(0);
        let (a, b) = (Token::new(0, 1), Token::new(0, 2));
        let graph = BlobGraph::new(&[partition(&[input], &[a, b]), partition(&[a, b], &[])]).unwrap();

        assert_eq!(graph.edge_count(), 1);
        assert_eq!(graph.node(a).unwrap().dependency_count(), 1);
    }

    #[test]
    fn test_cycle_is_rejected() {
        let input = Token::overall_input(0);
        let (t1, t2, back) = (Token::new(0, 1), Token::new(1, 2), Token::new(2, 1));
        let result = BlobGraph::new(&[
            partition(&[input], &[t1]),
            partition(&[t1, back], &[t2]),
            partition(&[t2], &[back]),
        ]);

        match result {
            Err(GraphError::Cyclic { cycle }) => {
                assert_eq!(cycle.first(), cycle.last());
                assert_eq!(cycle.len(), 3);
            }
            other => panic!("expected cycle error, got {:?}", other),
        }
    }

    #[test]
    fn test_two_sources_are_rejected() {
        let result = BlobGraph::new(&[
            partition(&[Token::overall_input(0)], &[]),
            partition(&[Token::new(5, 6)], &[]),
        ]);

        assert!(matches!(
            result,
            Err(GraphError::AmbiguousOrMissingSource { sources }) if sources.len() == 2
        ));
    }

    #[test]
    fn test_partition_without_inputs_is_rejected() {
        let result = BlobGraph::new(&[
            partition(&[Token::overall_input(0)], &[]),
            partition(&[], &[Token::new(1, 2)]),
        ]);
        assert!(matches!(result, Err(GraphError::BlobWithoutInputs { index: 1 })));
    }

    #[test]
    fn test_duplicate_blob_id_is_rejected() {
        let input = Token::overall_input(0);
        let result = BlobGraph::new(&[partition(&[input], &[]), partition(&[input], &[])]);
        assert!(matches!(result, Err(GraphError::DuplicateBlob { .. })));
    }

    #[test]
    fn test_unknown_blob_lookup() {
        let graph = BlobGraph::new(&[partition(&[Token::overall_input(0)], &[])]).unwrap();
        assert!(matches!(
            graph.inputs(Token::new(8, 9)),
            Err(GraphError::UnknownBlob { .. })
        ));
    }
}
