// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Per-blob drain state machine.
//!
//! A [`BlobNode`] is the vertex of the [`BlobGraph`](crate::engine::BlobGraph)
//! for one blob. Its topology is fixed once the graph is built; during an
//! episode only the dependency counter, the drain state and the drain data
//! slot change, and each state transition is a single compare-and-swap so
//! that exactly one thread wins it.
//!
//! ```text
//!   Idle ──drain──▶ Requested ──complete──────────────▶ Completed ──data──▶ DataCollected
//!                       │                                   ▲
//!                       └──deadlock timeout──▶ DeadlockForced ┘ (late completion)
//! ```
//!
//! The state word also carries the number of the episode the node was last
//! reset for, and every transition compares both halves. A report that
//! belongs to an earlier episode therefore fails its compare-and-swap even if
//! it raced with the reset for a newer one.
//!
//! The node only decides who won a transition. Notifying successors and the
//! drainer is done by the caller that won it.

use crate::blob::{BlobDrainData, BlobPartition, Token};
use crate::errors::DrainError;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

const STATE_BITS: u32 = 8;
const STATE_MASK: u64 = (1 << STATE_BITS) - 1;

/// Drain state of one blob within the current episode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum NodeDrainState {
    /// No drain call yet.
    Idle = 0,
    /// Drain requested, waiting for the blob to report completion.
    Requested = 1,
    /// Deadlock timeout fired and the blob was treated as drained.
    DeadlockForced = 2,
    /// The blob reported completion.
    Completed = 3,
    /// Drain data of the blob has been received.
    DataCollected = 4,
}

impl NodeDrainState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => NodeDrainState::Requested,
            2 => NodeDrainState::DeadlockForced,
            3 => NodeDrainState::Completed,
            4 => NodeDrainState::DataCollected,
            _ => NodeDrainState::Idle,
        }
    }
}

impl fmt::Display for NodeDrainState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let description = match self {
            NodeDrainState::Idle => "no drain call",
            NodeDrainState::Requested => "drain requested",
            NodeDrainState::DeadlockForced => "deadlock detected, artificially drained",
            NodeDrainState::Completed => "drain completed",
            NodeDrainState::DataCollected => "drain data received",
        };
        f.write_str(description)
    }
}

fn pack(episode: u64, state: NodeDrainState) -> u64 {
    (episode << STATE_BITS) | state as u64
}

fn unpack(word: u64) -> (u64, NodeDrainState) {
    (word >> STATE_BITS, NodeDrainState::from_u8((word & STATE_MASK) as u8))
}

/// Outcome of a completion report from the blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Completion {
    /// `Requested -> Completed`: the caller must notify successors and the drainer.
    Completed,
    /// `DeadlockForced -> Completed`: everyone was notified when the node was forced.
    AfterDeadlock,
    /// The report belongs to an episode the node has already been reset from.
    Stale,
    /// The node was in neither state.
    Rejected(NodeDrainState),
}

/// Vertex of the blob graph.
#[derive(Debug)]
pub struct BlobNode {
    id: Token,
    inputs: BTreeSet<Token>,
    outputs: BTreeSet<Token>,
    predecessors: Vec<Token>,
    successors: Vec<Token>,
    /// Predecessors that have not drained yet in this episode.
    dependency_count: AtomicUsize,
    /// Episode number and [`NodeDrainState`], packed into one word.
    drain_state: AtomicU64,
    drain_data: Mutex<Option<BlobDrainData>>,
}

impl BlobNode {
    pub(crate) fn new(id: Token, partition: &BlobPartition) -> Self {
        Self {
            id,
            inputs: partition.inputs().clone(),
            outputs: partition.outputs().clone(),
            predecessors: Vec::new(),
            successors: Vec::new(),
            dependency_count: AtomicUsize::new(0),
            drain_state: AtomicU64::new(pack(0, NodeDrainState::Idle)),
            drain_data: Mutex::new(None),
        }
    }

    pub(crate) fn add_predecessor(&mut self, predecessor: Token) {
        debug_assert!(
            !self.predecessors.contains(&predecessor),
            "{} has already been set as a predecessor of {}",
            predecessor,
            self.id
        );
        self.predecessors.push(predecessor);
        *self.dependency_count.get_mut() += 1;
    }

    pub(crate) fn add_successor(&mut self, successor: Token) {
        debug_assert!(
            !self.successors.contains(&successor),
            "{} has already been set as a successor of {}",
            successor,
            self.id
        );
        self.successors.push(successor);
    }

    pub fn id(&self) -> Token {
        self.id
    }

    pub fn inputs(&self) -> &BTreeSet<Token> {
        &self.inputs
    }

    pub fn outputs(&self) -> &BTreeSet<Token> {
        &self.outputs
    }

    pub fn predecessors(&self) -> &[Token] {
        &self.predecessors
    }

    pub fn successors(&self) -> &[Token] {
        &self.successors
    }

    /// Number of predecessors that have not drained yet.
    pub fn dependency_count(&self) -> usize {
        self.dependency_count.load(Ordering::Acquire)
    }

    pub fn drain_state(&self) -> NodeDrainState {
        self.load().1
    }

    /// Episode the node was last reset for; 0 before the first one.
    pub fn episode(&self) -> u64 {
        self.load().0
    }

    /// Drain data received for this blob in the current episode.
    pub fn drain_data(&self) -> Option<BlobDrainData> {
        self.slot().clone()
    }

    pub fn has_drain_data(&self) -> bool {
        self.slot().is_some()
    }

    /// `Idle -> Requested`. Fails if drain was already requested this episode.
    pub(crate) fn request_drain(&self, episode: u64) -> Result<(), DrainError> {
        self.transition(episode, NodeDrainState::Idle, NodeDrainState::Requested)
            .then_some(())
            .ok_or(DrainError::DoubleDrain { blob: self.id })
    }

    /// Records that the blob reported completion for `episode`.
    pub(crate) fn complete(&self, episode: u64) -> Completion {
        if self.transition(episode, NodeDrainState::Requested, NodeDrainState::Completed) {
            return Completion::Completed;
        }
        if self.transition(episode, NodeDrainState::DeadlockForced, NodeDrainState::Completed) {
            return Completion::AfterDeadlock;
        }
        match self.load() {
            (current, _) if current != episode => Completion::Stale,
            (_, state) => Completion::Rejected(state),
        }
    }

    /// `Requested -> DeadlockForced`. Returns false if the blob already
    /// completed or the node moved on to another episode.
    pub(crate) fn force_complete(&self, episode: u64) -> bool {
        self.transition(episode, NodeDrainState::Requested, NodeDrainState::DeadlockForced)
    }

    /// Counts down one drained predecessor. Returns true when the last one drained.
    pub(crate) fn predecessor_completed(&self, predecessor: Token) -> Result<bool, DrainError> {
        if !self.predecessors.contains(&predecessor) {
            return Err(DrainError::IllegalPredecessor {
                blob: self.id,
                predecessor,
            });
        }

        let previous = self
            .dependency_count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| {
                count.checked_sub(1)
            })
            .map_err(|_| DrainError::DependencyUnderflow {
                blob: self.id,
                predecessor,
            })?;

        Ok(previous == 1)
    }

    /// `Completed -> DataCollected`, storing the data.
    ///
    /// Returns `Ok(false)` and drops the data when the node has been reset
    /// for a newer episode.
    pub(crate) fn set_drain_data(&self, episode: u64, data: BlobDrainData) -> Result<bool, DrainError> {
        let mut slot = self.slot();
        if self.transition(episode, NodeDrainState::Completed, NodeDrainState::DataCollected) {
            *slot = Some(data);
            return Ok(true);
        }
        match self.load() {
            (current, _) if current != episode => Ok(false),
            (_, NodeDrainState::DataCollected) => {
                Err(DrainError::DuplicateDrainData { blob: self.id })
            }
            (_, state) => Err(DrainError::DrainDataBeforeCompletion {
                blob: self.id,
                state,
            }),
        }
    }

    /// Prepares the node for `episode`, dropping drain data of the previous one.
    pub(crate) fn reset(&self, episode: u64) {
        let mut slot = self.slot();
        slot.take();
        self.dependency_count
            .store(self.predecessors.len(), Ordering::Release);
        self.drain_state
            .store(pack(episode, NodeDrainState::Idle), Ordering::Release);
    }

    fn load(&self) -> (u64, NodeDrainState) {
        unpack(self.drain_state.load(Ordering::Acquire))
    }

    fn transition(&self, episode: u64, from: NodeDrainState, to: NodeDrainState) -> bool {
        self.drain_state
            .compare_exchange(
                pack(episode, from),
                pack(episode, to),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    fn slot(&self) -> MutexGuard<'_, Option<BlobDrainData>> {
        self.drain_data.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
