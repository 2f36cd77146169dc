// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Errors raised by the draining protocol.
//!
//! Apart from [`DrainError::TimerUnavailable`] every variant is a protocol
//! misuse: it means the caller, the blob executor or the graph is broken and
//! the running pipeline can no longer be drained correctly.

use crate::blob::{Token, WorkerId};
use crate::engine::{DrainerState, NodeDrainState};
use crate::errors::{join_tokens, GraphError};

#[derive(Debug, thiserror::Error)]
pub enum DrainError {
    #[error("drain of blob {blob} has already been requested in this episode")]
    DoubleDrain { blob: Token },

    #[error("multiple drain data received for blob {blob}")]
    DuplicateDrainData { blob: Token },

    #[error("graph mismatch: blob {blob} has no undrained predecessors left but {predecessor} reported completion")]
    DependencyUnderflow { blob: Token, predecessor: Token },

    #[error("blob {predecessor} is not a predecessor of blob {blob}")]
    IllegalPredecessor { blob: Token, predecessor: Token },

    #[error("drainer is already in {state} mode")]
    EpisodeInProgress { state: DrainerState },

    #[error("blob {blob} reported drain progress while no draining episode is running")]
    NotDraining { blob: Token },

    #[error("stop() is illegal during intermediate draining")]
    StopDuringIntermediate,

    #[error("invalid draining type {value}: expected 0, 1 or 2")]
    InvalidDrainType { value: u8 },

    #[error("bad merge: state of worker {worker} is split across drain data")]
    StateConflict { worker: WorkerId },

    #[error("token {token} carries internal drain data from both blob {first} and blob {second}")]
    DuplicateTokenData { token: Token, first: Token, second: Token },

    #[error("drain data of blob {blob} arrived while the blob was in state {state}")]
    DrainDataBeforeCompletion { blob: Token, state: NodeDrainState },

    #[error("drain data pushed for blob {blob}, but this drainer does not accept pushed drain data")]
    UnexpectedDrainData { blob: Token },

    #[error("drain data of blob {blob} has not been received")]
    MissingDrainData { blob: Token },

    #[error("blob {blob} reported completion while in state {state}")]
    UnexpectedCompletion { blob: Token, state: NodeDrainState },

    #[error("prepare_draining failed, no drain was requested: {reason}")]
    PrepareFailed { reason: String },

    #[error("blobs do not match the blob graph: missing [{}], unexpected [{}]", join_tokens(.missing, ", "), join_tokens(.unexpected, ", "))]
    BlobSetMismatch { missing: Vec<Token>, unexpected: Vec<Token> },

    #[error("failed to start the deadlock timer thread")]
    TimerUnavailable {
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Graph(#[from] GraphError),
}
