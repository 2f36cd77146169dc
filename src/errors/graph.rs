// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Structural errors raised while building the blob graph.
//!
//! All of these abort pipeline construction; none of them is retried and none
//! can occur once a [`BlobGraph`](crate::engine::BlobGraph) exists.

use crate::blob::Token;
use crate::errors::join_tokens;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GraphError {
    /// The token-overlap relation between blobs contains a cycle.
    #[error("cycles found among blobs: {}", join_tokens(.cycle, " -> "))]
    Cyclic {
        /// Blob ids along the cycle, first id repeated at the end.
        cycle: Vec<Token>,
    },

    /// Zero or more than one blob has no predecessors.
    #[error("expected exactly one source blob, found {}: [{}]", .sources.len(), join_tokens(.sources, ", "))]
    AmbiguousOrMissingSource { sources: Vec<Token> },

    /// Two partitions resolved to the same blob id.
    #[error("blob id {blob} is claimed by more than one partition")]
    DuplicateBlob { blob: Token },

    /// A partition has no input tokens, so no blob id can be derived for it.
    #[error("partition #{index} has no input tokens")]
    BlobWithoutInputs { index: usize },

    #[error("no blob with id {blob} in the blob graph")]
    UnknownBlob { blob: Token },
}
