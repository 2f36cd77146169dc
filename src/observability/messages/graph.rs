// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for blob graph construction.
//!
//! This module contains message types for logging events related to:
//! * Successful graph construction
//! * Cycle detection among blobs
//! * Source blob resolution

use crate::blob::Token;
use crate::errors::join_tokens;
use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};
use tracing::Span;

/// Blob graph built and verified.
///
/// # Log Level
/// `info!` - Important operational event
///
/// # Example
/// ```
/// use stream_drainer::blob::Token;
/// use stream_drainer::observability::messages::graph::BlobGraphBuilt;
///
/// let msg = BlobGraphBuilt {
///     blob_count: 3,
///     edge_count: 2,
///     source: Token::overall_input(0),
/// };
///
/// tracing::info!("{}", msg);
/// ```
pub struct BlobGraphBuilt {
    pub blob_count: usize,
    pub edge_count: usize,
    pub source: Token,
}

impl Display for BlobGraphBuilt {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Built blob graph: {} blobs, {} edges, source blob {}",
            self.blob_count, self.edge_count, self.source
        )
    }
}

impl StructuredLog for BlobGraphBuilt {
    fn log(&self) {
        tracing::info!(
            blob_count = self.blob_count,
            edge_count = self.edge_count,
            source = %self.source,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "blob_graph",
            span_name = name,
            blob_count = self.blob_count,
            edge_count = self.edge_count,
            source = %self.source,
        )
    }
}

/// Cycle found among blobs.
///
/// # Log Level
/// `error!` - Failure requiring attention
pub struct BlobCycleDetected<'a> {
    pub cycle: &'a [Token],
}

impl Display for BlobCycleDetected<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Cycles found among blobs: {}", join_tokens(self.cycle, " -> "))
    }
}

impl StructuredLog for BlobCycleDetected<'_> {
    fn log(&self) {
        tracing::error!(
            cycle = join_tokens(self.cycle, " -> "),
            cycle_length = self.cycle.len(),
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::error_span!(
            "blob_cycle",
            span_name = name,
            cycle = join_tokens(self.cycle, " -> "),
            cycle_length = self.cycle.len(),
        )
    }
}

/// Zero or several blobs without predecessors.
///
/// # Log Level
/// `error!` - Failure requiring attention
pub struct SourceResolutionFailed<'a> {
    pub sources: &'a [Token],
}

impl Display for SourceResolutionFailed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        if self.sources.is_empty() {
            write!(f, "No source blob found: every blob has a predecessor")
        } else {
            write!(
                f,
                "Multiple independent blobs found: {}",
                join_tokens(self.sources, ", ")
            )
        }
    }
}

impl StructuredLog for SourceResolutionFailed<'_> {
    fn log(&self) {
        tracing::error!(
            sources = join_tokens(self.sources, ", "),
            source_count = self.sources.len(),
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::error_span!(
            "source_resolution",
            span_name = name,
            source_count = self.sources.len(),
        )
    }
}
