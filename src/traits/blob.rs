// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::blob::{BlobDrainData, Token};
use crate::engine::{DrainCallback, DrainKind};
use std::collections::BTreeSet;

/// An independently scheduled execution unit running part of the stream graph.
///
/// The draining core never executes blobs; it only asks them to quiesce and
/// collects what they left behind.
pub trait Blob: Send + Sync {
    /// Boundary tokens this blob consumes.
    fn inputs(&self) -> &BTreeSet<Token>;

    /// Boundary tokens this blob produces.
    fn outputs(&self) -> &BTreeSet<Token>;

    /// The blob id: its smallest input token.
    fn id(&self) -> Option<Token> {
        self.inputs().iter().next().copied()
    }

    /// Begins quiescing the blob without blocking.
    ///
    /// Implementations must eventually call [`DrainCallback::complete`]
    /// exactly once, from any thread, once the blob has stopped producing
    /// and consuming data for this episode.
    fn drain(&self, kind: DrainKind, on_complete: DrainCallback);

    /// Buffered items and worker state left in the blob. Only valid after the
    /// drain callback has fired.
    fn drain_data(&self) -> BlobDrainData;
}
