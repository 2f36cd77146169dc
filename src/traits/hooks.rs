// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::blob::Token;

/// Extension points of the drainer for the surrounding runtime.
///
/// Every method has a no-op default, so runtimes only implement what they need
/// (stopping blob threads once a blob drained, flushing the tail buffer before
/// waiters are released, ...).
pub trait DrainerHooks: Send + Sync {
    /// Runs once at the start of an episode, before the source blob is asked
    /// to drain. An error aborts the episode and leaves the drainer idle.
    ///
    /// `is_final` is false for semi-final draining.
    fn prepare_draining(&self, _is_final: bool) -> anyhow::Result<()> {
        Ok(())
    }

    /// Runs once per blob as it completes, before the aggregate check.
    ///
    /// `is_final` is true for final and semi-final draining.
    fn drain_notify(&self, _blob: Token, _is_final: bool) {}

    /// Runs once when every blob has drained, before waiters are released.
    ///
    /// `is_final` is true for final and semi-final draining.
    fn episode_complete(&self, _is_final: bool) {}
}

/// Hooks that do nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHooks;

impl DrainerHooks for NoopHooks {}
