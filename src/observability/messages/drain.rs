// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for draining episodes.
//!
//! This module contains message types for logging events related to:
//! * Episode lifecycle (start, rejection, completion, stop)
//! * Per-blob drain requests and completions
//! * Deadlock mitigation
//! * Drain data collection

use crate::blob::Token;
use crate::engine::{DrainKind, DrainMode, DrainerState};
use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};
use std::time::Duration;
use tracing::Span;

/// Draining episode started.
///
/// # Log Level
/// `info!` - Important operational event
///
/// # Example
/// ```
/// use stream_drainer::engine::DrainMode;
/// use stream_drainer::observability::messages::drain::DrainingStarted;
///
/// let msg = DrainingStarted {
///     mode: DrainMode::Intermediate,
///     episode: 1,
///     blob_count: 3,
/// };
///
/// tracing::info!("{}", msg);
/// ```
pub struct DrainingStarted {
    pub mode: DrainMode,
    pub episode: u64,
    pub blob_count: usize,
}

impl Display for DrainingStarted {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Starting {} draining (episode {}) over {} blobs",
            self.mode, self.episode, self.blob_count
        )
    }
}

impl StructuredLog for DrainingStarted {
    fn log(&self) {
        tracing::info!(
            mode = %self.mode,
            episode = self.episode,
            blob_count = self.blob_count,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "draining",
            span_name = name,
            mode = %self.mode,
            episode = self.episode,
            blob_count = self.blob_count,
        )
    }
}

/// A draining request was refused because final draining has already been requested.
///
/// # Log Level
/// `info!` - Expected, caller-visible outcome
pub struct DrainingRejected {
    pub mode: DrainMode,
}

impl Display for DrainingRejected {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Final drain has already been called, {} draining rejected",
            self.mode
        )
    }
}

impl StructuredLog for DrainingRejected {
    fn log(&self) {
        tracing::info!(mode = %self.mode, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!("draining_rejected", span_name = name, mode = %self.mode)
    }
}

/// A blob has been asked to drain.
///
/// # Log Level
/// `debug!` - Per-blob detail
pub struct BlobDrainRequested {
    pub blob: Token,
    pub kind: DrainKind,
}

impl Display for BlobDrainRequested {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Requested {} drain of blob {}", self.kind, self.blob)
    }
}

impl StructuredLog for BlobDrainRequested {
    fn log(&self) {
        tracing::debug!(blob = %self.blob, kind = %self.kind, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!(
            "blob_drain",
            span_name = name,
            blob = %self.blob,
            kind = %self.kind,
        )
    }
}

/// A blob finished draining.
///
/// # Log Level
/// `debug!` - Per-blob detail
pub struct BlobDrained {
    pub blob: Token,
    pub remaining: usize,
}

impl Display for BlobDrained {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Blob {} drained, {} blobs still draining",
            self.blob, self.remaining
        )
    }
}

impl StructuredLog for BlobDrained {
    fn log(&self) {
        tracing::debug!(blob = %self.blob, remaining = self.remaining, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!(
            "blob_drained",
            span_name = name,
            blob = %self.blob,
            remaining = self.remaining,
        )
    }
}

/// A blob did not report completion in time and was treated as drained.
///
/// # Log Level
/// `warn!` - Designed mitigation, data of the blob may not be fully flushed
///
/// # Example
/// ```
/// use stream_drainer::blob::Token;
/// use stream_drainer::observability::messages::drain::DeadlockForced;
/// use std::time::Duration;
///
/// let msg = DeadlockForced {
///     blob: Token::new(2, 3),
///     timeout: Duration::from_millis(6000),
/// };
///
/// tracing::warn!("{}", msg);
/// ```
pub struct DeadlockForced {
    pub blob: Token,
    pub timeout: Duration,
}

impl Display for DeadlockForced {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Blob {} did not drain within {:?}, deadlock during draining has been handled",
            self.blob, self.timeout
        )
    }
}

impl StructuredLog for DeadlockForced {
    fn log(&self) {
        tracing::warn!(
            blob = %self.blob,
            timeout_ms = self.timeout.as_millis() as u64,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::warn_span!(
            "deadlock_forced",
            span_name = name,
            blob = %self.blob,
            timeout = ?self.timeout,
        )
    }
}

/// The real completion of a force-completed blob arrived.
///
/// # Log Level
/// `warn!` - Diagnostic for deadlock mitigation
pub struct LateCompletion {
    pub blob: Token,
}

impl Display for LateCompletion {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Blob {} completed draining after it had been force-completed",
            self.blob
        )
    }
}

impl StructuredLog for LateCompletion {
    fn log(&self) {
        tracing::warn!(blob = %self.blob, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::warn_span!("late_completion", span_name = name, blob = %self.blob)
    }
}

/// All blobs of the episode have drained.
///
/// # Log Level
/// `info!` - Important operational event
pub struct DrainingFinished {
    pub state: DrainerState,
    pub episode: u64,
    pub duration: Duration,
}

impl Display for DrainingFinished {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Draining finished in {} mode (episode {}) after {:?}",
            self.state, self.episode, self.duration
        )
    }
}

impl StructuredLog for DrainingFinished {
    fn log(&self) {
        tracing::info!(
            state = %self.state,
            episode = self.episode,
            duration_ms = self.duration.as_millis() as u64,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "draining_finished",
            span_name = name,
            state = %self.state,
            episode = self.episode,
            duration = ?self.duration,
        )
    }
}

/// Drain data of every blob has been received.
///
/// # Log Level
/// `info!` - Important operational event
pub struct DrainDataCollected {
    pub episode: u64,
    pub blob_count: usize,
}

impl Display for DrainDataCollected {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Collected drain data of {} blobs (episode {})",
            self.blob_count, self.episode
        )
    }
}

impl StructuredLog for DrainDataCollected {
    fn log(&self) {
        tracing::info!(
            episode = self.episode,
            blob_count = self.blob_count,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "drain_data_collected",
            span_name = name,
            episode = self.episode,
            blob_count = self.blob_count,
        )
    }
}

/// Forced blobs did not deliver their drain data within the grace period.
///
/// # Log Level
/// `warn!` - Degraded but recoverable
pub struct DrainDataIncomplete {
    pub episode: u64,
    pub missing: usize,
    pub waited: Duration,
}

impl Display for DrainDataIncomplete {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Drain data of {} blobs still missing after {:?} (episode {})",
            self.missing, self.waited, self.episode
        )
    }
}

impl StructuredLog for DrainDataIncomplete {
    fn log(&self) {
        tracing::warn!(
            episode = self.episode,
            missing = self.missing,
            waited = ?self.waited,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::warn_span!(
            "drain_data_incomplete",
            span_name = name,
            episode = self.episode,
            missing = self.missing,
        )
    }
}

/// A drain step failed on a thread that has no caller to report to.
///
/// # Log Level
/// `error!` - Failure requiring attention
pub struct DrainStepFailed<'a> {
    pub blob: Token,
    pub step: &'a str,
    pub error: &'a dyn std::error::Error,
}

impl Display for DrainStepFailed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Drain step '{}' failed for blob {}: {}",
            self.step, self.blob, self.error
        )
    }
}

impl StructuredLog for DrainStepFailed<'_> {
    fn log(&self) {
        tracing::error!(
            blob = %self.blob,
            step = self.step,
            error = %self.error,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::error_span!(
            "drain_step_failed",
            span_name = name,
            blob = %self.blob,
            step = self.step,
            error = %self.error,
        )
    }
}

/// The drainer was stopped and final waiters released.
///
/// # Log Level
/// `info!` - Important operational event
pub struct DrainerStopped {
    pub state: DrainerState,
}

impl Display for DrainerStopped {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Drainer stopped in {} mode", self.state)
    }
}

impl StructuredLog for DrainerStopped {
    fn log(&self) {
        tracing::info!(state = %self.state, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!("drainer_stopped", span_name = name, state = %self.state)
    }
}
