// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Timer thread for deadlock mitigation.
//!
//! A blob's completion depends on its execution reaching a quiescent point.
//! A stalled blob would block drain propagation for the whole DAG, so every
//! drain request arms a one-shot timer. When it fires before the blob
//! completes, the drainer treats the blob as drained and moves on.
//!
//! Timers run as tasks on a current-thread tokio runtime owned by a dedicated
//! thread. Each task races its delay against the episode's cancellation
//! token, which the drainer cancels when the episode completes.

use crate::errors::DrainError;
use std::time::Duration;
use tokio::runtime::{Builder, Handle};
use tokio_util::sync::CancellationToken;

const TIMER_THREAD_NAME: &str = "drain-deadlock-timer";

#[derive(Debug)]
pub(crate) struct DeadlockWatchdog {
    handle: Handle,
    shutdown: CancellationToken,
    timeout: Duration,
}

impl DeadlockWatchdog {
    pub(crate) fn spawn(timeout: Duration) -> Result<Self, DrainError> {
        let runtime = Builder::new_current_thread()
            .enable_time()
            .build()
            .map_err(|source| DrainError::TimerUnavailable { source })?;
        let handle = runtime.handle().clone();
        let shutdown = CancellationToken::new();

        let stop = shutdown.clone();
        std::thread::Builder::new()
            .name(TIMER_THREAD_NAME.to_string())
            .spawn(move || runtime.block_on(stop.cancelled()))
            .map_err(|source| DrainError::TimerUnavailable { source })?;

        Ok(Self {
            handle,
            shutdown,
            timeout,
        })
    }

    /// Token for one episode's timers; cancelling it disarms all of them.
    pub(crate) fn episode_token(&self) -> CancellationToken {
        self.shutdown.child_token()
    }

    /// Runs `on_expired` on the timer thread after the timeout unless
    /// `episode` is cancelled first.
    pub(crate) fn arm<F>(&self, episode: &CancellationToken, on_expired: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let cancelled = episode.clone();
        let delay = self.timeout;
        self.handle.spawn(async move {
            tokio::select! {
                _ = cancelled.cancelled() => {}
                _ = tokio::time::sleep(delay) => on_expired(),
            }
        });
    }
}

impl Drop for DeadlockWatchdog {
    fn drop(&mut self) {
        // Never join here: the last drainer reference may be dropped on the timer thread itself.
        self.shutdown.cancel();
    }
}
