// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Countdown barriers backing the drainer's waiter API.

use tokio::sync::watch;

/// One-shot barrier that stays released forever.
#[derive(Debug)]
pub(crate) struct Latch {
    tx: watch::Sender<bool>,
}

impl Latch {
    pub(crate) fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    pub(crate) fn release(&self) {
        self.tx.send_replace(true);
    }

    pub(crate) fn is_released(&self) -> bool {
        *self.tx.borrow()
    }

    pub(crate) async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so the channel cannot close while we wait.
        let _ = rx.wait_for(|released| *released).await;
    }
}

/// Barrier that is re-armed for every episode.
///
/// Holds the number of the last released episode; waiting for episode `n`
/// returns once episode `n` or a later one has been released. A fresh episode
/// therefore gets a closed barrier without allocating a new one.
#[derive(Debug)]
pub(crate) struct EpochBarrier {
    tx: watch::Sender<u64>,
}

impl EpochBarrier {
    pub(crate) fn new() -> Self {
        let (tx, _rx) = watch::channel(0);
        Self { tx }
    }

    pub(crate) fn release(&self, episode: u64) {
        self.tx.send_if_modified(|released| {
            if *released < episode {
                *released = episode;
                true
            } else {
                false
            }
        });
    }

    pub(crate) fn is_released(&self, episode: u64) -> bool {
        *self.tx.borrow() >= episode
    }

    pub(crate) async fn wait(&self, episode: u64) {
        let mut rx = self.tx.subscribe();
        let _ = rx.wait_for(|released| *released >= episode).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_latch_releases_waiters_and_stays_open() {
        let latch = Arc::new(Latch::new());
        assert!(!latch.is_released());

        let waiter = {
            let latch = Arc::clone(&latch);
            tokio::spawn(async move { latch.wait().await })
        };
        latch.release();

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter was not released")
            .unwrap();
        assert!(latch.is_released());
        latch.wait().await;
    }

    #[tokio::test]
    async fn test_epoch_barrier_is_closed_for_next_episode() {
        let barrier = EpochBarrier::new();
        assert!(barrier.is_released(0));
        assert!(!barrier.is_released(1));

        barrier.release(1);
        barrier.wait(1).await;
        assert!(!barrier.is_released(2));

        let pending = tokio::time::timeout(Duration::from_millis(50), barrier.wait(2)).await;
        assert!(pending.is_err());
    }

    #[tokio::test]
    async fn test_epoch_barrier_never_moves_backwards() {
        let barrier = EpochBarrier::new();
        barrier.release(3);
        barrier.release(2);
        assert!(barrier.is_released(3));
    }
}
