// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Draining orchestrator.
//!
//! The [`Drainer`] owns the [`BlobGraph`] of a running stream graph and
//! sequences draining episodes over it. An episode starts at the source blob;
//! whenever a blob reports completion its successors count down, and a
//! successor whose last predecessor drained is asked to drain in turn. When
//! every blob has completed the drainer runs the episode hooks, releases the
//! waiters and, unless the episode was final, goes back to idle so the
//! pipeline can be resumed with a new configuration.
//!
//! # Episodes
//!
//! | Mode           | State while draining | After completion                      |
//! |----------------|----------------------|---------------------------------------|
//! | `Intermediate` | `Intermediate`       | back to `NoDraining`, drained barrier |
//! | `SemiFinal`    | `Final`              | stays `Final`, final barrier released |
//! | `Final`        | `Final`              | stays `Final`, final barrier released |
//!
//! Final is a one-way commitment: once requested, further
//! [`start_draining`](Drainer::start_draining) calls return `Ok(false)`.
//!
//! # Concurrency
//!
//! Completion callbacks arrive on blob threads and deadlock timers fire on
//! the timer thread. Every shared counter and node state is updated through
//! atomic read-modify-write operations, so exactly one thread wins each
//! transition and no two threads ever notify the successors of the same blob.
//! Callbacks and timers carry the number of the episode that created them and
//! are ignored once a newer episode has started.
//!
//! # Drain data
//!
//! With [`DrainDataDelivery::Pull`] the drainer reads a blob's drain data as
//! soon as the blob reports completion. With [`DrainDataDelivery::Push`] the
//! blob executor delivers it through
//! [`on_drain_data_received`](Drainer::on_drain_data_received), and only after
//! the blob completed. A blob that was forced and never completes never
//! delivers drain data; the episode helpers wait one deadlock timeout for it
//! and then fail with [`DrainError::MissingDrainData`].
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use stream_drainer::backends::stub::StubBlob;
//! use stream_drainer::blob::Token;
//! use stream_drainer::engine::{BlobGraph, DrainMode, Drainer};
//! use stream_drainer::traits::Blob;
//!
//! # tokio_test_block_on(async {
//! let t1 = Token::new(0, 1);
//! let blobs: Vec<Arc<dyn Blob>> = vec![
//!     Arc::new(StubBlob::new([Token::overall_input(0)], [t1])),
//!     Arc::new(StubBlob::new([t1], [Token::overall_output(1)])),
//! ];
//! let graph = BlobGraph::from_blobs(&blobs).unwrap();
//! let drainer = Drainer::builder(graph).blobs(blobs).build().unwrap();
//!
//! assert!(drainer.start_draining(DrainMode::Final).unwrap());
//! drainer.await_final_drained().await;
//! assert!(drainer.is_drained());
//! # });
//! # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(f)
//! # }
//! ```

use crate::blob::{BlobDrainData, DrainData, Token};
use crate::config::{DrainDataDelivery, DrainerOptions};
use crate::engine::blob_graph::BlobGraph;
use crate::engine::blob_node::{BlobNode, Completion, NodeDrainState};
use crate::engine::deadlock::DeadlockWatchdog;
use crate::engine::latch::{EpochBarrier, Latch};
use crate::engine::mode::{DrainKind, DrainMode, DrainerState};
use crate::errors::{DrainError, GraphError};
use crate::observability::messages::drain::{
    BlobDrainRequested, BlobDrained, DeadlockForced, DrainDataCollected, DrainDataIncomplete,
    DrainStepFailed, DrainerStopped, DrainingFinished, DrainingRejected, DrainingStarted,
    LateCompletion,
};
use crate::observability::messages::StructuredLog;
use crate::observability::DrainDataObserver;
use crate::traits::{Blob, DrainerHooks, NoopHooks};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Handed to a blob with its drain request; the blob calls
/// [`complete`](DrainCallback::complete) once it has quiesced.
pub struct DrainCallback {
    drainer: Weak<DrainerInner>,
    blob: Token,
    episode: u64,
}

impl DrainCallback {
    pub fn blob(&self) -> Token {
        self.blob
    }

    /// Reports that the blob has drained.
    ///
    /// Propagates the drain to successors whose last predecessor this was,
    /// and collects the blob's drain data when the drainer is configured to.
    /// Reports from an episode that is no longer current, or from a drainer
    /// that has been dropped, are ignored.
    pub fn complete(self) -> Result<(), DrainError> {
        match self.drainer.upgrade() {
            Some(drainer) => drainer.blob_drained(self.blob, self.episode),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for DrainCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DrainCallback")
            .field("blob", &self.blob)
            .field("episode", &self.episode)
            .finish()
    }
}

/// Builder for [`Drainer`].
pub struct DrainerBuilder {
    graph: BlobGraph,
    blobs: Vec<Arc<dyn Blob>>,
    hooks: Arc<dyn DrainerHooks>,
    observer: Option<Arc<dyn DrainDataObserver>>,
    options: DrainerOptions,
}

impl DrainerBuilder {
    pub fn blob(mut self, blob: Arc<dyn Blob>) -> Self {
        self.blobs.push(blob);
        self
    }

    pub fn blobs<I>(mut self, blobs: I) -> Self
    where
        I: IntoIterator<Item = Arc<dyn Blob>>,
    {
        self.blobs.extend(blobs);
        self
    }

    pub fn hooks(mut self, hooks: Arc<dyn DrainerHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn observer(mut self, observer: Arc<dyn DrainDataObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn options(mut self, options: DrainerOptions) -> Self {
        self.options = options;
        self
    }

    /// Matches blobs to graph nodes and starts the deadlock timer thread when
    /// deadlock mitigation is enabled.
    pub fn build(self) -> Result<Drainer, DrainError> {
        let mut blobs = BTreeMap::new();
        let mut unexpected = Vec::new();
        for (index, blob) in self.blobs.into_iter().enumerate() {
            let id = blob
                .id()
                .ok_or(GraphError::BlobWithoutInputs { index })?;
            if self.graph.node(id).is_err() || blobs.contains_key(&id) {
                unexpected.push(id);
            } else {
                blobs.insert(id, blob);
            }
        }
        let missing: Vec<Token> = self
            .graph
            .blob_ids()
            .into_iter()
            .filter(|id| !blobs.contains_key(id))
            .collect();
        if !missing.is_empty() || !unexpected.is_empty() {
            return Err(DrainError::BlobSetMismatch { missing, unexpected });
        }

        let watchdog = if self.options.deadlock_policy.is_enabled() {
            Some(DeadlockWatchdog::spawn(self.options.deadlock_timeout())?)
        } else {
            None
        };

        Ok(Drainer {
            inner: Arc::new(DrainerInner {
                graph: self.graph,
                blobs,
                hooks: self.hooks,
                observer: self.observer,
                options: self.options,
                state: AtomicU8::new(DrainerState::NoDraining as u8),
                episode: AtomicU64::new(0),
                undrained_blobs: AtomicUsize::new(0),
                pending_drain_data: AtomicUsize::new(0),
                forced_blobs: AtomicUsize::new(0),
                started_at: Mutex::new(Instant::now()),
                episode_token: Mutex::new(CancellationToken::new()),
                drained: EpochBarrier::new(),
                drain_data_collected: EpochBarrier::new(),
                final_drained: Latch::new(),
                watchdog,
            }),
        })
    }
}

/// Performs draining on a running stream graph.
///
/// Cheap to clone; all clones drive the same drainer.
#[derive(Clone)]
pub struct Drainer {
    inner: Arc<DrainerInner>,
}

impl fmt::Debug for Drainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Drainer")
            .field("state", &self.state())
            .field("episode", &self.episode())
            .field("blob_count", &self.inner.graph.len())
            .finish()
    }
}

impl Drainer {
    pub fn builder(graph: BlobGraph) -> DrainerBuilder {
        DrainerBuilder {
            graph,
            blobs: Vec::new(),
            hooks: Arc::new(NoopHooks),
            observer: None,
            options: DrainerOptions::default(),
        }
    }

    /// Starts a draining episode.
    ///
    /// Returns `Ok(false)` when final draining has already been requested.
    /// Fails with [`DrainError::EpisodeInProgress`] while an intermediate
    /// episode is still running and with [`DrainError::PrepareFailed`] when
    /// the `prepare_draining` hook fails, in which case the drainer stays idle.
    pub fn start_draining(&self, mode: DrainMode) -> Result<bool, DrainError> {
        self.inner.start_draining(mode)
    }

    /// [`start_draining`](Drainer::start_draining) with the numeric draining
    /// type: 0 intermediate, 1 semi-final, 2 final.
    pub fn start_draining_type(&self, drain_type: u8) -> Result<bool, DrainError> {
        self.start_draining(DrainMode::try_from(drain_type)?)
    }

    /// Runs an intermediate episode to the end and returns the aggregated
    /// drain data, or `None` when final draining has already been requested.
    ///
    /// Waits for the drain data of every blob. When blobs were forced in this
    /// episode the wait is bounded by the deadlock timeout, after which the
    /// call fails with [`DrainError::MissingDrainData`] for a blob whose data
    /// never arrived.
    pub async fn drain_intermediate(&self) -> Result<Option<DrainData>, DrainError> {
        if !self.start_draining(DrainMode::Intermediate)? {
            return Ok(None);
        }
        self.finish_episode().await.map(Some)
    }

    /// Runs a final (or semi-final) episode to the end, releases the final
    /// waiters and returns the aggregated drain data.
    pub async fn drain_final(&self, semi_final: bool) -> Result<Option<DrainData>, DrainError> {
        let mode = if semi_final {
            DrainMode::SemiFinal
        } else {
            DrainMode::Final
        };
        if !self.start_draining(mode)? {
            return Ok(None);
        }
        let data = self.finish_episode().await?;
        self.stop()?;
        Ok(Some(data))
    }

    async fn finish_episode(&self) -> Result<DrainData, DrainError> {
        self.await_intermediate_drained().await;
        if !self.inner.options.collect_drain_data {
            return Ok(DrainData::default());
        }
        if self.inner.forced_blobs.load(Ordering::Acquire) == 0 {
            self.await_drain_data().await;
        } else {
            let grace = self.inner.options.deadlock_timeout();
            if !self.await_drain_data_timeout(grace).await {
                DrainDataIncomplete {
                    episode: self.episode(),
                    missing: self.inner.pending_drain_data.load(Ordering::Acquire),
                    waited: grace,
                }
                .log();
            }
        }
        self.collect_aggregate_drain_data()
    }

    /// Delivers drain data pushed by a blob executor.
    ///
    /// Only accepted with [`DrainDataDelivery::Push`] while drain data is
    /// collected, and only once the blob has reported completion in the
    /// current episode.
    pub fn on_drain_data_received(&self, blob: Token, data: BlobDrainData) -> Result<(), DrainError> {
        let options = &self.inner.options;
        if !options.collect_drain_data || options.drain_data_delivery != DrainDataDelivery::Push {
            return Err(DrainError::UnexpectedDrainData { blob });
        }
        let episode = self.episode();
        self.inner.drain_data_received(blob, data, episode)
    }

    /// Merges the drain data of every blob into one snapshot keyed by token.
    pub fn collect_aggregate_drain_data(&self) -> Result<DrainData, DrainError> {
        self.inner.collect_aggregate_drain_data()
    }

    /// Waits until final draining completed or [`stop`](Drainer::stop) was called.
    pub async fn await_final_drained(&self) {
        self.inner.final_drained.wait().await
    }

    /// Like [`await_final_drained`](Drainer::await_final_drained) but gives up
    /// after `timeout`. Returns true if the drainer is drained.
    pub async fn await_final_drained_timeout(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.await_final_drained())
            .await
            .is_ok()
    }

    /// Waits until every blob of the current episode has drained.
    pub async fn await_intermediate_drained(&self) {
        self.inner.drained.wait(self.episode()).await
    }

    /// Waits until the drain data of every blob of the current episode arrived.
    pub async fn await_drain_data(&self) {
        self.inner.drain_data_collected.wait(self.episode()).await
    }

    /// Like [`await_drain_data`](Drainer::await_drain_data) but gives up after
    /// `timeout`. Returns true if all drain data arrived.
    pub async fn await_drain_data_timeout(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.await_drain_data())
            .await
            .is_ok()
    }

    /// True once every blob of the current episode has drained.
    pub fn is_episode_drained(&self) -> bool {
        self.inner.drained.is_released(self.episode())
    }

    /// True once final draining completed or the drainer was stopped.
    pub fn is_drained(&self) -> bool {
        self.inner.final_drained.is_released()
    }

    /// Releases final waiters, e.g. after an unrecoverable execution error.
    ///
    /// Illegal while an intermediate episode is running.
    pub fn stop(&self) -> Result<(), DrainError> {
        self.inner.stop()
    }

    pub fn state(&self) -> DrainerState {
        self.inner.state()
    }

    /// Number of the current (or last) episode; 0 before the first one.
    pub fn episode(&self) -> u64 {
        self.inner.episode.load(Ordering::Acquire)
    }

    pub fn graph(&self) -> &BlobGraph {
        &self.inner.graph
    }

    pub fn options(&self) -> &DrainerOptions {
        &self.inner.options
    }

    /// Drain state of every blob, for diagnosing an episode that does not finish.
    pub fn node_states(&self) -> BTreeMap<Token, NodeDrainState> {
        self.inner
            .graph
            .nodes()
            .map(|node| (node.id(), node.drain_state()))
            .collect()
    }
}

struct DrainerInner {
    graph: BlobGraph,
    blobs: BTreeMap<Token, Arc<dyn Blob>>,
    hooks: Arc<dyn DrainerHooks>,
    observer: Option<Arc<dyn DrainDataObserver>>,
    options: DrainerOptions,
    state: AtomicU8,
    episode: AtomicU64,
    undrained_blobs: AtomicUsize,
    pending_drain_data: AtomicUsize,
    /// Blobs force-completed by the deadlock timer in this episode.
    forced_blobs: AtomicUsize,
    started_at: Mutex<Instant>,
    /// Cancels the deadlock timers of the running episode.
    episode_token: Mutex<CancellationToken>,
    drained: EpochBarrier,
    drain_data_collected: EpochBarrier,
    final_drained: Latch,
    watchdog: Option<DeadlockWatchdog>,
}

impl DrainerInner {
    fn state(&self) -> DrainerState {
        DrainerState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn current_episode(&self) -> u64 {
        self.episode.load(Ordering::Acquire)
    }

    fn start_draining(self: &Arc<Self>, mode: DrainMode) -> Result<bool, DrainError> {
        let target = mode.drainer_state();
        if let Err(current) = self.state.compare_exchange(
            DrainerState::NoDraining as u8,
            target as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            return match DrainerState::from_u8(current) {
                DrainerState::Final => {
                    DrainingRejected { mode }.log();
                    Ok(false)
                }
                state => Err(DrainError::EpisodeInProgress { state }),
            };
        }

        if let Err(error) = self.hooks.prepare_draining(mode.is_final()) {
            self.state
                .store(DrainerState::NoDraining as u8, Ordering::Release);
            return Err(DrainError::PrepareFailed {
                reason: format!("{:#}", error),
            });
        }

        let episode = self.episode.fetch_add(1, Ordering::AcqRel) + 1;
        self.graph.reset(episode);
        let blob_count = self.graph.len();
        self.undrained_blobs.store(blob_count, Ordering::Release);
        let expected_data = if self.options.collect_drain_data {
            blob_count
        } else {
            0
        };
        self.pending_drain_data
            .store(expected_data, Ordering::Release);
        self.forced_blobs.store(0, Ordering::Release);
        *lock(&self.started_at) = Instant::now();
        if let Some(watchdog) = &self.watchdog {
            *lock(&self.episode_token) = watchdog.episode_token();
        }

        DrainingStarted {
            mode,
            episode,
            blob_count,
        }
        .log();

        self.drain_blob(self.graph.source(), episode)?;
        Ok(true)
    }

    /// Asks one blob to drain and arms its deadlock timer.
    fn drain_blob(self: &Arc<Self>, blob: Token, episode: u64) -> Result<(), DrainError> {
        let node = self.graph.node(blob)?;
        node.request_drain(episode)?;

        let state = self.state();
        let kind = if !self.options.collect_drain_data {
            DrainKind::Discard
        } else if state == DrainerState::Final {
            DrainKind::Final
        } else {
            DrainKind::Intermediate
        };
        let target = self
            .blobs
            .get(&blob)
            .ok_or(GraphError::UnknownBlob { blob })?;

        BlobDrainRequested { blob, kind }.log();
        target.drain(
            kind,
            DrainCallback {
                drainer: Arc::downgrade(self),
                blob,
                episode,
            },
        );

        self.arm_deadlock_timer(blob, episode, state);
        Ok(())
    }

    fn arm_deadlock_timer(self: &Arc<Self>, blob: Token, episode: u64, state: DrainerState) {
        let Some(watchdog) = &self.watchdog else {
            return;
        };
        if !self.options.deadlock_policy.applies_to(state) {
            return;
        }

        let token = lock(&self.episode_token).clone();
        let drainer = Arc::downgrade(self);
        watchdog.arm(&token, move || {
            let Some(drainer) = drainer.upgrade() else {
                return;
            };
            if let Err(error) = drainer.deadlock_expired(blob, episode) {
                DrainStepFailed {
                    blob,
                    step: "deadlock timeout",
                    error: &error,
                }
                .log();
            }
        });
    }

    fn deadlock_expired(self: &Arc<Self>, blob: Token, episode: u64) -> Result<(), DrainError> {
        if episode != self.current_episode() {
            return Ok(());
        }
        let node = self.graph.node(blob)?;
        if node.force_complete(episode) {
            self.forced_blobs.fetch_add(1, Ordering::AcqRel);
            DeadlockForced {
                blob,
                timeout: self.options.deadlock_timeout(),
            }
            .log();
            self.blob_completed(node)?;
            self.notify_successors(node, episode)?;
        }
        Ok(())
    }

    fn blob_drained(self: &Arc<Self>, blob: Token, episode: u64) -> Result<(), DrainError> {
        if episode != self.current_episode() {
            return Ok(());
        }
        let node = self.graph.node(blob)?;
        match node.complete(episode) {
            Completion::Completed => {
                self.blob_completed(node)?;
                self.notify_successors(node, episode)?;
            }
            Completion::AfterDeadlock => LateCompletion { blob }.log(),
            Completion::Stale => return Ok(()),
            Completion::Rejected(state) => {
                return Err(DrainError::UnexpectedCompletion { blob, state });
            }
        }

        if self.options.collect_drain_data
            && self.options.drain_data_delivery == DrainDataDelivery::Pull
        {
            if let Some(target) = self.blobs.get(&blob) {
                self.drain_data_received(blob, target.drain_data(), episode)?;
            }
        }
        Ok(())
    }

    /// Counts the drained blob off every successor, draining those that become ready.
    fn notify_successors(self: &Arc<Self>, node: &BlobNode, episode: u64) -> Result<(), DrainError> {
        for successor in node.successors() {
            if self.graph.node(*successor)?.predecessor_completed(node.id())? {
                self.drain_blob(*successor, episode)?;
            }
        }
        Ok(())
    }

    /// Counts the blob as drained before its successors are told, so hooks
    /// observe completions in an order consistent with the graph.
    fn blob_completed(&self, node: &BlobNode) -> Result<(), DrainError> {
        let state = self.state();
        if state == DrainerState::NoDraining {
            return Err(DrainError::NotDraining { blob: node.id() });
        }
        let is_final = state == DrainerState::Final;
        self.hooks.drain_notify(node.id(), is_final);

        let previous = self
            .undrained_blobs
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| {
                count.checked_sub(1)
            })
            .map_err(|_| DrainError::NotDraining { blob: node.id() })?;

        BlobDrained {
            blob: node.id(),
            remaining: previous - 1,
        }
        .log();

        if previous == 1 {
            self.episode_finished(state);
        }
        Ok(())
    }

    fn episode_finished(&self, state: DrainerState) {
        let episode = self.current_episode();
        let is_final = state == DrainerState::Final;
        self.hooks.episode_complete(is_final);
        lock(&self.episode_token).cancel();

        DrainingFinished {
            state,
            episode,
            duration: lock(&self.started_at).elapsed(),
        }
        .log();

        if is_final {
            self.final_drained.release();
        } else {
            self.state
                .store(DrainerState::NoDraining as u8, Ordering::Release);
        }
        self.drained.release(episode);
        if !self.options.collect_drain_data {
            self.drain_data_collected.release(episode);
        }
    }

    fn drain_data_received(
        &self,
        blob: Token,
        data: BlobDrainData,
        episode: u64,
    ) -> Result<(), DrainError> {
        if episode != self.current_episode() {
            return Ok(());
        }
        if !self.graph.node(blob)?.set_drain_data(episode, data)? {
            return Ok(());
        }

        let remaining = self
            .pending_drain_data
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| {
                count.checked_sub(1)
            });
        if remaining == Ok(1) {
            DrainDataCollected {
                episode,
                blob_count: self.graph.len(),
            }
            .log();
            self.drain_data_collected.release(episode);
        }
        Ok(())
    }

    fn collect_aggregate_drain_data(&self) -> Result<DrainData, DrainError> {
        let snapshots = self
            .graph
            .nodes()
            .map(|node| {
                node.drain_data()
                    .map(|data| (node.id(), data))
                    .ok_or(DrainError::MissingDrainData { blob: node.id() })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let aggregate = DrainData::aggregate(snapshots.iter().map(|(blob, data)| (*blob, data)))?;
        if let Some(observer) = &self.observer {
            observer.on_drain_data(self.current_episode(), &aggregate);
        }
        Ok(aggregate)
    }

    fn stop(&self) -> Result<(), DrainError> {
        let state = self.state();
        if state == DrainerState::Intermediate {
            return Err(DrainError::StopDuringIntermediate);
        }
        lock(&self.episode_token).cancel();
        self.final_drained.release();
        DrainerStopped { state }.log();
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
