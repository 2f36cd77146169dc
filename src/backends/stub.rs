// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::blob::{BlobDrainData, Token};
use crate::engine::{DrainCallback, DrainKind};
use crate::errors::DrainError;
use crate::observability::messages::drain::DrainStepFailed;
use crate::observability::messages::StructuredLog;
use crate::traits::Blob;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// When a [`StubBlob`] reports completion after being asked to drain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StubCompletion {
    /// From inside the drain call.
    Immediate,
    /// From a separate thread after the delay.
    Delayed(Duration),
    /// Never; the callback is dropped.
    Never,
    /// When [`StubBlob::release_completion`] is called.
    Manual,
}

/// A simulated blob that drains on command and reports canned drain data.
///
/// Used by the command-line runner and throughout the tests to script blob
/// behaviour: fast blobs, slow blobs, and blobs stuck in a deadlock.
#[derive(Debug)]
pub struct StubBlob {
    inputs: BTreeSet<Token>,
    outputs: BTreeSet<Token>,
    completion: Mutex<StubCompletion>,
    drain_data: Mutex<BlobDrainData>,
    held: Mutex<Option<DrainCallback>>,
    drain_calls: AtomicUsize,
    kinds: Mutex<Vec<DrainKind>>,
}

impl StubBlob {
    pub fn new<I, O>(inputs: I, outputs: O) -> Self
    where
        I: IntoIterator<Item = Token>,
        O: IntoIterator<Item = Token>,
    {
        Self {
            inputs: inputs.into_iter().collect(),
            outputs: outputs.into_iter().collect(),
            completion: Mutex::new(StubCompletion::Immediate),
            drain_data: Mutex::new(BlobDrainData::default()),
            held: Mutex::new(None),
            drain_calls: AtomicUsize::new(0),
            kinds: Mutex::new(Vec::new()),
        }
    }

    pub fn with_completion(self, completion: StubCompletion) -> Self {
        *lock(&self.completion) = completion;
        self
    }

    pub fn with_drain_data(self, data: BlobDrainData) -> Self {
        *lock(&self.drain_data) = data;
        self
    }

    /// Changes how later drain requests complete.
    pub fn set_completion(&self, completion: StubCompletion) {
        *lock(&self.completion) = completion;
    }

    /// Keeps the next drain callback until [`release_completion`](Self::release_completion).
    pub fn hold_completion(&self) {
        self.set_completion(StubCompletion::Manual);
    }

    /// Fires the held drain callback. Returns `Ok(false)` if none is held.
    pub fn release_completion(&self) -> Result<bool, DrainError> {
        let held = lock(&self.held).take();
        match held {
            Some(callback) => callback.complete().map(|()| true),
            None => Ok(false),
        }
    }

    pub fn set_drain_data(&self, data: BlobDrainData) {
        *lock(&self.drain_data) = data;
    }

    /// Number of times the drainer asked this blob to drain.
    pub fn drain_calls(&self) -> usize {
        self.drain_calls.load(Ordering::SeqCst)
    }

    /// Drain kinds received, in call order.
    pub fn drain_kinds(&self) -> Vec<DrainKind> {
        lock(&self.kinds).clone()
    }
}

impl Blob for StubBlob {
    fn inputs(&self) -> &BTreeSet<Token> {
        &self.inputs
    }

    fn outputs(&self) -> &BTreeSet<Token> {
        &self.outputs
    }

    fn drain(&self, kind: DrainKind, on_complete: DrainCallback) {
        self.drain_calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.kinds).push(kind);

        let completion = *lock(&self.completion);
        match completion {
            StubCompletion::Immediate => report(on_complete),
            StubCompletion::Delayed(delay) => {
                std::thread::spawn(move || {
                    std::thread::sleep(delay);
                    report(on_complete);
                });
            }
            StubCompletion::Never => {}
            StubCompletion::Manual => {
                *lock(&self.held) = Some(on_complete);
            }
        }
    }

    fn drain_data(&self) -> BlobDrainData {
        lock(&self.drain_data).clone()
    }
}

fn report(on_complete: DrainCallback) {
    let blob = on_complete.blob();
    if let Err(error) = on_complete.complete() {
        DrainStepFailed {
            blob,
            step: "drain completion",
            error: &error,
        }
        .log();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
