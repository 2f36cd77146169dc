// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::backends::stub::{StubBlob, StubCompletion};
use crate::config::{BlobConfig, CompletionMode, Config};
use crate::engine::{BlobGraph, Drainer, DrainerBuilder};
use crate::errors::DrainError;
use crate::traits::Blob;
use std::sync::Arc;
use std::time::Duration;

/// Drain runtime builder - turns a pipeline configuration into a ready drainer.
///
/// Creates one simulated blob per configured blob, links them into a
/// [`BlobGraph`] and wires both into a [`Drainer`] with the configured options.
///
/// # Examples
///
/// ```
/// use stream_drainer::config::{Config, RuntimeBuilder};
///
/// let config: Config = serde_yaml::from_str(r#"
/// blobs:
///   - name: head
///     inputs: ["input->0"]
///     outputs: ["0->1"]
///   - name: tail
///     inputs: ["0->1"]
///     outputs: ["1->output"]
/// "#).unwrap();
///
/// let drainer = RuntimeBuilder::from_config(&config).unwrap();
/// assert_eq!(drainer.graph().len(), 2);
/// ```
pub struct RuntimeBuilder;

impl RuntimeBuilder {
    /// Build the drainer for a configuration.
    ///
    /// Fails with the graph error when the blobs do not form a single-source
    /// acyclic graph.
    pub fn from_config(cfg: &Config) -> Result<Drainer, DrainError> {
        Self::builder(cfg)?.build()
    }

    /// Like [`from_config`](Self::from_config) but leaves the builder open for
    /// hooks and observers.
    pub fn builder(cfg: &Config) -> Result<DrainerBuilder, DrainError> {
        let blobs = Self::blobs(cfg);
        let graph = BlobGraph::from_blobs(&blobs)?;
        Ok(Drainer::builder(graph)
            .blobs(blobs)
            .options(cfg.drainer.clone()))
    }

    /// One simulated blob per configured blob, in configuration order.
    pub fn blobs(cfg: &Config) -> Vec<Arc<dyn Blob>> {
        cfg.blobs
            .iter()
            .map(|blob| Arc::new(Self::stub(blob)) as Arc<dyn Blob>)
            .collect()
    }

    fn stub(blob: &BlobConfig) -> StubBlob {
        let completion = match blob.completion {
            CompletionMode::Immediate => StubCompletion::Immediate,
            CompletionMode::Delayed => {
                StubCompletion::Delayed(Duration::from_millis(blob.delay_ms.unwrap_or_default()))
            }
            CompletionMode::Never => StubCompletion::Never,
        };
        StubBlob::new(blob.inputs.iter().copied(), blob.outputs.iter().copied())
            .with_completion(completion)
            .with_drain_data(blob.drain_data.clone())
    }
}
