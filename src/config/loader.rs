// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::blob::{BlobDrainData, Token};
use crate::config::consts::{DEFAULT_DEADLOCK_TIMEOUT_MS, TOML_EXTENSION};
use crate::engine::DrainerState;
use crate::errors::ConfigError;
use crate::observability::messages::config::{ConfigLoaded, ConfigValidationFailed};
use crate::observability::messages::StructuredLog;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Pipeline configuration for the simulated drain runner.
///
/// Describes the drainer options and the blobs of one running stream graph:
/// their boundary tokens, how they behave when asked to drain, and what they
/// report as drain data.
///
/// # Example
/// ```yaml
/// drainer:
///   deadlock_timeout_ms: 2000
///   deadlock_policy: intermediate_only
/// blobs:
///   - name: head
///     inputs: ["input->0"]
///     outputs: ["0->1"]
///   - name: tail
///     inputs: ["0->1"]
///     outputs: ["1->output"]
///     completion: delayed
///     delay_ms: 50
///     drain_data:
///       input_data:
///         "0->1": [3, 4]
/// ```
#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub drainer: DrainerOptions,
    pub blobs: Vec<BlobConfig>,
}

/// Drainer behaviour options.
///
/// # Fields
/// * `deadlock_timeout_ms` - How long a blob may take to drain before it is forced (defaults to 6000)
/// * `deadlock_policy` - Which episodes force-complete stalled blobs
/// * `collect_drain_data` - Whether blobs keep their buffered data and report it (defaults to true)
/// * `drain_data_delivery` - Whether the drainer pulls drain data on completion or blobs push it;
///   set in code only, since simulated blobs never push
#[derive(Debug, Clone, Deserialize)]
pub struct DrainerOptions {
    pub deadlock_timeout_ms: Option<u64>,
    #[serde(default)]
    pub deadlock_policy: DeadlockPolicy,
    #[serde(default = "default_collect_drain_data")]
    pub collect_drain_data: bool,
    #[serde(skip)]
    pub drain_data_delivery: DrainDataDelivery,
}

fn default_collect_drain_data() -> bool {
    true
}

impl Default for DrainerOptions {
    fn default() -> Self {
        Self {
            deadlock_timeout_ms: None,
            deadlock_policy: DeadlockPolicy::default(),
            collect_drain_data: default_collect_drain_data(),
            drain_data_delivery: DrainDataDelivery::default(),
        }
    }
}

impl DrainerOptions {
    /// Get the deadlock timeout, using the built-in default if not configured.
    pub fn deadlock_timeout(&self) -> Duration {
        Duration::from_millis(self.deadlock_timeout_ms.unwrap_or(DEFAULT_DEADLOCK_TIMEOUT_MS))
    }
}

/// Which draining episodes force-complete a blob that misses its deadlock timeout.
///
/// # Variants
/// * `Disabled` - Never force; a stalled blob stalls the episode
/// * `IntermediateOnly` - Force only during intermediate draining (default)
/// * `Always` - Force during every episode, final ones included
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DeadlockPolicy {
    Disabled,
    #[default]
    IntermediateOnly,
    Always,
}

impl DeadlockPolicy {
    pub fn is_enabled(&self) -> bool {
        !matches!(self, DeadlockPolicy::Disabled)
    }

    /// Whether blobs drained while the drainer is in `state` get a deadlock timer.
    pub fn applies_to(&self, state: DrainerState) -> bool {
        match self {
            DeadlockPolicy::Disabled => false,
            DeadlockPolicy::IntermediateOnly => state == DrainerState::Intermediate,
            DeadlockPolicy::Always => state != DrainerState::NoDraining,
        }
    }
}

/// How drain data of a completed blob reaches the drainer.
///
/// # Variants
/// * `Pull` - The drainer reads [`Blob::drain_data`](crate::traits::Blob::drain_data) right after completion (default)
/// * `Push` - The blob executor hands it over through `Drainer::on_drain_data_received`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DrainDataDelivery {
    #[default]
    Pull,
    Push,
}

/// Configuration for one simulated blob.
///
/// # Fields
/// * `name` - Unique name, used in validation messages
/// * `inputs` - Boundary tokens the blob consumes; the smallest becomes the blob id
/// * `outputs` - Boundary tokens the blob produces
/// * `completion` - When the blob reports drain completion
/// * `delay_ms` - Delay for `delayed` completion
/// * `drain_data` - Buffered items and worker state reported once drained
#[derive(Debug, Clone, Deserialize)]
pub struct BlobConfig {
    pub name: String,
    pub inputs: Vec<Token>,
    #[serde(default)]
    pub outputs: Vec<Token>,
    #[serde(default)]
    pub completion: CompletionMode,
    pub delay_ms: Option<u64>,
    #[serde(default)]
    pub drain_data: BlobDrainData,
}

/// When a simulated blob reports drain completion.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CompletionMode {
    #[default]
    Immediate,
    Delayed,
    /// Never completes, as if stuck in a deadlock.
    Never,
}

/// Load a pipeline config; `.toml` files are parsed as TOML, everything else as YAML.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)?;
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(TOML_EXTENSION));

    let cfg: Config = if is_toml {
        toml::from_str(&content)?
    } else {
        serde_yaml::from_str(&content)?
    };

    ConfigLoaded {
        path: &path.display().to_string(),
        blob_count: cfg.blobs.len(),
    }
    .log();
    Ok(cfg)
}

/// Load a pipeline config and check that its blobs form a consistent graph.
pub fn load_and_validate_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let cfg = load_config(path)?;

    if let Err(validation_errors) = crate::config::validate_pipeline_config(&cfg) {
        ConfigValidationFailed {
            errors: &validation_errors,
        }
        .log();
        return Err(ConfigError::Validation(validation_errors));
    }

    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const PIPELINE_YAML: &str = r#"
drainer:
  deadlock_timeout_ms: 250
  deadlock_policy: always
blobs:
  - name: head
    inputs: ["input->0"]
    outputs: ["0->1"]
  - name: tail
    inputs: ["0->1"]
    outputs: ["1->output"]
    completion: delayed
    delay_ms: 20
    drain_data:
      input_data:
        "0->1": [3, 4]
      drain_data:
        state:
          1:
            count: 7
"#;

    fn write_temp(content: &str, suffix: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn parse_pipeline_config() {
        let cfg: Config = serde_yaml::from_str(PIPELINE_YAML).unwrap();

        assert_eq!(cfg.drainer.deadlock_timeout(), Duration::from_millis(250));
        assert_eq!(cfg.drainer.deadlock_policy, DeadlockPolicy::Always);
        assert!(cfg.drainer.collect_drain_data);
        assert_eq!(cfg.blobs.len(), 2);

        let tail = &cfg.blobs[1];
        assert_eq!(tail.inputs, vec![Token::new(0, 1)]);
        assert_eq!(tail.outputs, vec![Token::overall_output(1)]);
        assert_eq!(tail.completion, CompletionMode::Delayed);
        assert_eq!(tail.delay_ms, Some(20));
        assert_eq!(
            tail.drain_data.input_data.get(&Token::new(0, 1)),
            Some(&vec![json!(3), json!(4)])
        );
        assert_eq!(tail.drain_data.drain_data.worker_field(1, "count"), Some(&json!(7)));
    }

    #[test]
    fn test_drainer_options_defaults() {
        let cfg: Config = serde_yaml::from_str("blobs: []").unwrap();

        assert_eq!(
            cfg.drainer.deadlock_timeout(),
            Duration::from_millis(DEFAULT_DEADLOCK_TIMEOUT_MS)
        );
        assert_eq!(cfg.drainer.deadlock_policy, DeadlockPolicy::IntermediateOnly);
        assert!(cfg.drainer.collect_drain_data);
        assert_eq!(cfg.drainer.drain_data_delivery, DrainDataDelivery::Pull);
    }

    #[test]
    fn test_push_delivery_is_not_read_from_files() {
        let cfg: Config = serde_yaml::from_str("drainer:\n  drain_data_delivery: push\nblobs: []").unwrap();
        assert_eq!(cfg.drainer.drain_data_delivery, DrainDataDelivery::Pull);
    }

    #[test]
    fn test_deadlock_policy_scope() {
        assert!(DeadlockPolicy::IntermediateOnly.applies_to(DrainerState::Intermediate));
        assert!(!DeadlockPolicy::IntermediateOnly.applies_to(DrainerState::Final));
        assert!(DeadlockPolicy::Always.applies_to(DrainerState::Final));
        assert!(!DeadlockPolicy::Disabled.applies_to(DrainerState::Intermediate));
        assert!(!DeadlockPolicy::Disabled.is_enabled());
    }

    #[test]
    fn test_load_and_validate_valid_config() {
        let file = write_temp(PIPELINE_YAML, ".yaml");

        let cfg = load_and_validate_config(file.path()).unwrap();
        assert_eq!(cfg.blobs[0].name, "head");
    }

    #[test]
    fn test_load_toml_config() {
        let toml = r#"
[drainer]
collect_drain_data = false

[[blobs]]
name = "only"
inputs = ["input->0"]
outputs = ["0->output"]
completion = "never"
"#;
        let file = write_temp(toml, ".toml");

        let cfg = load_and_validate_config(file.path()).unwrap();
        assert!(!cfg.drainer.collect_drain_data);
        assert_eq!(cfg.blobs[0].completion, CompletionMode::Never);
        assert_eq!(cfg.blobs[0].inputs, vec![Token::overall_input(0)]);
    }

    #[test]
    fn test_load_and_validate_reports_all_errors() {
        let yaml = r#"
blobs:
  - name: a
    inputs: ["input->0"]
    outputs: ["0->1"]
  - name: a
    inputs: ["5->6"]
"#;
        let file = write_temp(yaml, ".yaml");

        match load_and_validate_config(file.path()) {
            Err(ConfigError::Validation(errors)) => assert!(errors.len() >= 2),
            other => panic!("expected validation errors, got {:?}", other),
        }
    }

    #[test]
    fn test_bad_token_is_a_parse_error() {
        let file = write_temp("blobs:\n  - name: a\n    inputs: [\"nonsense\"]\n", ".yaml");
        assert!(matches!(load_config(file.path()), Err(ConfigError::Yaml(_))));
    }

    #[test]
    fn test_missing_file_is_an_io_error() {
        assert!(matches!(
            load_config("/nonexistent/pipeline.yaml"),
            Err(ConfigError::Io(_))
        ));
    }
}
