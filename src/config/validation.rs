//! Pipeline configuration validation.
//!
//! Checks that the blobs declared in a [`Config`] can be wired into a blob
//! graph before any blob is created. The checks work on token bookkeeping
//! only; cycle detection and source resolution happen when the
//! [`BlobGraph`](crate::engine::BlobGraph) is built, since they need the
//! linked graph.
//!
//! # Validation Pipeline
//!
//! 1. **Presence**: at least one blob is declared
//! 2. **Uniqueness**: blob names are unique and every blob has an input token
//! 3. **Token Ownership**: each token has at most one consumer and one producer
//! 4. **Token Resolution**: every internal token has both a producer and a consumer
//!
//! All errors found are reported together, so a broken file can be fixed in
//! one pass.
//!
//! # Example
//!
//! ```rust
//! use stream_drainer::config::{validate_pipeline_config, Config};
//! use stream_drainer::errors::ValidationError;
//!
//! let config: Config = serde_yaml::from_str(r#"
//! blobs:
//!   - name: head
//!     inputs: ["input->0"]
//!     outputs: ["0->1"]
//! "#).unwrap();
//!
//! match validate_pipeline_config(&config) {
//!     Err(errors) => {
//!         assert!(matches!(errors[0], ValidationError::UnconsumedOutput { .. }));
//!     }
//!     Ok(()) => unreachable!(),
//! }
//! ```

use crate::blob::Token;
use crate::config::Config;
use crate::errors::ValidationError;
use std::collections::{BTreeMap, HashSet};

/// Validates a pipeline configuration, accumulating every error found.
///
/// # Returns
///
/// * `Ok(())` - The blobs can be linked into a graph
/// * `Err(Vec<ValidationError>)` - List of all validation errors found
pub fn validate_pipeline_config(config: &Config) -> Result<(), Vec<ValidationError>> {
    if config.blobs.is_empty() {
        return Err(vec![ValidationError::NoBlobs]);
    }

    let mut errors = Vec::new();

    if let Err(naming_errors) = validate_blob_names(config) {
        errors.extend(naming_errors);
    }

    if let Err(ownership_errors) = validate_token_ownership(config) {
        errors.extend(ownership_errors);
    }

    if let Err(resolution_errors) = validate_token_resolution(config) {
        errors.extend(resolution_errors);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Blob names are unique and every blob has at least one input, which becomes its id.
fn validate_blob_names(config: &Config) -> Result<(), Vec<ValidationError>> {
    let mut seen_names = HashSet::new();
    let mut errors = Vec::new();

    for blob in &config.blobs {
        if !seen_names.insert(&blob.name) {
            errors.push(ValidationError::DuplicateBlobName {
                name: blob.name.clone(),
            });
        }
        if blob.inputs.is_empty() {
            errors.push(ValidationError::BlobWithoutInputs {
                blob: blob.name.clone(),
            });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// A token is one edge of the stream graph, so it has one consumer and one producer.
fn validate_token_ownership(config: &Config) -> Result<(), Vec<ValidationError>> {
    let consumers = claims(config, |blob| &blob.inputs);
    let producers = claims(config, |blob| &blob.outputs);
    let mut errors = Vec::new();

    for (token, blobs) in consumers {
        if blobs.len() > 1 {
            errors.push(ValidationError::DuplicateConsumer { token, blobs });
        }
    }
    for (token, blobs) in producers {
        if blobs.len() > 1 {
            errors.push(ValidationError::DuplicateProducer { token, blobs });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Internal tokens must connect two blobs; only the overall input and output
/// may be left dangling.
fn validate_token_resolution(config: &Config) -> Result<(), Vec<ValidationError>> {
    let consumers = claims(config, |blob| &blob.inputs);
    let producers = claims(config, |blob| &blob.outputs);
    let mut errors = Vec::new();

    for blob in &config.blobs {
        for token in &blob.inputs {
            if !token.is_overall_input() && !producers.contains_key(token) {
                errors.push(ValidationError::UnproducedInput {
                    blob: blob.name.clone(),
                    token: *token,
                });
            }
        }
        for token in &blob.outputs {
            if !token.is_overall_output() && !consumers.contains_key(token) {
                errors.push(ValidationError::UnconsumedOutput {
                    blob: blob.name.clone(),
                    token: *token,
                });
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Token -> names of the blobs listing it on the selected side.
fn claims<F>(config: &Config, side: F) -> BTreeMap<Token, Vec<String>>
where
    F: Fn(&crate::config::BlobConfig) -> &Vec<Token>,
{
    let mut claimed: BTreeMap<Token, Vec<String>> = BTreeMap::new();
    for blob in &config.blobs {
        for token in side(blob) {
            let names = claimed.entry(*token).or_default();
            if !names.contains(&blob.name) {
                names.push(blob.name.clone());
            }
        }
    }
    claimed
}
