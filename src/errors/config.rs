// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::blob::Token;
use std::fmt;

/// Errors that can occur while validating a pipeline configuration
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// The configuration declares no blobs at all
    NoBlobs,
    /// Two blobs share the same name
    DuplicateBlobName {
        /// The duplicated name
        name: String,
    },
    /// A blob declares no input tokens, so it has no blob id
    BlobWithoutInputs {
        /// The blob missing inputs
        blob: String,
    },
    /// More than one blob consumes the same token
    DuplicateConsumer {
        token: Token,
        /// Names of every blob listing the token as input
        blobs: Vec<String>,
    },
    /// More than one blob produces the same token
    DuplicateProducer {
        token: Token,
        /// Names of every blob listing the token as output
        blobs: Vec<String>,
    },
    /// A blob consumes a token that no blob produces and that is not the overall input
    UnproducedInput { blob: String, token: Token },
    /// A blob produces a token that no blob consumes and that is not the overall output
    UnconsumedOutput { blob: String, token: Token },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::NoBlobs => write!(f, "Pipeline declares no blobs"),
            ValidationError::DuplicateBlobName { name } => {
                write!(f, "Duplicate blob name: '{}'", name)
            }
            ValidationError::BlobWithoutInputs { blob } => {
                write!(f, "Blob '{}' declares no input tokens", blob)
            }
            ValidationError::DuplicateConsumer { token, blobs } => {
                write!(
                    f,
                    "Token {} is consumed by more than one blob: {}",
                    token,
                    blobs.join(", ")
                )
            }
            ValidationError::DuplicateProducer { token, blobs } => {
                write!(
                    f,
                    "Token {} is produced by more than one blob: {}",
                    token,
                    blobs.join(", ")
                )
            }
            ValidationError::UnproducedInput { blob, token } => {
                write!(
                    f,
                    "Blob '{}' consumes token {} which no blob produces",
                    blob, token
                )
            }
            ValidationError::UnconsumedOutput { blob, token } => {
                write!(
                    f,
                    "Blob '{}' produces token {} which no blob consumes",
                    blob, token
                )
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// Errors raised while loading a pipeline configuration file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse YAML config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("failed to parse TOML config: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Configuration validation failed:\n{}", .0.iter().map(ToString::to_string).collect::<Vec<_>>().join("\n"))]
    Validation(Vec<ValidationError>),
}
