// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for pipeline configuration loading and validation.

use crate::errors::ValidationError;
use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};
use tracing::Span;

/// Pipeline configuration loaded.
///
/// # Log Level
/// `info!` - Important operational event
pub struct ConfigLoaded<'a> {
    pub path: &'a str,
    pub blob_count: usize,
}

impl Display for ConfigLoaded<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Loaded pipeline config '{}' with {} blobs",
            self.path, self.blob_count
        )
    }
}

impl StructuredLog for ConfigLoaded<'_> {
    fn log(&self) {
        tracing::info!(path = self.path, blob_count = self.blob_count, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "config_loaded",
            span_name = name,
            path = self.path,
            blob_count = self.blob_count,
        )
    }
}

/// Pipeline configuration failed validation.
///
/// # Log Level
/// `error!` - Failure requiring attention
///
/// # Example
/// ```
/// use stream_drainer::errors::ValidationError;
/// use stream_drainer::observability::messages::config::ConfigValidationFailed;
///
/// let errors = vec![ValidationError::NoBlobs];
/// let msg = ConfigValidationFailed { errors: &errors };
///
/// tracing::error!("{}", msg);
/// ```
pub struct ConfigValidationFailed<'a> {
    pub errors: &'a [ValidationError],
}

impl Display for ConfigValidationFailed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Configuration validation failed with {} errors", self.errors.len())?;
        for error in self.errors {
            write!(f, "; {}", error)?;
        }
        Ok(())
    }
}

impl StructuredLog for ConfigValidationFailed<'_> {
    fn log(&self) {
        tracing::error!(error_count = self.errors.len(), "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::error_span!(
            "config_validation",
            span_name = name,
            error_count = self.errors.len(),
        )
    }
}
