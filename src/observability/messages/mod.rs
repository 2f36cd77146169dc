// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Centralized message types for structured logging.
//!
//! Each message type implements the `Display` trait to provide consistent,
//! human-readable output, and [`StructuredLog`] to emit the event at its
//! documented level with structured fields attached.
//!
//! # Organization
//!
//! * `graph` - Blob graph construction events
//! * `drain` - Draining episode lifecycle and per-blob events
//! * `config` - Configuration loading and validation

pub mod config;
pub mod drain;
pub mod graph;

use tracing::Span;

/// A log message that knows its own level and structured fields.
pub trait StructuredLog {
    /// Emits the message as a `tracing` event.
    fn log(&self);

    /// Opens a span carrying the message's fields.
    fn span(&self, name: &str) -> Span;
}
