// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Observability module for structured logging and drain-data statistics.
//!
//! This module provides centralized message types for all diagnostic and
//! operational logging of the draining core. Message types follow a
//! struct-based pattern with `Display` trait implementation to:
//!
//! * Eliminate magic strings scattered throughout the codebase
//! * Keep field names of structured events consistent between call sites
//! * Provide consistent, structured logging output
//!
//! # Architecture
//!
//! Messages are organized by subsystem:
//! * `messages::graph` - Blob graph construction events
//! * `messages::drain` - Draining episode and per-blob drain events
//! * `messages::config` - Pipeline configuration loading and validation
//!
//! [`statistics`] holds the optional drain-data observer that records how
//! many items were buffered on every edge across episodes.
//!
//! # Usage
//!
//! ```rust
//! use stream_drainer::blob::Token;
//! use stream_drainer::observability::messages::drain::LateCompletion;
//! use stream_drainer::observability::messages::StructuredLog;
//!
//! let msg = LateCompletion {
//!     blob: Token::new(1, 2),
//! };
//!
//! msg.log();
//! ```

pub mod messages;
pub mod statistics;

pub use statistics::{DrainDataObserver, DrainDataStatistics};
