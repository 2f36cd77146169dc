// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Blob implementations the drainer can run against.
//!
//! The draining core only sees the [`Blob`](crate::traits::Blob) trait; real
//! runtimes provide their own blobs. This module ships a simulated one.
//!
//! ## Stub Backend
//! [`StubBlob`](stub::StubBlob) drains on command with scripted completion
//! timing and canned drain data:
//! - **Immediate**: completes inside the drain call
//! - **Delayed**: completes from another thread after a delay
//! - **Never**: simulates a blob stuck in a deadlock
//! - **Manual**: completes when the test releases it
//!
//! Pipeline configurations are turned into stub blobs by
//! [`RuntimeBuilder`](crate::config::RuntimeBuilder), which is how the
//! command-line runner exercises the drainer.

pub mod stub;
