// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

mod config;
mod drain;
mod graph;

pub use config::{ConfigError, ValidationError};
pub use drain::DrainError;
pub use graph::GraphError;

use crate::blob::Token;

/// Joins tokens for error and log messages.
pub(crate) fn join_tokens(tokens: &[Token], separator: &str) -> String {
    tokens
        .iter()
        .map(Token::to_string)
        .collect::<Vec<_>>()
        .join(separator)
}
