// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifier of a worker inside the stream graph.
pub type WorkerId = u32;

const OVERALL_INPUT: &str = "input";
const OVERALL_OUTPUT: &str = "output";

/// Identifier of a directed data edge between two workers.
///
/// An edge with no upstream worker is the overall input of the stream graph;
/// an edge with no downstream worker is the overall output. Tokens order by
/// `(upstream, downstream)`, and the overall markers sort before any worker,
/// so the overall input token is always the smallest token of its blob.
///
/// Tokens are written as `"3->4"`, `"input->0"` and `"7->output"` in
/// configuration files.
///
/// # Example
/// ```
/// use stream_drainer::blob::Token;
///
/// let edge: Token = "1->2".parse().unwrap();
/// assert_eq!(edge, Token::new(1, 2));
/// assert!(Token::overall_input(0) < edge);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Token {
    upstream: Option<WorkerId>,
    downstream: Option<WorkerId>,
}

impl Token {
    /// Edge from `upstream` to `downstream`.
    pub fn new(upstream: WorkerId, downstream: WorkerId) -> Self {
        Self {
            upstream: Some(upstream),
            downstream: Some(downstream),
        }
    }

    /// Edge feeding the first worker of the stream graph.
    pub fn overall_input(first_worker: WorkerId) -> Self {
        Self {
            upstream: None,
            downstream: Some(first_worker),
        }
    }

    /// Edge leaving the last worker of the stream graph.
    pub fn overall_output(last_worker: WorkerId) -> Self {
        Self {
            upstream: Some(last_worker),
            downstream: None,
        }
    }

    pub fn upstream(&self) -> Option<WorkerId> {
        self.upstream
    }

    pub fn downstream(&self) -> Option<WorkerId> {
        self.downstream
    }

    pub fn is_overall_input(&self) -> bool {
        self.upstream.is_none()
    }

    pub fn is_overall_output(&self) -> bool {
        self.downstream.is_none()
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.upstream, self.downstream) {
            (Some(up), Some(down)) => write!(f, "{}->{}", up, down),
            (None, Some(down)) => write!(f, "{}->{}", OVERALL_INPUT, down),
            (Some(up), None) => write!(f, "{}->{}", up, OVERALL_OUTPUT),
            (None, None) => write!(f, "{}->{}", OVERALL_INPUT, OVERALL_OUTPUT),
        }
    }
}

/// Error returned when a token string is not of the form `a->b`.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("invalid token '{input}': expected '<worker|input>-><worker|output>'")]
pub struct ParseTokenError {
    pub input: String,
}

impl FromStr for Token {
    type Err = ParseTokenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ParseTokenError {
            input: s.to_string(),
        };

        let (up, down) = s.split_once("->").ok_or_else(invalid)?;
        let upstream = match up.trim() {
            OVERALL_INPUT => None,
            id => Some(id.parse::<WorkerId>().map_err(|_| invalid())?),
        };
        let downstream = match down.trim() {
            OVERALL_OUTPUT => None,
            id => Some(id.parse::<WorkerId>().map_err(|_| invalid())?),
        };

        // An edge that is both the overall input and the overall output carries no worker.
        if upstream.is_none() && downstream.is_none() {
            return Err(invalid());
        }

        Ok(Self {
            upstream,
            downstream,
        })
    }
}

impl TryFrom<String> for Token {
    type Error = ParseTokenError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Token> for String {
    fn from(token: Token) -> Self {
        token.to_string()
    }
}
