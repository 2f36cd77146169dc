// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::errors::DrainError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The three kinds of draining episode.
///
/// * `Intermediate` (type 0) - pause for reconfiguration. No new input is
///   consumed and the pipeline is resumed with a new configuration afterwards.
/// * `SemiFinal` (type 1) - stop for good without consuming new input, even
///   though buffered input may remain.
/// * `Final` (type 2) - end of input, run to full quiescence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DrainMode {
    Intermediate,
    SemiFinal,
    Final,
}

impl DrainMode {
    /// Whether hooks should treat the episode as the end of input.
    pub fn is_final(&self) -> bool {
        matches!(self, DrainMode::Final)
    }

    /// Drainer state while an episode of this mode runs.
    pub fn drainer_state(&self) -> DrainerState {
        match self {
            DrainMode::Intermediate => DrainerState::Intermediate,
            DrainMode::SemiFinal | DrainMode::Final => DrainerState::Final,
        }
    }
}

impl TryFrom<u8> for DrainMode {
    type Error = DrainError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(DrainMode::Intermediate),
            1 => Ok(DrainMode::SemiFinal),
            2 => Ok(DrainMode::Final),
            _ => Err(DrainError::InvalidDrainType { value }),
        }
    }
}

impl FromStr for DrainMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "intermediate" | "0" => Ok(DrainMode::Intermediate),
            "semi_final" | "semifinal" | "1" => Ok(DrainMode::SemiFinal),
            "final" | "2" => Ok(DrainMode::Final),
            other => Err(format!(
                "unknown draining mode '{}': expected intermediate, semi-final or final",
                other
            )),
        }
    }
}

impl fmt::Display for DrainMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DrainMode::Intermediate => "intermediate",
            DrainMode::SemiFinal => "semi-final",
            DrainMode::Final => "final",
        };
        f.write_str(name)
    }
}

/// What the drainer is doing right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DrainerState {
    NoDraining = 0,
    /// Draining for reconfiguration; drain data of every blob is expected.
    Intermediate = 1,
    /// Final or semi-final draining was requested. There is no way back.
    Final = 2,
}

impl DrainerState {
    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            1 => DrainerState::Intermediate,
            2 => DrainerState::Final,
            _ => DrainerState::NoDraining,
        }
    }
}

impl fmt::Display for DrainerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DrainerState::NoDraining => "no-draining",
            DrainerState::Intermediate => "intermediate",
            DrainerState::Final => "final",
        };
        f.write_str(name)
    }
}

/// Instruction handed to a blob together with its drain request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DrainKind {
    /// Stop and keep buffered data for the next configuration.
    Intermediate,
    /// Stop for good and keep buffered data.
    Final,
    /// Stop and throw buffered data away; no drain data will be collected.
    Discard,
}

impl fmt::Display for DrainKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DrainKind::Intermediate => "intermediate",
            DrainKind::Final => "final",
            DrainKind::Discard => "discard",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_drain_types() {
        assert_eq!(DrainMode::try_from(0).unwrap(), DrainMode::Intermediate);
        assert_eq!(DrainMode::try_from(1).unwrap(), DrainMode::SemiFinal);
        assert_eq!(DrainMode::try_from(2).unwrap(), DrainMode::Final);
        assert!(matches!(
            DrainMode::try_from(3),
            Err(DrainError::InvalidDrainType { value: 3 })
        ));
    }

    #[test]
    fn test_semi_final_runs_in_final_state_but_is_not_final() {
        assert_eq!(DrainMode::SemiFinal.drainer_state(), DrainerState::Final);
        assert!(!DrainMode::SemiFinal.is_final());
        assert!(DrainMode::Final.is_final());
    }

    #[test]
    fn test_parse_cli_names() {
        assert_eq!("semi-final".parse::<DrainMode>().unwrap(), DrainMode::SemiFinal);
        assert_eq!("Final".parse::<DrainMode>().unwrap(), DrainMode::Final);
        assert!("pause".parse::<DrainMode>().is_err());
    }
}
