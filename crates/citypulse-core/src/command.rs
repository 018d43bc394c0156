//! Operator commands accepted from the boundary.

use std::fmt;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

/// Supported playback speeds. The tick period is the base period divided by the factor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum SpeedMultiplier {
    #[default]
    X1,
    X2,
    X4,
}

impl SpeedMultiplier {
    const ALL: [SpeedMultiplier; 3] = [Self::X1, Self::X2, Self::X4];

    #[must_use]
    pub const fn factor(self) -> u32 {
        match self {
            Self::X1 => 1,
            Self::X2 => 2,
            Self::X4 => 4,
        }
    }

    /// Effective tick period for a given base period.
    #[must_use]
    pub fn tick_period(self, base: Duration) -> Duration {
        base / self.factor()
    }

    fn from_wire(value: f64) -> Result<Self, CommandError> {
        Self::ALL
            .into_iter()
            .find(|speed| f64::from(speed.factor()) == value)
            .ok_or(CommandError::UnsupportedSpeed(value))
    }
}

impl TryFrom<u32> for SpeedMultiplier {
    type Error = CommandError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::from_wire(f64::from(value))
    }
}

impl fmt::Display for SpeedMultiplier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "x{}", self.factor())
    }
}

/// Commands applied between ticks by the loop controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimCommand {
    Start,
    Pause,
    SetSpeed(SpeedMultiplier),
    /// Activate the optimization protocol; ignored once active.
    ActivateProtocol,
}

/// Rejected boundary input. The loop logs these and keeps running.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CommandError {
    #[error("malformed command: {0}")]
    Malformed(String),
    #[error("unsupported speed {0}; expected 1, 2 or 4")]
    UnsupportedSpeed(f64),
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum WireCommand {
    Start,
    Pause,
    Speed { value: f64 },
    OptimizeProductivity,
}

impl SimCommand {
    /// Parse a JSON command such as `{"type":"speed","value":2}`.
    pub fn decode(raw: &str) -> Result<Self, CommandError> {
        let wire: WireCommand =
            serde_json::from_str(raw).map_err(|err| CommandError::Malformed(err.to_string()))?;
        Ok(match wire {
            WireCommand::Start => Self::Start,
            WireCommand::Pause => Self::Pause,
            WireCommand::Speed { value } => Self::SetSpeed(SpeedMultiplier::from_wire(value)?),
            WireCommand::OptimizeProductivity => Self::ActivateProtocol,
        })
    }
}
