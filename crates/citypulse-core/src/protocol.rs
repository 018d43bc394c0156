//! The optimization protocol: a scripted status perturbation with a false
//! recovery phase followed by an accelerating collapse.
//!
//! Phase is a pure function of ticks elapsed since activation. Quotas are
//! computed from the full population count and filled by converting the
//! first matching agents in index order.

use serde::{Deserialize, Serialize};

use crate::{AgentStatus, Population, Tick};

/// Ticks spent in the recovery phase before collapse begins.
pub const PHASE1_TICKS: u64 = 600;
/// Recovery conversions are applied on elapsed ticks divisible by this value.
pub const RECOVERY_INTERVAL: u64 = 20;
/// Collapse conversions are applied on collapse ticks divisible by this value.
pub const COLLAPSE_INTERVAL: u64 = 10;
/// Share of the population moved Burnout -> Normal per recovery application.
pub const RECOVERY_BURNOUT_RATE: f64 = 0.005;
/// Share of the population moved Unemployed -> Normal per recovery application.
pub const RECOVERY_UNEMPLOYED_RATE: f64 = 0.0025;
/// Share of the population moved Normal -> Burnout per collapse application.
pub const COLLAPSE_BURNOUT_RATE: f64 = 0.002;
/// Share of the population moved Normal -> Unemployed per collapse application.
pub const COLLAPSE_UNEMPLOYED_RATE: f64 = 0.001;
/// Collapse ticks needed for the acceleration to gain one full unit.
pub const COLLAPSE_RAMP_TICKS: f64 = 600.0;
pub const MAX_ACCELERATION: f64 = 2.0;

/// Externally visible protocol state.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ProtocolPhase {
    #[default]
    Inactive,
    Recovery,
    Collapse,
}

impl ProtocolPhase {
    /// Phase reached after `elapsed` ticks of an active protocol.
    #[must_use]
    pub const fn for_elapsed(elapsed: u64) -> Self {
        if elapsed < PHASE1_TICKS {
            Self::Recovery
        } else {
            Self::Collapse
        }
    }

    #[must_use]
    pub const fn is_active(self) -> bool {
        !matches!(self, Self::Inactive)
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Inactive => "inactive",
            Self::Recovery => "recovery",
            Self::Collapse => "collapse",
        }
    }
}

/// Status reassignments performed by a single protocol application.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Conversions {
    pub burnout_to_normal: usize,
    pub unemployed_to_normal: usize,
    pub normal_to_burnout: usize,
    pub normal_to_unemployed: usize,
}

impl Conversions {
    #[must_use]
    pub const fn total(&self) -> usize {
        self.burnout_to_normal
            + self.unemployed_to_normal
            + self.normal_to_burnout
            + self.normal_to_unemployed
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

/// Activation record for the protocol. Once set it is never cleared.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PerturbationProtocol {
    activated_at: Option<Tick>,
}

impl PerturbationProtocol {
    #[must_use]
    pub const fn new() -> Self {
        Self { activated_at: None }
    }

    /// Activate at `now`. Returns `false` (and changes nothing) when already active.
    pub fn activate(&mut self, now: Tick) -> bool {
        if self.activated_at.is_some() {
            return false;
        }
        self.activated_at = Some(now);
        true
    }

    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.activated_at.is_some()
    }

    #[must_use]
    pub const fn activated_at(&self) -> Option<Tick> {
        self.activated_at
    }

    /// Ticks elapsed since activation, if active.
    #[must_use]
    pub fn elapsed(&self, now: Tick) -> Option<u64> {
        self.activated_at.map(|start| now.since(start))
    }

    #[must_use]
    pub fn phase(&self, now: Tick) -> ProtocolPhase {
        self.elapsed(now)
            .map_or(ProtocolPhase::Inactive, ProtocolPhase::for_elapsed)
    }

    /// Apply this tick's conversions, if the tick falls on the phase cadence.
    ///
    /// Recovery applications land on elapsed ticks 20, 40, ... (never on the
    /// activation tick itself); collapse applications land on every 10th tick
    /// counted from the start of the collapse phase.
    pub fn apply(&self, population: &mut Population, now: Tick) -> Conversions {
        let Some(elapsed) = self.elapsed(now) else {
            return Conversions::default();
        };
        let count = population.count();
        let statuses = population.statuses_mut();

        match ProtocolPhase::for_elapsed(elapsed) {
            ProtocolPhase::Recovery => {
                if elapsed == 0 || !elapsed.is_multiple_of(RECOVERY_INTERVAL) {
                    return Conversions::default();
                }
                Conversions {
                    burnout_to_normal: convert_first(
                        statuses,
                        AgentStatus::Burnout,
                        AgentStatus::Normal,
                        quota(count, RECOVERY_BURNOUT_RATE, 1.0),
                    ),
                    unemployed_to_normal: convert_first(
                        statuses,
                        AgentStatus::Unemployed,
                        AgentStatus::Normal,
                        quota(count, RECOVERY_UNEMPLOYED_RATE, 1.0),
                    ),
                    ..Conversions::default()
                }
            }
            ProtocolPhase::Collapse => {
                let phase_ticks = elapsed - PHASE1_TICKS;
                if !phase_ticks.is_multiple_of(COLLAPSE_INTERVAL) {
                    return Conversions::default();
                }
                let acceleration = collapse_acceleration(phase_ticks);
                // Burnout pass first: agents it converts are no longer Normal.
                let normal_to_burnout = convert_first(
                    statuses,
                    AgentStatus::Normal,
                    AgentStatus::Burnout,
                    quota(count, COLLAPSE_BURNOUT_RATE, acceleration),
                );
                let normal_to_unemployed = convert_first(
                    statuses,
                    AgentStatus::Normal,
                    AgentStatus::Unemployed,
                    quota(count, COLLAPSE_UNEMPLOYED_RATE, acceleration),
                );
                Conversions {
                    normal_to_burnout,
                    normal_to_unemployed,
                    ..Conversions::default()
                }
            }
            ProtocolPhase::Inactive => Conversions::default(),
        }
    }
}

/// Collapse multiplier: ramps linearly from 1 and saturates at 2.
#[must_use]
pub fn collapse_acceleration(phase_ticks: u64) -> f64 {
    (1.0 + phase_ticks as f64 / COLLAPSE_RAMP_TICKS).min(MAX_ACCELERATION)
}

/// `floor(count * rate * scale)`, multiplied left to right.
///
/// Folding `rate * scale` first loses the last ulp on exact-integer quotas
/// (`10_000 * (0.002 * 1.2)` floors to 23 instead of 24).
#[must_use]
pub fn quota(count: usize, rate: f64, scale: f64) -> usize {
    (count as f64 * rate * scale).floor() as usize
}

/// Reassign up to `limit` agents tagged `from` to `to`, scanning from index 0.
/// Returns the number of agents converted.
pub fn convert_first(
    statuses: &mut [AgentStatus],
    from: AgentStatus,
    to: AgentStatus,
    limit: usize,
) -> usize {
    let mut converted = 0;
    for status in statuses.iter_mut() {
        if converted == limit {
            break;
        }
        if *status == from {
            *status = to;
            converted += 1;
        }
    }
    converted
}
