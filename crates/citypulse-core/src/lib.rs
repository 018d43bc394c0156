//! Core types shared across the CityPulse workspace.
//!
//! The population lives in dense columns (positions, velocities, statuses)
//! owned by a single [`Simulation`]; every tick advances the columns in place
//! and hands a copy across the boundary through the [`SnapshotTransport`].

use rand::{Rng, SeedableRng, rngs::SmallRng};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod alerts;
pub mod command;
pub mod metrics;
pub mod protocol;
pub mod sim;
pub mod transport;

pub use alerts::{ALERT_RULES, Alert, AlertEngine, AlertRule, OPTIMIZE_ALERT_KEY, Severity};
pub use command::{CommandError, SimCommand, SpeedMultiplier};
pub use metrics::{Metrics, compute_metrics};
pub use protocol::{Conversions, PHASE1_TICKS, PerturbationProtocol, ProtocolPhase};
pub use sim::{Boundary, NullBoundary, OutboundMessage, Simulation, TickReport};
pub use transport::{BufferId, SnapshotFrame, SnapshotTransport};

/// Edge length of the square arena in world units.
pub const WORLD_SIZE: f32 = 2_000.0;
/// Distance covered by every agent each tick.
pub const AGENT_SPEED: f32 = 2.0;
/// Population size used by the dashboard.
pub const DEFAULT_AGENT_COUNT: usize = 10_000;
/// Nominal tick period at speed x1 (20 Hz).
pub const BASE_TICK_MS: u64 = 50;
/// Metrics (and alerts) are evaluated on ticks divisible by this value.
pub const METRICS_INTERVAL: u64 = 10;

const FULL_TURN: f32 = std::f32::consts::TAU;

/// Simulation clock (ticks processed since the population was created).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct Tick(pub u64);

impl Tick {
    /// Returns the next sequential tick.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }

    #[must_use]
    pub const fn zero() -> Self {
        Self(0)
    }

    /// Ticks elapsed since `earlier`, saturating at zero.
    #[must_use]
    pub const fn since(self, earlier: Tick) -> u64 {
        self.0.saturating_sub(earlier.0)
    }
}

/// Axis-aligned 2D position.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

impl Position {
    #[must_use]
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Whether both coordinates lie inside `[0, bound]`.
    #[must_use]
    pub fn within(&self, bound: f32) -> bool {
        (0.0..=bound).contains(&self.x) && (0.0..=bound).contains(&self.y)
    }
}

/// Per-tick displacement.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Velocity {
    pub vx: f32,
    pub vy: f32,
}

impl Velocity {
    #[must_use]
    pub const fn new(vx: f32, vy: f32) -> Self {
        Self { vx, vy }
    }

    /// Velocity of magnitude `speed` pointing along `angle` (radians).
    #[must_use]
    pub fn from_heading(angle: f32, speed: f32) -> Self {
        Self {
            vx: angle.cos() * speed,
            vy: angle.sin() * speed,
        }
    }

    #[must_use]
    pub fn magnitude(&self) -> f32 {
        self.vx.hypot(self.vy)
    }
}

/// Condition of a single agent. The discriminants are the wire tags.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum AgentStatus {
    #[default]
    Normal = 0,
    Burnout = 1,
    Unemployed = 2,
}

impl AgentStatus {
    /// Wire tag for this status.
    #[must_use]
    pub const fn tag(self) -> u8 {
        self as u8
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Burnout => "burnout",
            Self::Unemployed => "unemployed",
        }
    }

    /// Map a uniform roll in `[0, 1)` onto a status, burnout band first.
    fn from_roll(roll: f32, burnout_share: f32, unemployed_share: f32) -> Self {
        if roll < burnout_share {
            Self::Burnout
        } else if roll < burnout_share + unemployed_share {
            Self::Unemployed
        } else {
            Self::Normal
        }
    }
}

impl From<AgentStatus> for u8 {
    fn from(value: AgentStatus) -> Self {
        value.tag()
    }
}

/// Raised when decoding a status byte outside `{0, 1, 2}`.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("status tag {0} is outside the wire encoding")]
pub struct StatusTagError(pub u8);

impl TryFrom<u8> for AgentStatus {
    type Error = StatusTagError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Normal),
            1 => Ok(Self::Burnout),
            2 => Ok(Self::Unemployed),
            other => Err(StatusTagError(other)),
        }
    }
}

/// Histogram of statuses across a population.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusCounts {
    pub normal: usize,
    pub burnout: usize,
    pub unemployed: usize,
}

impl StatusCounts {
    #[must_use]
    pub fn from_statuses(statuses: &[AgentStatus]) -> Self {
        let mut counts = Self::default();
        for &status in statuses {
            counts.record(status);
        }
        counts
    }

    /// Count raw wire tags, rejecting the first unknown tag.
    pub fn from_tags(tags: &[u8]) -> Result<Self, StatusTagError> {
        let mut counts = Self::default();
        for &tag in tags {
            counts.record(AgentStatus::try_from(tag)?);
        }
        Ok(counts)
    }

    pub fn record(&mut self, status: AgentStatus) {
        match status {
            AgentStatus::Normal => self.normal += 1,
            AgentStatus::Burnout => self.burnout += 1,
            AgentStatus::Unemployed => self.unemployed += 1,
        }
    }

    #[must_use]
    pub const fn total(&self) -> usize {
        self.normal + self.burnout + self.unemployed
    }
}

/// Errors that can occur when constructing a simulation.
#[derive(Debug, Error, PartialEq)]
pub enum SimError {
    /// Indicates an invalid configuration value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
    /// Column lengths handed to [`Population::from_parts`] disagree.
    #[error("column mismatch: {positions} positions, {velocities} velocities, {statuses} statuses")]
    MismatchedColumns {
        positions: usize,
        velocities: usize,
        statuses: usize,
    },
}

/// Static configuration for a CityPulse simulation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SimConfig {
    /// Number of agents; fixed for the lifetime of the population.
    pub agent_count: usize,
    /// Edge length of the square arena.
    pub world_size: f32,
    /// Magnitude of every agent velocity.
    pub agent_speed: f32,
    /// Probability that a freshly created agent starts in burnout.
    pub initial_burnout_share: f32,
    /// Probability that a freshly created agent starts unemployed.
    pub initial_unemployed_share: f32,
    /// Tick period at speed x1, in milliseconds.
    pub base_tick_ms: u64,
    /// Optional RNG seed for reproducible populations.
    pub rng_seed: Option<u64>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            agent_count: DEFAULT_AGENT_COUNT,
            world_size: WORLD_SIZE,
            agent_speed: AGENT_SPEED,
            initial_burnout_share: 0.10,
            initial_unemployed_share: 0.05,
            base_tick_ms: BASE_TICK_MS,
            rng_seed: None,
        }
    }
}

impl SimConfig {
    /// Reject configurations the simulation cannot honour.
    pub fn validate(&self) -> Result<(), SimError> {
        if self.agent_count == 0 {
            return Err(SimError::InvalidConfig("agent_count must be non-zero"));
        }
        if !self.world_size.is_finite() || self.world_size <= 0.0 {
            return Err(SimError::InvalidConfig(
                "world_size must be positive and finite",
            ));
        }
        if !self.agent_speed.is_finite() || self.agent_speed < 0.0 {
            return Err(SimError::InvalidConfig(
                "agent_speed must be non-negative and finite",
            ));
        }
        let shares = [self.initial_burnout_share, self.initial_unemployed_share];
        if shares.iter().any(|share| !(0.0..=1.0).contains(share))
            || self.initial_burnout_share + self.initial_unemployed_share > 1.0
        {
            return Err(SimError::InvalidConfig(
                "initial status shares must lie in [0, 1] and sum to at most 1",
            ));
        }
        if self.base_tick_ms == 0 {
            return Err(SimError::InvalidConfig("base_tick_ms must be non-zero"));
        }
        Ok(())
    }

    /// Returns the configured RNG, seeding from entropy if no seed is set.
    #[must_use]
    pub fn seeded_rng(&self) -> SmallRng {
        match self.rng_seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::seed_from_u64(rand::random()),
        }
    }
}

/// Dense per-agent columns. Only the stepper and the protocol write to them.
#[derive(Debug, Clone, PartialEq)]
pub struct Population {
    world_size: f32,
    positions: Vec<Position>,
    velocities: Vec<Velocity>,
    statuses: Vec<AgentStatus>,
}

impl Population {
    /// Scatter `config.agent_count` agents uniformly over the arena.
    pub fn from_config<R: Rng>(config: &SimConfig, rng: &mut R) -> Self {
        let count = config.agent_count;
        let mut positions = Vec::with_capacity(count);
        let mut velocities = Vec::with_capacity(count);
        let mut statuses = Vec::with_capacity(count);

        for _ in 0..count {
            let x = rng.random::<f32>() * config.world_size;
            let y = rng.random::<f32>() * config.world_size;
            positions.push(Position::new(x, y));

            let angle = rng.random::<f32>() * FULL_TURN;
            velocities.push(Velocity::from_heading(angle, config.agent_speed));

            let roll = rng.random::<f32>();
            statuses.push(AgentStatus::from_roll(
                roll,
                config.initial_burnout_share,
                config.initial_unemployed_share,
            ));
        }

        Self {
            world_size: config.world_size,
            positions,
            velocities,
            statuses,
        }
    }

    /// Assemble a population from explicit columns.
    pub fn from_parts(
        world_size: f32,
        positions: Vec<Position>,
        velocities: Vec<Velocity>,
        statuses: Vec<AgentStatus>,
    ) -> Result<Self, SimError> {
        if positions.len() != velocities.len() || positions.len() != statuses.len() {
            return Err(SimError::MismatchedColumns {
                positions: positions.len(),
                velocities: velocities.len(),
                statuses: statuses.len(),
            });
        }
        if positions.is_empty() {
            return Err(SimError::InvalidConfig("population must not be empty"));
        }
        if !world_size.is_finite() || world_size <= 0.0 {
            return Err(SimError::InvalidConfig(
                "world_size must be positive and finite",
            ));
        }
        if positions.iter().any(|position| !position.within(world_size)) {
            return Err(SimError::InvalidConfig(
                "initial positions must lie inside the arena",
            ));
        }
        if velocities
            .iter()
            .any(|velocity| !velocity.vx.is_finite() || !velocity.vy.is_finite())
        {
            return Err(SimError::InvalidConfig("velocities must be finite"));
        }
        Ok(Self {
            world_size,
            positions,
            velocities,
            statuses,
        })
    }

    /// Number of agents.
    #[must_use]
    pub fn count(&self) -> usize {
        self.statuses.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.statuses.is_empty()
    }

    #[must_use]
    pub const fn world_size(&self) -> f32 {
        self.world_size
    }

    #[must_use]
    pub fn positions(&self) -> &[Position] {
        &self.positions
    }

    #[must_use]
    pub fn velocities(&self) -> &[Velocity] {
        &self.velocities
    }

    #[must_use]
    pub fn statuses(&self) -> &[AgentStatus] {
        &self.statuses
    }

    pub(crate) fn statuses_mut(&mut self) -> &mut [AgentStatus] {
        &mut self.statuses
    }

    #[must_use]
    pub fn status_counts(&self) -> StatusCounts {
        StatusCounts::from_statuses(&self.statuses)
    }

    /// Advance every agent by one tick; see [`step`].
    pub fn step(&mut self) {
        step(self);
    }
}

/// Move every agent by its velocity and bounce it off the arena walls.
///
/// Axes are handled independently, so a corner hit flips both components.
/// Coordinates are clamped rather than mirrored, which keeps them in bounds
/// even when a velocity overshoots the whole arena in one tick.
pub fn step(population: &mut Population) {
    let bound = population.world_size;
    for (position, velocity) in population
        .positions
        .iter_mut()
        .zip(population.velocities.iter_mut())
    {
        position.x += velocity.vx;
        position.y += velocity.vy;
        reflect_axis(&mut position.x, &mut velocity.vx, bound);
        reflect_axis(&mut position.y, &mut velocity.vy, bound);
    }
}

#[inline]
fn reflect_axis(coordinate: &mut f32, velocity: &mut f32, bound: f32) {
    if *coordinate < 0.0 {
        *coordinate = 0.0;
        *velocity = -*velocity;
    } else if *coordinate > bound {
        *coordinate = bound;
        *velocity = -*velocity;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single_agent(position: Position, velocity: Velocity, world_size: f32) -> Population {
        Population::from_parts(
            world_size,
            vec![position],
            vec![velocity],
            vec![AgentStatus::Normal],
        )
        .expect("population")
    }

    #[test]
    fn step_advances_by_velocity() {
        let mut population =
            single_agent(Position::new(10.0, 20.0), Velocity::new(1.5, -2.0), 100.0);
        step(&mut population);
        assert_eq!(population.positions()[0], Position::new(11.5, 18.0));
        assert_eq!(population.velocities()[0], Velocity::new(1.5, -2.0));
    }

    #[test]
    fn corner_hit_bounces_both_axes() {
        let mut population =
            single_agent(Position::new(99.0, 1.0), Velocity::new(2.0, -2.0), 100.0);
        step(&mut population);
        assert_eq!(population.positions()[0], Position::new(100.0, 0.0));
        assert_eq!(population.velocities()[0], Velocity::new(-2.0, 2.0));
    }

    #[test]
    fn overshooting_velocity_is_clamped() {
        let mut population =
            single_agent(Position::new(50.0, 50.0), Velocity::new(-450.0, 730.0), 100.0);
        for _ in 0..16 {
            step(&mut population);
            assert!(population.positions()[0].within(100.0));
        }
        assert_eq!(population.velocities()[0].vx.abs(), 450.0);
        assert_eq!(population.velocities()[0].vy.abs(), 730.0);
    }

    #[test]
    fn from_config_respects_bounds_and_speed() {
        let config = SimConfig {
            agent_count: 2_000,
            rng_seed: Some(7),
            ..SimConfig::default()
        };
        let mut rng = config.seeded_rng();
        let population = Population::from_config(&config, &mut rng);
        assert_eq!(population.count(), 2_000);
        assert_eq!(population.positions().len(), population.velocities().len());
        assert!(population.positions().iter().all(|p| p.within(WORLD_SIZE)));
        assert!(
            population
                .velocities()
                .iter()
                .all(|v| (v.magnitude() - AGENT_SPEED).abs() < 1e-4)
        );
    }

    #[test]
    fn initial_status_mix_tracks_configured_shares() {
        let config = SimConfig {
            agent_count: 20_000,
            rng_seed: Some(0xC1A0),
            ..SimConfig::default()
        };
        let mut rng = config.seeded_rng();
        let counts = Population::from_config(&config, &mut rng).status_counts();
        assert_eq!(counts.total(), 20_000);
        let share = |n: usize| n as f64 / 20_000.0;
        assert!((share(counts.burnout) - 0.10).abs() < 0.015, "{counts:?}");
        assert!((share(counts.unemployed) - 0.05).abs() < 0.015, "{counts:?}");
        assert!((share(counts.normal) - 0.85).abs() < 0.015, "{counts:?}");
    }

    #[test]
    fn status_tags_match_wire_encoding() {
        assert_eq!(AgentStatus::Normal.tag(), 0);
        assert_eq!(AgentStatus::Burnout.tag(), 1);
        assert_eq!(AgentStatus::Unemployed.tag(), 2);
        assert_eq!(AgentStatus::try_from(2), Ok(AgentStatus::Unemployed));
        assert_eq!(AgentStatus::try_from(3), Err(StatusTagError(3)));
        assert_eq!(StatusCounts::from_tags(&[0, 1, 7]), Err(StatusTagError(7)));
    }

    #[test]
    fn config_validation_rejects_bad_values() {
        assert!(SimConfig::default().validate().is_ok());
        let zero = SimConfig {
            agent_count: 0,
            ..SimConfig::default()
        };
        assert_eq!(
            zero.validate(),
            Err(SimError::InvalidConfig("agent_count must be non-zero"))
        );
        let shares = SimConfig {
            initial_burnout_share: 0.7,
            initial_unemployed_share: 0.5,
            ..SimConfig::default()
        };
        assert!(shares.validate().is_err());
        let world = SimConfig {
            world_size: f32::NAN,
            ..SimConfig::default()
        };
        assert!(world.validate().is_err());
    }

    #[test]
    fn from_parts_rejects_non_finite_velocities() {
        for velocity in [
            Velocity::new(f32::NAN, 0.0),
            Velocity::new(0.0, f32::INFINITY),
            Velocity::new(f32::NEG_INFINITY, 1.0),
        ] {
            let err = Population::from_parts(
                100.0,
                vec![Position::new(50.0, 50.0)],
                vec![velocity],
                vec![AgentStatus::Normal],
            )
            .expect_err("non-finite velocity");
            assert_eq!(err, SimError::InvalidConfig("velocities must be finite"));
        }

        let mut population =
            single_agent(Position::new(50.0, 50.0), Velocity::new(-7.5, 3.0), 100.0);
        for _ in 0..200 {
            population.step();
            assert!(population.positions()[0].within(100.0));
        }
    }

    #[test]
    fn from_parts_rejects_mismatched_columns() {
        let err = Population::from_parts(
            10.0,
            vec![Position::default(); 2],
            vec![Velocity::default(); 2],
            vec![AgentStatus::Normal],
        )
        .expect_err("mismatch");
        assert_eq!(
            err,
            SimError::MismatchedColumns {
                positions: 2,
                velocities: 2,
                statuses: 1
            }
        );
    }
}
