//! The per-tick pipeline and the outbound message seam.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::alerts::{epoch_millis, optimize_alert};
use crate::{
    Alert, AlertEngine, Conversions, METRICS_INTERVAL, Metrics, PHASE1_TICKS,
    PerturbationProtocol, Population, ProtocolPhase, SimConfig, SimError, SnapshotFrame,
    SnapshotTransport, Tick, compute_metrics,
};

/// Messages sent from the simulation to the boundary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum OutboundMessage {
    Snapshot(SnapshotFrame),
    Metrics(Metrics),
    Alert(Alert),
}

impl OutboundMessage {
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Snapshot(_) => "snapshot",
            Self::Metrics(_) => "metrics",
            Self::Alert(_) => "alert",
        }
    }
}

/// Outbound sink. Emission is fire-and-forget: implementations must not block
/// the tick waiting for a consumer.
pub trait Boundary: Send {
    fn emit(&mut self, message: OutboundMessage);
}

/// Boundary that discards every message.
#[derive(Debug, Default)]
pub struct NullBoundary;

impl Boundary for NullBoundary {
    fn emit(&mut self, _message: OutboundMessage) {}
}

/// What happened during one call to [`Simulation::step`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct TickReport {
    pub tick: Tick,
    pub phase: ProtocolPhase,
    pub conversions: Conversions,
    /// Set on metrics ticks.
    pub metrics: Option<Metrics>,
    /// Threshold alerts raised this tick.
    pub alerts: usize,
}

/// Owns the population and every component that reads or writes it.
pub struct Simulation {
    config: SimConfig,
    tick: Tick,
    population: Population,
    protocol: PerturbationProtocol,
    alerts: AlertEngine,
    transport: SnapshotTransport,
    boundary: Box<dyn Boundary>,
    latest_metrics: Metrics,
}

impl fmt::Debug for Simulation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Simulation")
            .field("config", &self.config)
            .field("tick", &self.tick)
            .field("agent_count", &self.population.count())
            .field("protocol", &self.protocol)
            .field("latest_metrics", &self.latest_metrics)
            .finish()
    }
}

impl Simulation {
    /// Create a simulation whose messages are discarded.
    pub fn new(config: SimConfig) -> Result<Self, SimError> {
        Self::with_boundary(config, Box::new(NullBoundary))
    }

    /// Create a randomized population and emit its initial metrics to `boundary`.
    pub fn with_boundary(config: SimConfig, boundary: Box<dyn Boundary>) -> Result<Self, SimError> {
        config.validate()?;
        let mut rng = config.seeded_rng();
        let population = Population::from_config(&config, &mut rng);
        Self::from_population(config, population, boundary)
    }

    /// Wrap an existing population. `agent_count` and `world_size` are taken
    /// from the population rather than the config.
    pub fn from_population(
        mut config: SimConfig,
        population: Population,
        boundary: Box<dyn Boundary>,
    ) -> Result<Self, SimError> {
        config.agent_count = population.count();
        config.world_size = population.world_size();
        config.validate()?;

        let mut sim = Self {
            transport: SnapshotTransport::new(population.count()),
            config,
            tick: Tick::zero(),
            population,
            protocol: PerturbationProtocol::new(),
            alerts: AlertEngine::new(),
            boundary,
            latest_metrics: Metrics::default(),
        };
        let metrics = sim.publish_metrics();
        info!(
            agents = sim.population.count(),
            seed = ?sim.config.rng_seed,
            productivity = metrics.productivity,
            "population initialized"
        );
        Ok(sim)
    }

    /// Run one tick: move, perturb, snapshot, and on metrics ticks aggregate
    /// and check alerts.
    pub fn step(&mut self) -> TickReport {
        let tick = self.tick.next();
        self.tick = tick;

        self.population.step();

        let phase = self.protocol.phase(tick);
        let conversions = self.protocol.apply(&mut self.population, tick);
        if !conversions.is_empty() {
            debug!(tick = tick.0, phase = phase.label(), ?conversions, "protocol applied");
        }
        if self.protocol.elapsed(tick) == Some(PHASE1_TICKS) {
            info!(tick = tick.0, "protocol entered collapse phase");
        }

        let frame = self.transport.emit(&self.population);
        self.boundary.emit(OutboundMessage::Snapshot(frame));

        let mut report = TickReport {
            tick,
            phase,
            conversions,
            metrics: None,
            alerts: 0,
        };
        if tick.0.is_multiple_of(METRICS_INTERVAL) {
            let metrics = self.publish_metrics();
            report.metrics = Some(metrics);
            if phase.is_active() {
                report.alerts = self.evaluate_alerts(&metrics, phase == ProtocolPhase::Collapse);
            }
        }
        report
    }

    /// Recompute metrics and emit them immediately.
    pub fn publish_metrics(&mut self) -> Metrics {
        let metrics = compute_metrics(&self.population);
        self.latest_metrics = metrics;
        self.boundary.emit(OutboundMessage::Metrics(metrics));
        metrics
    }

    /// Activate the protocol at the current tick.
    ///
    /// Returns `false` without side effects if it is already active. On
    /// activation the fired-alert set is cleared and the optimize alert is sent.
    pub fn activate_protocol(&mut self) -> bool {
        if !self.protocol.activate(self.tick) {
            debug!(tick = self.tick.0, "protocol already active; ignoring activation");
            return false;
        }
        self.alerts.reset();
        info!(tick = self.tick.0, "optimization protocol activated");
        self.boundary
            .emit(OutboundMessage::Alert(optimize_alert(epoch_millis())));
        true
    }

    fn evaluate_alerts(&mut self, metrics: &Metrics, in_collapse: bool) -> usize {
        let raised = self.alerts.check(metrics, in_collapse, epoch_millis());
        let count = raised.len();
        for alert in raised {
            info!(
                tick = self.tick.0,
                key = %alert.key,
                severity = ?alert.severity,
                "alert raised"
            );
            self.boundary.emit(OutboundMessage::Alert(alert));
        }
        count
    }

    #[must_use]
    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// Last processed tick.
    #[must_use]
    pub const fn tick(&self) -> Tick {
        self.tick
    }

    #[must_use]
    pub fn population(&self) -> &Population {
        &self.population
    }

    #[must_use]
    pub fn protocol(&self) -> &PerturbationProtocol {
        &self.protocol
    }

    #[must_use]
    pub fn phase(&self) -> ProtocolPhase {
        self.protocol.phase(self.tick)
    }

    #[must_use]
    pub fn alert_engine(&self) -> &AlertEngine {
        &self.alerts
    }

    /// Metrics from the most recent aggregation.
    #[must_use]
    pub const fn latest_metrics(&self) -> Metrics {
        self.latest_metrics
    }

    #[must_use]
    pub const fn snapshots_emitted(&self) -> u64 {
        self.transport.emitted()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AgentStatus, OPTIMIZE_ALERT_KEY, Position, Velocity};
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct SpyBoundary {
        messages: Arc<Mutex<Vec<OutboundMessage>>>,
    }

    impl SpyBoundary {
        fn take(&self) -> Vec<OutboundMessage> {
            std::mem::take(&mut *self.messages.lock().expect("spy lock"))
        }
    }

    impl Boundary for SpyBoundary {
        fn emit(&mut self, message: OutboundMessage) {
            self.messages.lock().expect("spy lock").push(message);
        }
    }

    fn kinds(messages: &[OutboundMessage]) -> Vec<&'static str> {
        messages.iter().map(OutboundMessage::kind).collect()
    }

    fn uniform_sim(count: usize, status: AgentStatus, spy: &SpyBoundary) -> Simulation {
        let population = Population::from_parts(
            100.0,
            vec![Position::new(10.0, 10.0); count],
            vec![Velocity::new(1.0, 1.0); count],
            vec![status; count],
        )
        .expect("population");
        Simulation::from_population(SimConfig::default(), population, Box::new(spy.clone()))
            .expect("simulation")
    }

    #[test]
    fn initialization_publishes_metrics_once() {
        let spy = SpyBoundary::default();
        let config = SimConfig {
            agent_count: 500,
            rng_seed: Some(3),
            ..SimConfig::default()
        };
        let sim = Simulation::with_boundary(config, Box::new(spy.clone())).expect("simulation");
        let messages = spy.take();
        assert_eq!(kinds(&messages), vec!["metrics"]);
        assert_eq!(messages[0], OutboundMessage::Metrics(sim.latest_metrics()));
        assert_eq!(sim.tick(), Tick::zero());
    }

    #[test]
    fn snapshot_every_tick_and_metrics_every_tenth() {
        let spy = SpyBoundary::default();
        let mut sim = uniform_sim(50, AgentStatus::Normal, &spy);
        spy.take();

        for expected in 1..=25u64 {
            let report = sim.step();
            assert_eq!(report.tick, Tick(expected));
            assert_eq!(report.metrics.is_some(), expected % 10 == 0);
        }
        let messages = spy.take();
        let snapshots = messages
            .iter()
            .filter(|m| matches!(m, OutboundMessage::Snapshot(_)))
            .count();
        let metrics = messages
            .iter()
            .filter(|m| matches!(m, OutboundMessage::Metrics(_)))
            .count();
        assert_eq!(snapshots, 25);
        assert_eq!(metrics, 2);
        assert_eq!(sim.snapshots_emitted(), 25);
        // Metrics follow the snapshot of the same tick.
        assert_eq!(kinds(&messages[9..11]), vec!["snapshot", "metrics"]);
    }

    #[test]
    fn alerts_are_silent_while_protocol_is_inactive() {
        let spy = SpyBoundary::default();
        let mut sim = uniform_sim(100, AgentStatus::Burnout, &spy);
        for _ in 0..50 {
            assert_eq!(sim.step().alerts, 0);
        }
        assert!(
            !spy
                .take()
                .iter()
                .any(|m| matches!(m, OutboundMessage::Alert(_)))
        );
    }

    #[test]
    fn activation_emits_optimize_alert_once() {
        let spy = SpyBoundary::default();
        let mut sim = uniform_sim(100, AgentStatus::Normal, &spy);
        spy.take();

        assert!(sim.activate_protocol());
        assert!(!sim.activate_protocol());
        let messages = spy.take();
        assert_eq!(messages.len(), 1);
        match &messages[0] {
            OutboundMessage::Alert(alert) => assert_eq!(alert.key, OPTIMIZE_ALERT_KEY),
            other => panic!("unexpected message {other:?}"),
        }
        assert_eq!(sim.phase(), ProtocolPhase::Recovery);
    }

    #[test]
    fn threshold_alerts_fire_on_metrics_ticks_after_activation() {
        let spy = SpyBoundary::default();
        let mut sim = uniform_sim(100, AgentStatus::Burnout, &spy);
        sim.activate_protocol();
        spy.take();

        let mut raised = 0;
        for _ in 0..30 {
            let report = sim.step();
            if report.tick.0 % 10 != 0 {
                assert_eq!(report.alerts, 0);
            }
            raised += report.alerts;
        }
        let alert_keys: Vec<String> = spy
            .take()
            .into_iter()
            .filter_map(|m| match m {
                OutboundMessage::Alert(alert) => Some(alert.key.into_owned()),
                _ => None,
            })
            .collect();
        assert_eq!(alert_keys.len(), raised);
        assert_eq!(alert_keys, vec!["burnout30", "burnout50", "happy20", "prod50"]);
    }

    #[test]
    fn outbound_messages_carry_type_tags() {
        let json = serde_json::to_value(OutboundMessage::Metrics(Metrics::default()))
            .expect("json");
        assert_eq!(json["type"], "metrics");
        assert_eq!(json["productivity"], 0.0);
    }
}
