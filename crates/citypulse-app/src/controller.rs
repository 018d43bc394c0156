use std::time::{Duration, Instant};

use citypulse_core::{SimCommand, Simulation, SpeedMultiplier, TickReport};
use tracing::{debug, info};

use crate::scheduler::TickScheduler;

/// Execution loop state: running flag, speed, and the tick timer.
///
/// All mutation happens through [`SimController::apply`] or the named
/// commands, which the worker invokes strictly between ticks.
#[derive(Debug)]
pub struct SimController {
    sim: Simulation,
    scheduler: TickScheduler,
    running: bool,
    speed: SpeedMultiplier,
    base_period: Duration,
}

impl SimController {
    /// Wrap a simulation in the paused state at speed x1.
    pub fn new(sim: Simulation) -> Self {
        let base_period = Duration::from_millis(sim.config().base_tick_ms);
        Self {
            sim,
            scheduler: TickScheduler::new(),
            running: false,
            speed: SpeedMultiplier::default(),
            base_period,
        }
    }

    pub fn apply(&mut self, command: SimCommand, now: Instant) {
        match command {
            SimCommand::Start => self.start(now),
            SimCommand::Pause => self.pause(),
            SimCommand::SetSpeed(speed) => self.set_speed(speed, now),
            SimCommand::ActivateProtocol => {
                self.activate_protocol();
            }
        }
    }

    /// Run (or keep running) and push fresh metrics to the boundary.
    pub fn start(&mut self, now: Instant) {
        self.running = true;
        self.scheduler.arm(self.tick_period(), now);
        self.sim.publish_metrics();
        info!(
            tick = self.sim.tick().0,
            speed = %self.speed,
            period = ?self.tick_period(),
            "simulation started"
        );
    }

    pub fn pause(&mut self) {
        self.scheduler.disarm();
        if self.running {
            info!(tick = self.sim.tick().0, "simulation paused");
        }
        self.running = false;
    }

    /// Change speed; a running timer is cancelled and rescheduled at the new period.
    pub fn set_speed(&mut self, speed: SpeedMultiplier, now: Instant) {
        self.speed = speed;
        if self.running {
            self.scheduler.arm(self.tick_period(), now);
        }
        info!(%speed, running = self.running, "speed changed");
    }

    /// Returns `false` when the protocol was already active.
    pub fn activate_protocol(&mut self) -> bool {
        self.sim.activate_protocol()
    }

    /// Run one tick if the timer is due.
    pub fn poll(&mut self, now: Instant) -> Option<TickReport> {
        if !self.running || !self.scheduler.poll(now) {
            return None;
        }
        let report = self.sim.step();
        if report.alerts > 0 {
            debug!(tick = report.tick.0, alerts = report.alerts, "alerts raised this tick");
        }
        Some(report)
    }

    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.scheduler.next_deadline()
    }

    #[must_use]
    pub fn tick_period(&self) -> Duration {
        self.speed.tick_period(self.base_period)
    }

    #[must_use]
    pub const fn is_running(&self) -> bool {
        self.running
    }

    #[must_use]
    pub const fn speed(&self) -> SpeedMultiplier {
        self.speed
    }

    #[must_use]
    pub fn simulation(&self) -> &Simulation {
        &self.sim
    }

    /// Stop the timer and give back the simulation.
    pub fn shutdown(mut self) -> Simulation {
        self.scheduler.disarm();
        self.running = false;
        self.sim
    }
}
