//! Dedicated simulation thread.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use citypulse_core::{Metrics, ProtocolPhase, Simulation, Tick};
use tracing::info;

use crate::command::{
    CommandReceiver, DEFAULT_COMMAND_CAPACITY, create_command_bus, drain_pending_commands,
};
use crate::control::ControlHandle;
use crate::controller::SimController;

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub command_capacity: usize,
    /// Longest the loop sleeps before re-checking the command queue.
    pub idle_poll: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            command_capacity: DEFAULT_COMMAND_CAPACITY,
            idle_poll: Duration::from_millis(5),
        }
    }
}

/// Final state reported when the worker stops.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorkerSummary {
    pub tick: Tick,
    pub snapshots: u64,
    pub commands_applied: u64,
    pub phase: ProtocolPhase,
    pub metrics: Metrics,
}

/// Owns the worker thread. Dropping the handle stops and joins it.
pub struct WorkerHandle {
    control: ControlHandle,
    stop: Arc<AtomicBool>,
    thread: Option<thread::JoinHandle<WorkerSummary>>,
}

impl WorkerHandle {
    /// Handle for queueing commands; may be cloned freely.
    #[must_use]
    pub fn control(&self) -> ControlHandle {
        self.control.clone()
    }

    /// Stop the loop after the current iteration and wait for it to exit.
    pub fn shutdown(mut self) -> Result<WorkerSummary> {
        self.stop.store(true, Ordering::Release);
        let thread = self
            .thread
            .take()
            .ok_or_else(|| anyhow!("simulation worker already joined"))?;
        thread
            .join()
            .map_err(|_| anyhow!("simulation worker thread panicked"))
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

/// Move `sim` onto a named thread driven by its own command bus.
///
/// The simulation starts paused; send `start` through the returned handle.
pub fn spawn_worker(sim: Simulation, config: WorkerConfig) -> Result<WorkerHandle> {
    let (sender, receiver) = create_command_bus(config.command_capacity);
    let stop = Arc::new(AtomicBool::new(false));
    let worker_stop = Arc::clone(&stop);
    let idle_poll = config.idle_poll;

    let thread = thread::Builder::new()
        .name("citypulse-sim".into())
        .spawn(move || run_loop(SimController::new(sim), &receiver, &worker_stop, idle_poll))
        .context("failed to spawn simulation worker thread")?;

    Ok(WorkerHandle {
        control: ControlHandle::new(sender),
        stop,
        thread: Some(thread),
    })
}

fn run_loop(
    mut controller: SimController,
    receiver: &CommandReceiver,
    stop: &AtomicBool,
    idle_poll: Duration,
) -> WorkerSummary {
    let mut commands_applied = 0u64;
    while !stop.load(Ordering::Acquire) {
        let applied = drain_pending_commands(receiver, &mut controller, Instant::now());
        commands_applied += applied as u64;
        controller.poll(Instant::now());

        let now = Instant::now();
        let wait = match controller.next_deadline() {
            Some(deadline) => deadline.saturating_duration_since(now).min(idle_poll),
            None => idle_poll,
        };
        if !wait.is_zero() {
            thread::sleep(wait);
        }
    }

    let sim = controller.shutdown();
    let summary = WorkerSummary {
        tick: sim.tick(),
        snapshots: sim.snapshots_emitted(),
        commands_applied,
        phase: sim.phase(),
        metrics: sim.latest_metrics(),
    };
    info!(
        tick = summary.tick.0,
        snapshots = summary.snapshots,
        commands = summary.commands_applied,
        phase = summary.phase.label(),
        "simulation worker stopped"
    );
    summary
}
