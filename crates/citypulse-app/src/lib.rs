//! Execution shell for the CityPulse simulation: command bus, tick loop,
//! boundary sinks, and the worker thread that ties them together.

pub mod boundary;
pub mod command;
pub mod config;
pub mod control;
pub mod controller;
pub mod scheduler;
pub mod worker;

pub use boundary::{ChannelBoundary, JsonLinesBoundary};
pub use config::{ConfigOverrides, load_config, resolve_config};
pub use control::{ControlError, ControlHandle};
pub use controller::SimController;
pub use scheduler::TickScheduler;
pub use worker::{WorkerConfig, WorkerHandle, WorkerSummary, spawn_worker};
