//! Workstation simulation.
//!
//! Pairs the simulated SoC with the firmware application and advances both one
//! scheduler tick at a time, either stepped by the caller or free-running on a
//! background thread while a host library talks to the bus.

/// Simulator and its background runner.
pub mod simulator;

pub use simulator::{RunningSimulator, Simulator};
