//! SCU real-time core library.
//!
//! This crate implements the accelerator-control firmware of an SCU front-end together
//! with the hardware it runs against:
//! 1. **Access:** Serial-bus transport seam, typed register access and the bus directory.
//! 2. **RTOS:** Interrupt fabric, refcounted critical sections, queues and the scheduler.
//! 3. **RAM:** DDR3 and SRAM drivers, the partition table and the shared ring.
//! 4. **Protocol:** Shared-memory layout, command words and the DAQ block format.
//! 5. **Firmware:** FG dispatcher, timing handler, DAQ assembler and command handler.
//! 6. **SoC:** Simulated backplane, slave cards, RAM and timing receiver.
//! 7. **Simulation:** The simulator pairing SoC and firmware, plus statistics.

/// Serial-bus transport and typed register access.
pub mod access;
/// Common types and constants (slots, sockets, widths, errors).
pub mod common;
/// Firmware configuration (defaults, enums, hierarchical config structures).
pub mod config;
/// Self-describing bus directory.
pub mod directory;
/// Firmware application (tasks, dispatcher, DAQ assembler, command handler).
pub mod firmware;
/// Wire formats shared by firmware and host.
pub mod protocol;
/// Off-chip RAM drivers, partition table and ring buffer.
pub mod ram;
/// Interrupts, queues and the tick-driven scheduler.
pub mod rtos;
/// Simulator pairing the SoC with the firmware.
pub mod sim;
/// System-on-chip (builder, bus, devices, memory, traits).
pub mod soc;
/// Firmware statistics collection and reporting.
pub mod stats;

/// Root configuration type; use `Config::default()` or deserialize from JSON.
pub use crate::config::Config;
/// Firmware application; construct with `Application::new`.
pub use crate::firmware::Application;
/// Simulated SoC; construct with `Soc::builder`.
pub use crate::soc::Soc;
/// SoC plus firmware, ticked together.
pub use crate::sim::Simulator;
