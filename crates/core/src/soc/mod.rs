//! Simulated System-on-Chip.
//!
//! This module organizes the hardware the firmware runs against on a workstation:
//! the bus, the MSI arrival queue, RAM devices, slave cards and the builder that
//! assembles them, plus the transport both firmware and host use to reach the bus.

/// SoC builder and top-level handle.
pub mod builder;

/// Memory-mapped device implementations.
pub mod devices;

/// Bus interconnect and routing.
pub mod interconnect;

/// RAM devices.
pub mod memory;

/// MSI arrival queue.
pub mod msi;

/// Device trait.
pub mod traits;

/// Transport over the simulated bus.
pub mod transport;

pub use builder::{Soc, SocBuilder};
pub use msi::MsiQueue;
pub use transport::SocTransport;
