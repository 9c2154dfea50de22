//! Simulated SCU devices.
//!
//! This module contains the hardware the firmware drives, such as the backplane with
//! its FG and DAQ slave cards, the timing receiver queue, the extension-bus controller,
//! the LM32 shared RAM and the self-describing directory ROM.

/// Backplane master and slave cards.
pub mod backplane;

/// Big-endian byte memories (shared RAM, directory ROM).
pub mod byte_memory;

/// DAQ channel model.
pub mod daq_unit;

/// Timing receiver event queue.
pub mod eca;

/// Function generator model.
pub mod fg_unit;

/// Extension-bus port and controller.
pub mod mil;

pub use backplane::{Backplane, SlaveCard};
pub use byte_memory::ByteMemory;
pub use daq_unit::{DaqChannel, DaqUnit};
pub use eca::{Eca, TimingEvent};
pub use fg_unit::FgUnit;
pub use mil::{MilController, MilPort};

pub use crate::soc::traits::Device;
