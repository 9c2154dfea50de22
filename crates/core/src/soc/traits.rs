//! Device trait for memory-mapped registers on the simulated SoC bus.
//!
//! This module defines the `Device` trait implemented by all bus-attached components. It provides:
//! 1. **Identification:** `name` and `address_range` for bus routing.
//! 2. **Access:** 8/16/32/64-bit read/write at device-relative offsets, bus byte order.
//! 3. **Lifecycle:** Optional `tick` for devices that progress over time and raise MSIs.
//! 4. **Downcasting:** Optional casts to the backplane, the timing receiver and the
//!    extension-bus controller for test and scenario injection.
//!
//! All implementors must be `Send` because the bus is shared behind a mutex between the
//! firmware, the host library and the simulation driver.

use crate::soc::devices::{Backplane, Eca, MilController};

/// Trait for memory-mapped devices attached to the simulated SoC bus.
///
/// Values are exchanged as the big-endian bus presents them; a 16-bit register
/// read returns the register value, not its byte-swapped image.
pub trait Device: Send {
    /// Returns a short name for this device (e.g., `"DDR3"`, `"SCUBUS"`).
    fn name(&self) -> &str;
    /// Returns (base_address, size_in_bytes) for this device's register or memory region.
    fn address_range(&self) -> (u64, u64);
    /// Reads one byte at the given device-relative offset.
    fn read_u8(&mut self, offset: u64) -> u8 {
        let word = self.read_u16(offset & !1);
        if offset & 1 == 0 { (word >> 8) as u8 } else { word as u8 }
    }
    /// Reads a 16-bit register at the given offset.
    fn read_u16(&mut self, offset: u64) -> u16;
    /// Reads a 32-bit register at the given offset.
    fn read_u32(&mut self, offset: u64) -> u32 {
        u32::from(self.read_u16(offset)) << 16 | u32::from(self.read_u16(offset + 2))
    }
    /// Reads a 64-bit word at the given offset.
    fn read_u64(&mut self, offset: u64) -> u64 {
        u64::from(self.read_u32(offset)) << 32 | u64::from(self.read_u32(offset + 4))
    }
    /// Writes one byte at the given offset (read-modify-write of the containing half-word).
    fn write_u8(&mut self, offset: u64, val: u8) {
        let word = self.read_u16(offset & !1);
        let merged = if offset & 1 == 0 {
            (word & 0x00FF) | u16::from(val) << 8
        } else {
            (word & 0xFF00) | u16::from(val)
        };
        self.write_u16(offset & !1, merged);
    }
    /// Writes a 16-bit register at the given offset.
    fn write_u16(&mut self, offset: u64, val: u16);
    /// Writes a 32-bit register at the given offset.
    fn write_u32(&mut self, offset: u64, val: u32) {
        self.write_u16(offset, (val >> 16) as u16);
        self.write_u16(offset + 2, val as u16);
    }
    /// Writes a 64-bit word at the given offset.
    fn write_u64(&mut self, offset: u64, val: u64) {
        self.write_u32(offset, (val >> 32) as u32);
        self.write_u32(offset + 4, val as u32);
    }

    /// Advances device state by one tick; returns `true` if an MSI was raised.
    fn tick(&mut self) -> bool {
        false
    }

    /// Returns a mutable reference as `Backplane` if this device is the backplane; otherwise `None`.
    fn as_backplane_mut(&mut self) -> Option<&mut Backplane> {
        None
    }
    /// Returns a mutable reference as `Eca` if this device is the timing receiver; otherwise `None`.
    fn as_eca_mut(&mut self) -> Option<&mut Eca> {
        None
    }
    /// Returns a mutable reference as `MilController` if this device is the extension-bus controller.
    fn as_mil_mut(&mut self) -> Option<&mut MilController> {
        None
    }
}
