//! Simulated off-chip RAM.
//!
//! This module implements the RAM devices behind the firmware's RAM driver. It provides:
//! 1. **Buffer:** Lazily allocated word storage (`DramBuffer`).
//! 2. **SRAM:** A plain 64-bit word RAM mapped at a base address.
//! 3. **DDR3:** The transparent two-half window plus the burst fifo.

/// Lazily allocated word storage.
pub mod buffer;

/// DDR3 controller with transparent and burst windows.
pub mod ddr3;

pub use ddr3::Ddr3Device;

use self::buffer::DramBuffer;
use crate::soc::traits::Device;

/// Word-addressed SRAM; word `i` lives at `base + 8·i`, bus byte order.
#[derive(Debug)]
pub struct Sram {
    buffer: DramBuffer,
    base: u64,
}

impl Sram {
    /// Creates an SRAM of `capacity64` words at `base`.
    pub fn new(base: u64, capacity64: u64) -> std::io::Result<Self> {
        Ok(Self {
            buffer: DramBuffer::new(capacity64 as usize)?,
            base,
        })
    }
}

impl Device for Sram {
    fn name(&self) -> &str {
        "SRAM"
    }

    fn address_range(&self) -> (u64, u64) {
        (self.base, self.buffer.len() as u64 * 8)
    }

    fn read_u16(&mut self, offset: u64) -> u16 {
        let shift = 48 - (offset & 6) * 8;
        (self.buffer.read((offset / 8) as usize) >> shift) as u16
    }

    fn read_u32(&mut self, offset: u64) -> u32 {
        let word = self.buffer.read((offset / 8) as usize);
        if offset & 4 == 0 { (word >> 32) as u32 } else { word as u32 }
    }

    fn read_u64(&mut self, offset: u64) -> u64 {
        self.buffer.read((offset / 8) as usize)
    }

    fn write_u16(&mut self, offset: u64, val: u16) {
        let index = (offset / 8) as usize;
        let shift = 48 - (offset & 6) * 8;
        let word = self.buffer.read(index) & !(0xFFFF << shift) | u64::from(val) << shift;
        self.buffer.write(index, word);
    }

    fn write_u32(&mut self, offset: u64, val: u32) {
        let index = (offset / 8) as usize;
        let word = self.buffer.read(index);
        let word = if offset & 4 == 0 {
            word & 0xFFFF_FFFF | u64::from(val) << 32
        } else {
            word & !0xFFFF_FFFF | u64::from(val)
        };
        self.buffer.write(index, word);
    }

    fn write_u64(&mut self, offset: u64, val: u64) {
        self.buffer.write((offset / 8) as usize, val);
    }
}
