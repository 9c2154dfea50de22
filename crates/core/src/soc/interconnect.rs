//! Simulated SoC interconnect.
//!
//! This module implements the bus that routes addressed accesses to devices. It provides:
//! 1. **Device registration:** Devices are added by address range and sorted for lookup.
//! 2. **Access routing:** Read/write by address with a last-device hint for throughput.
//! 3. **Cycles:** Execution of a whole [`BusOp`] cycle under one borrow of the bus.
//! 4. **Tick:** Each device is ticked once per simulation step.

use tracing::trace;

use super::traits::Device;
use crate::access::{BusOp, OpKind};
use crate::common::{TransportError, Width};
use crate::soc::devices::{Backplane, Eca, MilController};

/// SoC bus connecting the firmware, the host bridge and the devices.
pub struct Bus {
    devices: Vec<Box<dyn Device>>,
    last_device_idx: usize,
    /// Number of cycles executed.
    pub cycles: u64,
    /// Number of operations executed.
    pub ops: u64,
}

impl std::fmt::Debug for Bus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bus")
            .field("devices", &self.devices.iter().map(|d| d.name()).collect::<Vec<_>>())
            .field("cycles", &self.cycles)
            .finish_non_exhaustive()
    }
}

impl Default for Bus {
    fn default() -> Self {
        Self::new()
    }
}

impl Bus {
    /// Creates an empty bus; add devices with `add_device`.
    pub const fn new() -> Self {
        Self {
            devices: Vec::new(),
            last_device_idx: 0,
            cycles: 0,
            ops: 0,
        }
    }

    /// Registers a device on the bus; devices are sorted by base address for lookup.
    ///
    /// # Arguments
    ///
    /// * `dev` - The device to add.
    pub fn add_device(&mut self, dev: Box<dyn Device>) {
        self.devices.push(dev);
        self.devices.sort_by_key(|d| d.address_range().0);
        self.last_device_idx = 0;
    }

    /// Returns the names and ranges of all devices, ordered by base address.
    pub fn devices(&self) -> impl Iterator<Item = (&str, u64, u64)> + '_ {
        self.devices.iter().map(|d| {
            let (base, size) = d.address_range();
            (d.name(), base, size)
        })
    }

    /// Returns whether the given address is claimed by any device.
    pub fn is_valid_address(&self, addr: u64) -> bool {
        self.devices.iter().any(|d| {
            let (start, size) = d.address_range();
            addr >= start && addr < start + size
        })
    }

    /// Advances all devices by one tick.
    ///
    /// # Returns
    ///
    /// The number of devices that raised an MSI.
    pub fn tick(&mut self) -> usize {
        self.devices.iter_mut().map(|d| d.tick()).filter(|raised| *raised).count()
    }

    /// Executes a cycle: every operation in order, reads filled in place.
    ///
    /// The cycle stops at the first unclaimed address.
    pub fn cycle(&mut self, ops: &mut [BusOp]) -> Result<(), TransportError> {
        self.cycles += 1;
        for op in ops.iter_mut() {
            self.ops += 1;
            match op.kind {
                OpKind::Read => op.value = self.read(op.addr, op.width)?,
                OpKind::Write => self.write(op.addr, op.width, op.value)?,
            }
        }
        trace!(len = ops.len(), "bus cycle");
        Ok(())
    }

    /// Reads one element of `width` at `addr`.
    pub fn read(&mut self, addr: u64, width: Width) -> Result<u64, TransportError> {
        let (dev, offset) = self.find_device(addr).ok_or(TransportError::BusError { addr })?;
        Ok(match width {
            Width::U8 => u64::from(dev.read_u8(offset)),
            Width::U16 => u64::from(dev.read_u16(offset)),
            Width::U32 => u64::from(dev.read_u32(offset)),
            Width::U64 => dev.read_u64(offset),
        })
    }

    /// Writes one element of `width` at `addr`.
    pub fn write(&mut self, addr: u64, width: Width, value: u64) -> Result<(), TransportError> {
        let (dev, offset) = self.find_device(addr).ok_or(TransportError::BusError { addr })?;
        match width {
            Width::U8 => dev.write_u8(offset, value as u8),
            Width::U16 => dev.write_u16(offset, value as u16),
            Width::U32 => dev.write_u32(offset, value as u32),
            Width::U64 => dev.write_u64(offset, value),
        }
        Ok(())
    }

    /// Returns the backplane, if one is attached.
    pub fn backplane_mut(&mut self) -> Option<&mut Backplane> {
        self.devices.iter_mut().find_map(|d| d.as_backplane_mut())
    }

    /// Returns the timing receiver, if one is attached.
    pub fn eca_mut(&mut self) -> Option<&mut Eca> {
        self.devices.iter_mut().find_map(|d| d.as_eca_mut())
    }

    /// Returns the extension-bus controller, if one is attached.
    pub fn mil_mut(&mut self) -> Option<&mut MilController> {
        self.devices.iter_mut().find_map(|d| d.as_mil_mut())
    }

    fn find_device(&mut self, addr: u64) -> Option<(&mut Box<dyn Device>, u64)> {
        if self.last_device_idx < self.devices.len() {
            let (start, size) = self.devices[self.last_device_idx].address_range();
            if addr >= start && addr < start + size {
                return Some((&mut self.devices[self.last_device_idx], addr - start));
            }
        }

        for (i, dev) in self.devices.iter_mut().enumerate() {
            let (start, size) = dev.address_range();
            if addr >= start && addr < start + size {
                self.last_device_idx = i;
                return Some((dev, addr - start));
            }
        }
        None
    }
}
