//! Off-chip RAM access and the shared-RAM protocol.
//!
//! This module implements word access to the RAM shared by firmware and host. It provides:
//! 1. **Capability:** The `RamAccess` trait over 64-bit word indices.
//! 2. **Drivers:** DDR3 (ordered halves, optional burst fifo) and SRAM (plain words).
//! 3. **Partition table:** The tagged list of contiguous regions (`mmu`).
//! 4. **Ring admin:** Producer/consumer indices of a ring kept in one partition (`ring`).

use std::sync::Arc;

use thiserror::Error;

use tracing::debug;

use crate::access::{self, Transport};
use crate::common::{AddrMode, Format, TransportError};
use crate::config::{MemoryConfig, RamKind};
use crate::directory::{DEVICE_DDR3_BURST, DEVICE_DDR3_TRANSPARENT, Directory, VENDOR_GSI};

/// DDR3 driver.
pub mod ddr3;

/// Partition table.
pub mod mmu;

/// Ring buffer admin.
pub mod ring;

pub use ddr3::{BurstRegs, Ddr3};
pub use mmu::{AllocStatus, Allocation, Mmu, MmuError, Partition};
pub use ring::{RingAdmin, RingIndexes, SharedRing};

/// Payload words of the admin block that precedes every ring.
pub use ring::RING_ADMIN_WORDS;

/// Failure of a RAM access.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RamError {
    /// The poll callback of a burst read returned a negative value.
    #[error("burst read aborted by poll callback ({0})")]
    Aborted(i32),
    /// The access exceeds the device capacity.
    #[error("access of {len} words at {index} exceeds capacity {capacity}")]
    OutOfRange {
        /// First word index.
        index: u64,
        /// Number of words.
        len: usize,
        /// Capacity in words.
        capacity: u64,
    },
    /// The burst fifo is not initialized or delivered an unexpected amount.
    #[error("burst fifo protocol error: {0}")]
    Fifo(&'static str),
    /// The burst window is not configured.
    #[error("burst window not available")]
    NoBurstWindow,
    /// Serial-bus transport failure.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Word-indexed access to a shared RAM.
pub trait RamAccess {
    /// Reads `out.len()` words starting at word `index`.
    fn read64(&self, index: u64, out: &mut [u64]) -> Result<(), RamError>;

    /// Writes `data` starting at word `index`.
    fn write64(&self, index: u64, data: &[u64]) -> Result<(), RamError>;

    /// Capacity in 64-bit words.
    fn capacity64(&self) -> u64;

    /// Fails with [`RamError::OutOfRange`] if `len` words at `index` exceed the capacity.
    fn check_range(&self, index: u64, len: usize) -> Result<(), RamError> {
        let capacity = self.capacity64();
        match index.checked_add(len as u64) {
            Some(end) if end <= capacity => Ok(()),
            _ => Err(RamError::OutOfRange {
                index,
                len,
                capacity,
            }),
        }
    }
}

impl<R: RamAccess + ?Sized> RamAccess for &R {
    fn read64(&self, index: u64, out: &mut [u64]) -> Result<(), RamError> {
        (**self).read64(index, out)
    }

    fn write64(&self, index: u64, data: &[u64]) -> Result<(), RamError> {
        (**self).write64(index, data)
    }

    fn capacity64(&self) -> u64 {
        (**self).capacity64()
    }
}

impl<R: RamAccess + ?Sized> RamAccess for Arc<R> {
    fn read64(&self, index: u64, out: &mut [u64]) -> Result<(), RamError> {
        (**self).read64(index, out)
    }

    fn write64(&self, index: u64, data: &[u64]) -> Result<(), RamError> {
        (**self).write64(index, data)
    }

    fn capacity64(&self) -> u64 {
        (**self).capacity64()
    }
}

/// Static RAM: word `i` is one 64-bit bus access at `base + 8·i`.
#[derive(Clone)]
pub struct Sram<T> {
    transport: T,
    base: u64,
    capacity64: u64,
}

impl<T> std::fmt::Debug for Sram<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sram")
            .field("base", &format_args!("{:#x}", self.base))
            .field("capacity64", &self.capacity64)
            .finish_non_exhaustive()
    }
}

impl<T: Transport> Sram<T> {
    /// Creates a driver for the SRAM window at `base`.
    pub const fn new(transport: T, base: u64, capacity64: u64) -> Self {
        Self {
            transport,
            base,
            capacity64,
        }
    }
}

impl<T: Transport> RamAccess for Sram<T> {
    fn read64(&self, index: u64, out: &mut [u64]) -> Result<(), RamError> {
        self.check_range(index, out.len())?;
        access::read(&self.transport, self.base + index * 8, out, Format::BE64, AddrMode::Linear)?;
        Ok(())
    }

    fn write64(&self, index: u64, data: &[u64]) -> Result<(), RamError> {
        self.check_range(index, data.len())?;
        access::write(&self.transport, self.base + index * 8, data, Format::BE64, AddrMode::Linear)?;
        Ok(())
    }

    fn capacity64(&self) -> u64 {
        self.capacity64
    }
}

/// RAM driver selected at configuration time.
#[derive(Clone)]
pub enum RamDevice<T> {
    /// DDR3 with ordered halves and an optional burst fifo.
    Ddr3(Ddr3<T>),
    /// Plain 64-bit word SRAM.
    Sram(Sram<T>),
}

impl<T> std::fmt::Debug for RamDevice<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ddr3(ram) => ram.fmt(f),
            Self::Sram(ram) => ram.fmt(f),
        }
    }
}

impl<T: Transport> RamDevice<T> {
    /// Locates the RAM through the bus directory and builds the configured driver.
    ///
    /// # Returns
    ///
    /// `None` if the directory has no RAM window.
    pub fn discover(transport: T, root: u64, memory: &MemoryConfig) -> Result<Option<Self>, TransportError> {
        let directory = Directory::new(&transport, root);
        let Some(window) = directory.find(VENDOR_GSI, DEVICE_DDR3_TRANSPARENT, 0)? else {
            return Ok(None);
        };
        let capacity64 = (window.size / 8).min(memory.capacity64);
        let device = match memory.kind {
            RamKind::Sram => Self::Sram(Sram::new(transport, window.base, capacity64)),
            RamKind::Ddr3 => {
                let burst = directory.find(VENDOR_GSI, DEVICE_DDR3_BURST, 0)?.map(|r| r.base);
                let mut ddr3 = Ddr3::new(transport, window.base, capacity64);
                if let Some(base) = burst {
                    ddr3 = ddr3.with_burst(base);
                    ddr3.set_burst_read(memory.burst_read);
                }
                Self::Ddr3(ddr3)
            }
        };
        debug!(base = format_args!("{:#x}", window.base), capacity64, kind = ?memory.kind, "ram discovered");
        Ok(Some(device))
    }
}

impl<T: Transport> RamAccess for RamDevice<T> {
    fn read64(&self, index: u64, out: &mut [u64]) -> Result<(), RamError> {
        match self {
            Self::Ddr3(ram) => ram.read64(index, out),
            Self::Sram(ram) => ram.read64(index, out),
        }
    }

    fn write64(&self, index: u64, data: &[u64]) -> Result<(), RamError> {
        match self {
            Self::Ddr3(ram) => ram.write64(index, data),
            Self::Sram(ram) => ram.write64(index, data),
        }
    }

    fn capacity64(&self) -> u64 {
        match self {
            Self::Ddr3(ram) => ram.capacity64(),
            Self::Sram(ram) => ram.capacity64(),
        }
    }
}
