//! Device memories over the connection.
//!
//! The host finds both memories through the bus directory: the LM32 shared memory
//! carrying commands, FG registers and firmware counters, and the off-chip RAM
//! carrying the partition table and the DAQ ring. RAM windows are registered with
//! the connection so their cycles are measured as RAM access.

use std::sync::Arc;

use scu_core::directory::{
    DEVICE_DDR3_BURST, DEVICE_DDR3_TRANSPARENT, DEVICE_LM32_RAM_USER, Directory, VENDOR_GSI,
};
use scu_core::protocol::SharedMemory;
use scu_core::ram::{Mmu, RamDevice};
use tracing::debug;

use crate::config::HostConfig;
use crate::connection::Connection;
use crate::error::HostError;

/// Off-chip RAM driver over a connection.
pub type HostRam = RamDevice<Arc<Connection>>;

/// LM32 shared memory over a connection.
pub type HostShared = SharedMemory<Arc<Connection>>;

/// Locates the off-chip RAM and builds the configured driver.
///
/// Reads go through the transparent window unless `config.burst` is set and the
/// device has a burst fifo.
pub fn open_ram(conn: &Arc<Connection>, config: &HostConfig) -> Result<HostRam, HostError> {
    let directory = Directory::new(&**conn, config.directory_root);
    for device in [DEVICE_DDR3_TRANSPARENT, DEVICE_DDR3_BURST] {
        if let Some(window) = directory.find(VENDOR_GSI, device, 0)? {
            conn.add_ram_window(window.base..window.base + window.size);
        }
    }
    RamDevice::discover(Arc::clone(conn), config.directory_root, &config.memory())?
        .ok_or(HostError::DeviceAbsent("off-chip ram"))
}

/// Opens the partition table of the off-chip RAM.
pub fn open_mmu(conn: &Arc<Connection>, config: &HostConfig) -> Result<Mmu<HostRam>, HostError> {
    let ram = open_ram(conn, config)?;
    Ok(Mmu::new(ram, config.memory.mmu_anchor))
}

/// Locates the LM32 shared memory and checks the firmware initialized it.
pub fn open_shared(conn: &Arc<Connection>, config: &HostConfig) -> Result<HostShared, HostError> {
    let base = Directory::new(&**conn, config.directory_root)
        .find(VENDOR_GSI, DEVICE_LM32_RAM_USER, 0)?
        .ok_or(HostError::DeviceAbsent("lm32 shared memory"))?
        .base;
    let shared = SharedMemory::new(Arc::clone(conn), base);
    if !shared.is_initialized()? {
        return Err(HostError::NotInitialized);
    }
    debug!(base = format_args!("{base:#x}"), "shared memory found");
    Ok(shared)
}
