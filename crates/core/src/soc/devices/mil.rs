//! Extension-bus (MIL) port and controller.
//!
//! A port reaches a set of interface cards (`ifk` addresses), each carrying one FG.
//! The same port model sits behind a backplane adapter card and on the controller's
//! own register window. MIL FGs raise no interrupts; the firmware polls them.

use std::collections::BTreeMap;

use tracing::debug;

use super::fg_unit::FgUnit;
use crate::protocol::slave::mil;
use crate::soc::traits::Device;

/// Size of the controller register window.
pub const MIL_WINDOW: u64 = 0x10000;

/// Interface cards behind one extension-bus port.
#[derive(Debug, Default)]
pub struct MilPort {
    ifks: BTreeMap<u8, FgUnit>,
    broadcasts: u16,
}

impl MilPort {
    /// Creates a port with one FG per listed interface card.
    pub fn new(ifks: &[u8]) -> Self {
        Self {
            ifks: ifks.iter().map(|&ifk| (ifk, FgUnit::new())).collect(),
            broadcasts: 0,
        }
    }

    /// Broadcast starts received.
    pub const fn broadcasts(&self) -> u16 {
        self.broadcasts
    }

    /// FG of interface card `ifk`.
    pub fn fg(&self, ifk: u8) -> Option<&FgUnit> {
        self.ifks.get(&ifk)
    }

    /// Returns `true` if `offset` belongs to the port's register set.
    pub const fn claims(offset: u64) -> bool {
        offset == mil::BROADCAST
            || (offset >= mil::IFK_COUNT && offset < mil::IFK_LIST + 2 * 256)
            || offset >= mil::FG_BASE
    }

    fn locate(offset: u64) -> Option<(u8, u64)> {
        let rel = offset.checked_sub(mil::FG_BASE)?;
        let ifk = u8::try_from(rel / mil::FG_STRIDE).ok()?;
        Some((ifk, rel % mil::FG_STRIDE))
    }

    /// Reads a port register.
    pub fn read(&self, offset: u64) -> u16 {
        match offset {
            mil::BROADCAST => self.broadcasts,
            mil::IFK_COUNT => self.ifks.len() as u16,
            o if o >= mil::IFK_LIST && o < mil::FG_BASE => {
                let k = ((o - mil::IFK_LIST) / 2) as usize;
                self.ifks.keys().nth(k).map_or(0, |&ifk| u16::from(ifk))
            }
            o => Self::locate(o)
                .and_then(|(ifk, reg)| self.ifks.get(&ifk).map(|fg| fg.read(reg)))
                .unwrap_or(0),
        }
    }

    /// Writes a port register; a write to `BROADCAST` starts every enabled FG.
    pub fn write(&mut self, offset: u64, val: u16) {
        if offset == mil::BROADCAST {
            self.broadcasts = self.broadcasts.wrapping_add(1);
            self.ifks.values_mut().for_each(FgUnit::start);
            debug!(count = self.broadcasts, "mil broadcast start");
            return;
        }
        if let Some((ifk, reg)) = Self::locate(offset)
            && let Some(fg) = self.ifks.get_mut(&ifk)
        {
            fg.write(reg, val);
        }
    }

    /// Advances all FGs by one tick.
    pub fn tick(&mut self) {
        for fg in self.ifks.values_mut() {
            let _ = fg.tick();
        }
    }
}

/// Extension-bus controller on the SoC bus.
#[derive(Debug)]
pub struct MilController {
    base: u64,
    port: MilPort,
}

impl MilController {
    /// Creates a controller at `base` reaching the listed interface cards.
    pub fn new(base: u64, ifks: &[u8]) -> Self {
        Self {
            base,
            port: MilPort::new(ifks),
        }
    }

    /// The controller's port.
    pub const fn port(&self) -> &MilPort {
        &self.port
    }
}

impl Device for MilController {
    fn name(&self) -> &str {
        "MIL"
    }

    fn address_range(&self) -> (u64, u64) {
        (self.base, MIL_WINDOW)
    }

    fn read_u16(&mut self, offset: u64) -> u16 {
        self.port.read(offset)
    }

    fn write_u16(&mut self, offset: u64, val: u16) {
        self.port.write(offset, val);
    }

    fn tick(&mut self) -> bool {
        self.port.tick();
        false
    }

    fn as_mil_mut(&mut self) -> Option<&mut MilController> {
        Some(self)
    }
}
