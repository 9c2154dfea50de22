//! Slave enumeration.
//!
//! Every backplane slot is probed through its identification registers. An empty
//! slot answers with the `0xDEAD` pattern, a foreign card with another system id.
//! Extension-bus ports list their interface cards in a count register followed by
//! one 16-bit address per card.

use tracing::{debug, info};

use crate::access::{self, BusOp, Transport, TransportExt};
use crate::common::constants::EMPTY_SLOT_PATTERN;
use crate::common::{AddrMode, Format, Slot, TransportError, Width};
use crate::protocol::slave::{self, mil};

/// Identity of a card found on the backplane.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SlaveInfo {
    /// Slot the card sits in.
    pub slot: Slot,
    /// Card group id.
    pub group: u16,
    /// Card firmware version.
    pub version: u16,
}

impl SlaveInfo {
    /// Number of FGs on the card.
    pub const fn fg_count(&self) -> u8 {
        match self.group {
            slave::GRP_ADDAC => 2,
            slave::GRP_ACU => 1,
            _ => 0,
        }
    }

    /// Returns `true` for cards carrying DAQ channels.
    pub const fn has_daq(&self) -> bool {
        matches!(self.group, slave::GRP_ADDAC | slave::GRP_DAQ)
    }

    /// Returns `true` for extension-bus adapter cards.
    pub const fn is_mil_adapter(&self) -> bool {
        self.group == slave::GRP_MIL_ADAPTER
    }
}

/// Probes slots `1..=slots` of the backplane at `bus_base`.
///
/// # Arguments
///
/// * `transport` - Transport to the backplane.
/// * `bus_base` - Base address of the backplane window (slot 0).
/// * `slots` - Number of equipped slots.
///
/// # Returns
///
/// The cards found, in ascending slot order.
pub fn scan<T: Transport + ?Sized>(transport: &T, bus_base: u64, slots: u8) -> Result<Vec<SlaveInfo>, TransportError> {
    let mut found = Vec::new();
    for slot in Slot::all().filter(|s| s.number() <= slots) {
        let base = slot.base_address(bus_base);
        let mut ops = [
            BusOp::read(base + slave::CID_SYSTEM, Width::U16),
            BusOp::read(base + slave::CID_GROUP, Width::U16),
            BusOp::read(base + slave::SLAVE_VERSION, Width::U16),
        ];
        transport.cycle(&mut ops)?;
        let [system, group, version] = ops.map(|op| op.value as u16);
        if system == EMPTY_SLOT_PATTERN {
            continue;
        }
        if system != slave::SYS_CSCO {
            debug!(%slot, system, "foreign card ignored");
            continue;
        }
        info!(%slot, group, version, "slave found");
        found.push(SlaveInfo { slot, group, version });
    }
    Ok(found)
}

/// Lists the interface cards of the extension-bus port at `port_base`.
pub fn read_ifks<T: Transport + ?Sized>(transport: &T, port_base: u64) -> Result<Vec<u8>, TransportError> {
    let count = transport.read_u16(port_base + mil::IFK_COUNT)?.min(u16::from(u8::MAX));
    let mut raw = vec![0u64; usize::from(count)];
    access::read(transport, port_base + mil::IFK_LIST, &mut raw, Format::BE16, AddrMode::Linear)?;
    Ok(raw.into_iter().map(|ifk| ifk as u8).collect())
}
