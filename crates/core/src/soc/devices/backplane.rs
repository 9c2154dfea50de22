//! SCU backplane: master registers and slave cards.
//!
//! The backplane window starts at the bus base. Slot `n` occupies
//! `n · SLOT_STRIDE .. (n+1) · SLOT_STRIDE`; slot 0 holds the master registers.
//! A card raises an MSI on the backplane line whenever a newly pending flag is
//! enabled in its `INT_ENABLE` register.

use std::sync::Arc;

use tracing::{debug, trace};

use super::daq_unit::DaqUnit;
use super::fg_unit::{FgEvents, FgUnit};
use super::mil::MilPort;
use crate::common::constants::{
    EMPTY_SLOT_PATTERN, IRQ_LINE_BACKPLANE, MAX_SLOTS, PEND_DAQ_FIFO_FULL, PEND_DAQ_HIRES_DONE,
    PEND_FG0_DONE, PEND_FG0_FIFO_LOW, SLOT_STRIDE,
};
use crate::protocol::slave::{self, fg, master};
use crate::rtos::Msi;
use crate::soc::msi::MsiQueue;
use crate::soc::traits::Device;

/// One slave card: identity, interrupt registers and its functional units.
#[derive(Debug)]
pub struct SlaveCard {
    group: u16,
    version: u16,
    int_pending: u16,
    int_enable: u16,
    fgs: Vec<FgUnit>,
    daq: Option<DaqUnit>,
    mil: Option<MilPort>,
}

impl SlaveCard {
    fn new(group: u16, version: u16) -> Self {
        Self {
            group,
            version,
            int_pending: 0,
            int_enable: 0,
            fgs: Vec::new(),
            daq: None,
            mil: None,
        }
    }

    /// Analog I/O card: two FGs and a DAQ block.
    pub fn addac(version: u16) -> Self {
        let mut card = Self::new(slave::GRP_ADDAC, version);
        card.fgs = vec![FgUnit::new(), FgUnit::new()];
        card.daq = Some(DaqUnit::new());
        card
    }

    /// Single-FG card.
    pub fn acu(version: u16) -> Self {
        let mut card = Self::new(slave::GRP_ACU, version);
        card.fgs = vec![FgUnit::new()];
        card
    }

    /// DAQ-only card.
    pub fn daq(version: u16) -> Self {
        let mut card = Self::new(slave::GRP_DAQ, version);
        card.daq = Some(DaqUnit::new());
        card
    }

    /// Extension-bus adapter reaching the listed interface cards.
    pub fn mil_adapter(version: u16, ifks: &[u8]) -> Self {
        let mut card = Self::new(slave::GRP_MIL_ADAPTER, version);
        card.mil = Some(MilPort::new(ifks));
        card
    }

    /// Card group id.
    pub const fn group(&self) -> u16 {
        self.group
    }

    /// FG `device` of the card.
    pub fn fg(&self, device: u8) -> Option<&FgUnit> {
        self.fgs.get(usize::from(device))
    }

    /// DAQ block of the card.
    pub const fn daq_unit(&self) -> Option<&DaqUnit> {
        self.daq.as_ref()
    }

    /// Mutable DAQ block of the card.
    pub const fn daq_unit_mut(&mut self) -> Option<&mut DaqUnit> {
        self.daq.as_mut()
    }

    /// Extension-bus port of an adapter card.
    pub const fn mil_port(&self) -> Option<&MilPort> {
        self.mil.as_ref()
    }

    /// Pending register.
    pub const fn pending(&self) -> u16 {
        self.int_pending
    }

    fn fg_window(&self, offset: u64) -> Option<(usize, u64)> {
        let rel = offset.checked_sub(fg::BASE)?;
        let index = (rel / fg::STRIDE) as usize;
        (index < self.fgs.len()).then_some((index, rel % fg::STRIDE))
    }

    fn read(&mut self, offset: u64) -> u16 {
        match offset {
            slave::CID_SYSTEM => slave::SYS_CSCO,
            slave::CID_GROUP => self.group,
            slave::SLAVE_VERSION => self.version,
            slave::INT_PENDING => self.int_pending,
            slave::INT_ENABLE => self.int_enable,
            o if self.mil.is_some() && MilPort::claims(o) => self.mil.as_ref().map_or(0, |m| m.read(o)),
            o => {
                if let Some((index, reg)) = self.fg_window(o) {
                    self.fgs[index].read(reg)
                } else if let Some(daq) = self.daq.as_mut() {
                    daq.read(o)
                } else {
                    0
                }
            }
        }
    }

    /// Writes a register; returns flags that became pending.
    fn write(&mut self, slot: u8, offset: u64, val: u16) -> u16 {
        match offset {
            slave::INT_PENDING => self.int_pending &= !val,
            slave::INT_ENABLE => self.int_enable = val,
            slave::FG_START => {
                self.fgs.iter_mut().for_each(FgUnit::start);
                if let Some(port) = self.mil.as_mut() {
                    port.write(offset, val);
                }
            }
            o if self.mil.is_some() && MilPort::claims(o) => {
                if let Some(port) = self.mil.as_mut() {
                    port.write(o, val);
                }
            }
            o => {
                if let Some((index, reg)) = self.fg_window(o) {
                    self.fgs[index].write(reg, val);
                } else if let Some(daq) = self.daq.as_mut() {
                    let events = daq.write(slot, o, val);
                    if events.hires_done {
                        return self.raise(PEND_DAQ_HIRES_DONE);
                    }
                }
            }
        }
        0
    }

    /// Sets pending flags; returns the flags that were not pending before.
    fn raise(&mut self, flags: u16) -> u16 {
        let fresh = flags & !self.int_pending;
        self.int_pending |= flags;
        fresh
    }

    fn tick(&mut self, slot: u8) -> u16 {
        let mut flags = 0;
        for (d, fg) in self.fgs.iter_mut().enumerate() {
            let FgEvents { fifo_low, done } = fg.tick();
            let shift = 2 * d as u16;
            if fifo_low {
                flags |= PEND_FG0_FIFO_LOW << shift;
            }
            if done {
                flags |= PEND_FG0_DONE << shift;
            }
        }
        if let Some(daq) = self.daq.as_mut() {
            let events = daq.tick(slot);
            if events.fifo_full {
                flags |= PEND_DAQ_FIFO_FULL;
            }
            if events.hires_done {
                flags |= PEND_DAQ_HIRES_DONE;
            }
        }
        if let Some(port) = self.mil.as_mut() {
            port.tick();
        }
        // FG notifications are edges; they re-fire even when still pending.
        let fg_flags = flags & !(PEND_DAQ_FIFO_FULL | PEND_DAQ_HIRES_DONE);
        self.raise(flags) | fg_flags
    }
}

/// The backplane bus: master registers plus up to twelve slave cards.
#[derive(Debug)]
pub struct Backplane {
    base: u64,
    slots: Vec<Option<SlaveCard>>,
    select: u16,
    broadcast_offset: u16,
    msi: Arc<MsiQueue>,
}

impl Backplane {
    /// Creates an empty backplane at `base` with `slots` slots.
    pub fn new(base: u64, slots: u8, msi: Arc<MsiQueue>) -> Self {
        let slots = usize::from(slots).min(MAX_SLOTS);
        Self {
            base,
            slots: (0..=slots).map(|_| None).collect(),
            select: 0,
            broadcast_offset: 0,
            msi,
        }
    }

    /// Plugs `card` into `slot`; returns `false` for an invalid slot.
    pub fn insert(&mut self, slot: u8, card: SlaveCard) -> bool {
        match self.slots.get_mut(usize::from(slot)) {
            Some(entry) if slot > 0 => {
                *entry = Some(card);
                true
            }
            _ => false,
        }
    }

    /// Pulls the card out of `slot`.
    pub fn remove(&mut self, slot: u8) -> Option<SlaveCard> {
        self.slots.get_mut(usize::from(slot)).and_then(Option::take)
    }

    /// Card in `slot`.
    pub fn card(&self, slot: u8) -> Option<&SlaveCard> {
        self.slots.get(usize::from(slot))?.as_ref()
    }

    /// Mutable card in `slot`.
    pub fn card_mut(&mut self, slot: u8) -> Option<&mut SlaveCard> {
        self.slots.get_mut(usize::from(slot))?.as_mut()
    }

    /// Raises pending `flags` on the card in `slot` and signals them.
    pub fn raise(&mut self, slot: u8, flags: u16) {
        if let Some(card) = self.card_mut(slot) {
            let fresh = card.raise(flags);
            self.signal(slot, fresh);
        }
    }

    fn present(&self) -> u16 {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.is_some())
            .fold(0, |acc, (n, _)| acc | 1 << (n - 1))
    }

    fn signal(&self, slot: u8, fresh: u16) {
        let Some(card) = self.card(slot) else {
            return;
        };
        let msg = fresh & card.int_enable;
        if msg != 0 {
            self.msi.post(
                IRQ_LINE_BACKPLANE,
                Msi {
                    msg: u32::from(msg),
                    addr: u32::from(slot),
                    sel: u32::from(IRQ_LINE_BACKPLANE),
                },
            );
        }
    }

    fn broadcast(&mut self, data: u16) {
        let offset = u64::from(self.broadcast_offset);
        let select = self.select;
        debug!(select = format_args!("{select:#06x}"), offset, data, "backplane broadcast");
        for slot in 1..self.slots.len() as u8 {
            if select & (1 << (slot - 1)) == 0 {
                continue;
            }
            if let Some(card) = self.card_mut(slot) {
                let fresh = card.write(slot, offset, data);
                self.signal(slot, fresh);
            }
        }
    }

    fn split(offset: u64) -> (u8, u64) {
        ((offset / SLOT_STRIDE) as u8, offset % SLOT_STRIDE)
    }
}

impl Device for Backplane {
    fn name(&self) -> &str {
        "SCUBUS"
    }

    fn address_range(&self) -> (u64, u64) {
        (self.base, self.slots.len() as u64 * SLOT_STRIDE)
    }

    fn read_u16(&mut self, offset: u64) -> u16 {
        let (slot, reg) = Self::split(offset);
        if slot == 0 {
            return match reg {
                master::SLAVE_SELECT => self.select,
                master::BROADCAST_OFFSET => self.broadcast_offset,
                master::SLAVE_PRESENT => self.present(),
                _ => 0,
            };
        }
        self.card_mut(slot).map_or(EMPTY_SLOT_PATTERN, |card| card.read(reg))
    }

    fn write_u16(&mut self, offset: u64, val: u16) {
        let (slot, reg) = Self::split(offset);
        if slot == 0 {
            match reg {
                master::SLAVE_SELECT => self.select = val,
                master::BROADCAST_OFFSET => self.broadcast_offset = val,
                master::BROADCAST_DATA => self.broadcast(val),
                _ => {}
            }
            return;
        }
        trace!(slot, reg, val, "slave write");
        if let Some(card) = self.card_mut(slot) {
            let fresh = card.write(slot, reg, val);
            self.signal(slot, fresh);
        }
    }

    fn tick(&mut self) -> bool {
        let mut raised = false;
        for slot in 1..self.slots.len() as u8 {
            let fresh = self.card_mut(slot).map_or(0, |card| card.tick(slot));
            if fresh != 0 {
                self.signal(slot, fresh);
                raised = true;
            }
        }
        raised
    }

    fn as_backplane_mut(&mut self) -> Option<&mut Backplane> {
        Some(self)
    }
}
