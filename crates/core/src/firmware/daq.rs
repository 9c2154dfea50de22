//! DAQ block assembler.
//!
//! This module moves finished sample blocks from the DAQ cards into the shared ring.
//! It performs:
//! 1. **Drain:** On a DAQ interrupt of a slot, walks its channels in ascending order and
//!    pops the continuous fifo of every channel with a fifo-full flag, then the
//!    high-resolution fifo of every channel with a hires flag.
//! 2. **Validation:** An empty fifo behind a fifo-full flag is a known race and is
//!    discarded; a descriptor naming another slot or channel drops the block.
//! 3. **Emission:** Writes each block as `[header][payload][descriptor]` into the ring.
//!    The producer never waits: a block that does not fit is dropped and counted.
//! 4. **Channel setup:** Applies the DAQ configuration commands to a channel's control
//!    and trigger registers.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, trace, warn};

use super::history::{History, HistoryKind};
use crate::access::{self, SharedTransport, TransportExt};
use crate::common::constants::{DAQ_MAX_CHANNELS, PEND_DAQ_MASK};
use crate::common::{AddrMode, ChannelId, Format, Slot, TransportError};
use crate::protocol::daq_block::{BlockKind, DaqBlock, DaqMode};
use crate::protocol::slave::{self, daq};
use crate::protocol::{Counter, DaqArg, Opcode, SharedMemory};
use crate::ram::{RamDevice, RamError, SharedRing};
use crate::stats::{FirmwareStats, bump};

/// Ring the assembler writes blocks into.
pub type DaqRing = SharedRing<RamDevice<SharedTransport>>;

/// What one interrupt drained.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Blocks written to the ring.
    pub blocks: u32,
    /// Blocks dropped for lack of ring space.
    pub drops: u32,
    /// Fifo-full flags with an empty fifo.
    pub discards: u32,
    /// Blocks dropped on a descriptor mismatch.
    pub mismatches: u32,
    /// Drains that delivered a wrong number of words.
    pub incomplete: u32,
}

/// Drains DAQ fifos into the shared ring.
pub struct DaqAssembler {
    shared: SharedMemory<SharedTransport>,
    bus_base: u64,
    ring: Option<DaqRing>,
    slots: u16,
    stats: Arc<FirmwareStats>,
    history: Arc<History>,
}

impl fmt::Debug for DaqAssembler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DaqAssembler")
            .field("slots", &format_args!("{:#05x}", self.slots))
            .field("ring", &self.ring.as_ref().map(SharedRing::admin_index))
            .finish_non_exhaustive()
    }
}

impl DaqAssembler {
    /// Creates an assembler without DAQ slots.
    ///
    /// # Arguments
    ///
    /// * `shared` - Accessor of the LM32 shared memory, for counter publication.
    /// * `bus_base` - Backplane window base.
    /// * `ring` - Ring in the shared RAM; `None` if the RAM is absent, then every block
    ///   counts as dropped.
    /// * `stats` - Firmware counters.
    /// * `history` - History ring.
    pub const fn new(
        shared: SharedMemory<SharedTransport>,
        bus_base: u64,
        ring: Option<DaqRing>,
        stats: Arc<FirmwareStats>,
        history: Arc<History>,
    ) -> Self {
        Self {
            shared,
            bus_base,
            ring,
            slots: 0,
            stats,
            history,
        }
    }

    fn transport(&self) -> &SharedTransport {
        self.shared.transport()
    }

    /// The ring blocks are written to.
    pub const fn ring(&self) -> Option<&DaqRing> {
        self.ring.as_ref()
    }

    /// Bitmap of slots carrying DAQ channels (bit `n - 1` for slot `n`).
    pub const fn slots(&self) -> u16 {
        self.slots
    }

    /// Returns `true` if any DAQ card is known.
    pub const fn has_hardware(&self) -> bool {
        self.slots != 0
    }

    /// Replaces the DAQ slot set and unmasks the DAQ interrupts of every slot in it.
    pub fn set_slots(&mut self, slots: impl IntoIterator<Item = Slot>) -> Result<(), TransportError> {
        self.slots = 0;
        for slot in slots {
            self.slots |= slot.bit();
            let base = slot.base_address(self.bus_base);
            self.transport().write_u16(base + slave::INT_PENDING, PEND_DAQ_MASK)?;
            let _ = self.transport().modify_u16(base + slave::INT_ENABLE, 0, PEND_DAQ_MASK)?;
            debug!(%slot, "daq interrupts enabled");
        }
        Ok(())
    }

    fn channel_base(&self, channel: ChannelId) -> u64 {
        channel.slot.base_address(self.bus_base) + daq::window(channel.channel)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Interrupt path
    // ═══════════════════════════════════════════════════════════════════════

    /// Drains the channels of `slot` whose DAQ flags are pending.
    ///
    /// # Arguments
    ///
    /// * `slot` - Slot that raised the interrupt.
    /// * `pending` - Slot pending flags carried by the interrupt.
    ///
    /// # Returns
    ///
    /// Counts of what happened to the drained blocks.
    pub fn handle_irq(&mut self, slot: Slot, pending: u16) -> Result<DrainReport, RamError> {
        let mut report = DrainReport::default();
        if pending & PEND_DAQ_MASK == 0 {
            return Ok(report);
        }
        if self.slots & slot.bit() == 0 {
            debug!(%slot, "daq interrupt from slot without daq");
            return Ok(report);
        }
        let slot_base = slot.base_address(self.bus_base);
        let flags = self.transport().read_u16(slot_base + daq::INT_PENDING)?;
        trace!(%slot, flags = format_args!("{flags:#06x}"), "daq pending");

        for ch in 1..=DAQ_MAX_CHANNELS {
            let Some(channel) = ChannelId::new(slot, ch) else { continue };
            if flags & daq::fifo_full_bit(ch) != 0 {
                self.drain(channel, BlockKind::Short, &mut report)?;
            }
        }
        for ch in 1..=DAQ_MAX_CHANNELS {
            let Some(channel) = ChannelId::new(slot, ch) else { continue };
            if flags & daq::hires_bit(ch) != 0 {
                self.drain(channel, BlockKind::Long, &mut report)?;
                // Leaving hires on would capture again on the next trigger.
                let _ = self.transport().modify_u16(self.channel_base(channel) + daq::CTRL, daq::CTRL_HIRES, 0)?;
            }
        }

        if flags != 0 {
            self.transport().write_u16(slot_base + daq::INT_PENDING, flags)?;
        }
        self.transport().write_u16(slot_base + slave::INT_PENDING, pending & PEND_DAQ_MASK)?;
        self.publish()?;
        Ok(report)
    }

    fn drain(&self, channel: ChannelId, kind: BlockKind, report: &mut DrainReport) -> Result<(), RamError> {
        let base = self.channel_base(channel);
        let (count_reg, data_reg) = match kind {
            BlockKind::Short => (daq::FIFO_WORDS, daq::FIFO_DATA),
            BlockKind::Long => (daq::PM_WORDS, daq::PM_DATA),
        };
        let count = usize::from(self.transport().read_u16(base + count_reg)?);
        if count == 0 {
            report.discards += 1;
            bump(&self.stats.daq_discards);
            warn!(%channel, ?kind, "fifo-full flag with empty fifo, discarded");
            return Ok(());
        }

        let mut raw = vec![0u64; count];
        access::read(self.transport(), base + data_reg, &mut raw, Format::BE16, AddrMode::Frozen)?;
        let words: Vec<u16> = raw.into_iter().map(|w| w as u16).collect();

        let Some(block) = DaqBlock::from_fifo(kind, &words) else {
            report.incomplete += 1;
            bump(&self.stats.daq_incomplete);
            warn!(%channel, ?kind, words = count, expected = kind.fifo_words(), "incomplete block dropped");
            return Ok(());
        };
        let d = &block.descriptor;
        if d.slot != channel.slot.number() || d.channel != channel.channel {
            report.mismatches += 1;
            bump(&self.stats.daq_mismatches);
            warn!(%channel, descriptor = %d, "descriptor mismatch, block dropped");
            self.history.record(HistoryKind::Error(format!(
                "daq {channel}: descriptor names {}:{}",
                d.slot, d.channel
            )));
            return Ok(());
        }

        let pushed = match &self.ring {
            Some(ring) => ring.push(&block.encode())?,
            None => false,
        };
        if pushed {
            report.blocks += 1;
            bump(&self.stats.daq_blocks);
            trace!(%channel, sequence = d.sequence, ?kind, "block emitted");
        } else {
            report.drops += 1;
            bump(&self.stats.daq_drops);
            debug!(%channel, sequence = d.sequence, "ring full, block dropped");
        }
        Ok(())
    }

    /// Writes the DAQ counters into the shared memory.
    pub fn publish(&self) -> Result<(), TransportError> {
        let s = self.stats.snapshot();
        self.shared.set_counter(Counter::DaqBlocks, s.daq_blocks as u32)?;
        self.shared.set_counter(Counter::DaqDrops, s.daq_drops as u32)?;
        self.shared.set_counter(Counter::DaqDiscards, s.daq_discards as u32)?;
        self.shared.set_counter(Counter::DaqMismatches, s.daq_mismatches as u32)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Channel setup
    // ═══════════════════════════════════════════════════════════════════════

    /// Applies a DAQ configuration command.
    ///
    /// # Returns
    ///
    /// `false` if the command is not a DAQ command, the slot has no DAQ card or the
    /// value is out of range; nothing is written then.
    pub fn configure(&mut self, opcode: Opcode, arg: DaqArg) -> Result<bool, TransportError> {
        let channel = arg.channel;
        if self.slots & channel.slot.bit() == 0 {
            warn!(%channel, %opcode, "no daq card in slot");
            return Ok(false);
        }
        let base = self.channel_base(channel);
        let t = self.transport();
        let modes = daq::CTRL_CONT_MASK | daq::CTRL_HIRES | daq::CTRL_PM;
        match opcode {
            Opcode::DaqContinuousOn => {
                let Some(mode) = DaqMode::continuous(arg.value) else {
                    warn!(%channel, rate = arg.value, "invalid continuous rate");
                    return Ok(false);
                };
                let _ = t.modify_u16(base + daq::CTRL, daq::CTRL_CONT_MASK, mode.selector())?;
            }
            Opcode::DaqHiresOn => {
                let _ = t.modify_u16(base + daq::CTRL, daq::CTRL_PM, daq::CTRL_HIRES)?;
            }
            Opcode::DaqPostMortemOn => {
                let _ = t.modify_u16(base + daq::CTRL, daq::CTRL_HIRES, daq::CTRL_PM)?;
            }
            Opcode::DaqOff => {
                let _ = t.modify_u16(base + daq::CTRL, modes, 0)?;
            }
            Opcode::DaqTriggerLo => t.write_u16(base + daq::TRIG_LO, arg.value)?,
            Opcode::DaqTriggerHi => t.write_u16(base + daq::TRIG_HI, arg.value)?,
            Opcode::DaqTriggerEnable => {
                let (clear, set) = if arg.value == 0 {
                    (daq::CTRL_TRIGGER, 0)
                } else {
                    (0, daq::CTRL_TRIGGER)
                };
                let _ = t.modify_u16(base + daq::CTRL, clear, set)?;
            }
            _ => return Ok(false),
        }
        debug!(%channel, %opcode, value = arg.value, "daq channel configured");
        Ok(true)
    }
}
