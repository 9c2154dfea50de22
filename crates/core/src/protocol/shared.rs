//! LM32 shared memory layout and accessor.
//!
//! The shared memory is big-endian and addressed in bytes:
//!
//! | offset  | content                                                   |
//! |---------|-----------------------------------------------------------|
//! | `0x000` | magic, version, busy flag, FG count, gap interval         |
//! | `0x014` | DAQ counters: drops, discards, mismatches, blocks         |
//! | `0x040` | command queue: write counter, read counter, 16 slots      |
//! | `0x100` | FG macro table, 256 entries of 8 bytes                    |
//! | `0x900` | FG channel registers, 16 channels of 32 bytes             |
//! | `0xB00` | polynomial buffers, 16 channels × 1024 entries × 12 bytes |

use std::fmt;

use crate::access::{self, BusOp, Transport, TransportExt};
use crate::common::{AddrMode, Format, TransportError, Width};

use super::command::RawCommand;
use super::fg::{CHANNEL_REG_WORDS, ChannelReg, FgMacro, POLYNOMIAL_WORDS, PolynomialParams};

/// Magic word identifying an initialized shared memory ("SCU1").
pub const SHARED_MAGIC: u32 = 0x5343_5531;
/// Layout version.
pub const SHARED_VERSION: u32 = 4;

/// Byte offsets of the scalar fields.
pub mod offsets {
    /// Magic word.
    pub const MAGIC: u64 = 0x000;
    /// Layout version.
    pub const VERSION: u64 = 0x004;
    /// Command busy flag.
    pub const BUSY: u64 = 0x008;
    /// Entries in the FG macro table.
    pub const FG_COUNT: u64 = 0x00C;
    /// Extension-bus gap read interval in ticks.
    pub const MIL_GAP_INTERVAL: u64 = 0x010;
    /// DAQ blocks dropped for lack of ring space.
    pub const DAQ_DROPS: u64 = 0x014;
    /// DAQ interrupts discarded with an empty fifo.
    pub const DAQ_DISCARDS: u64 = 0x018;
    /// DAQ blocks dropped for a descriptor mismatch.
    pub const DAQ_MISMATCHES: u64 = 0x01C;
    /// DAQ blocks written to the ring.
    pub const DAQ_BLOCKS: u64 = 0x020;
    /// Extension-bus gap reads done.
    pub const MIL_GAP_READS: u64 = 0x024;
    /// Command queue write counter (host).
    pub const CMD_WRITE: u64 = 0x040;
    /// Command queue read counter (firmware).
    pub const CMD_READ: u64 = 0x044;
    /// First command slot.
    pub const CMD_SLOTS: u64 = 0x048;
    /// FG macro table.
    pub const MACROS: u64 = 0x100;
    /// FG channel registers.
    pub const CHANNELS: u64 = 0x900;
    /// Polynomial buffers.
    pub const POLYNOMIALS: u64 = 0xB00;
}

/// Command queue slots.
pub const CMD_QUEUE_SLOTS: u32 = 16;
/// Macro table entries.
pub const MACRO_ENTRIES: usize = 256;
/// Channel registers.
pub const CHANNEL_COUNT: usize = 16;
/// Polynomial entries per channel.
pub const POLY_ENTRIES: u32 = 1024;

const MACRO_SIZE: u64 = 8;
const CHANNEL_SIZE: u64 = 32;
const POLY_SIZE: u64 = 12;

/// Fields of a channel register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelField {
    /// Host write index.
    WriteIndex = 0,
    /// Firmware read index.
    ReadIndex = 1,
    /// Channel state.
    State = 2,
    /// Parameter sets copied.
    RampCount = 3,
    /// Bound macro index.
    MacroIndex = 4,
    /// Start event tag.
    Tag = 5,
    /// Mailbox slot.
    MbxSlot = 6,
    /// Completed ramps.
    Sequence = 7,
}

/// Firmware counters in the shared memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Counter {
    /// Blocks dropped for lack of ring space.
    DaqDrops,
    /// Empty-fifo interrupts discarded.
    DaqDiscards,
    /// Descriptor mismatches.
    DaqMismatches,
    /// Blocks written.
    DaqBlocks,
    /// Extension-bus gap reads.
    MilGapReads,
}

impl Counter {
    const fn offset(self) -> u64 {
        match self {
            Self::DaqDrops => offsets::DAQ_DROPS,
            Self::DaqDiscards => offsets::DAQ_DISCARDS,
            Self::DaqMismatches => offsets::DAQ_MISMATCHES,
            Self::DaqBlocks => offsets::DAQ_BLOCKS,
            Self::MilGapReads => offsets::MIL_GAP_READS,
        }
    }
}

/// Typed accessor of the shared memory over a transport.
#[derive(Clone)]
pub struct SharedMemory<T> {
    transport: T,
    base: u64,
}

impl<T> fmt::Debug for SharedMemory<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedMemory").field("base", &format_args!("{:#x}", self.base)).finish_non_exhaustive()
    }
}

impl<T: Transport> SharedMemory<T> {
    /// Creates an accessor for the shared memory at `base`.
    pub const fn new(transport: T, base: u64) -> Self {
        Self { transport, base }
    }

    /// Base address.
    pub const fn base(&self) -> u64 {
        self.base
    }

    /// Underlying transport.
    pub const fn transport(&self) -> &T {
        &self.transport
    }

    /// Reads the word at byte `offset`.
    pub fn read_u32(&self, offset: u64) -> Result<u32, TransportError> {
        self.transport.read_u32(self.base + offset)
    }

    /// Writes the word at byte `offset`.
    pub fn write_u32(&self, offset: u64, value: u32) -> Result<(), TransportError> {
        self.transport.write_u32(self.base + offset, value)
    }

    fn read_words(&self, offset: u64, out: &mut [u32]) -> Result<(), TransportError> {
        let mut raw = vec![0u64; out.len()];
        access::read(&self.transport, self.base + offset, &mut raw, Format::BE32, AddrMode::Linear)?;
        for (o, r) in out.iter_mut().zip(raw) {
            *o = r as u32;
        }
        Ok(())
    }

    fn write_words(&self, offset: u64, words: &[u32]) -> Result<(), TransportError> {
        let raw: Vec<u64> = words.iter().map(|w| u64::from(*w)).collect();
        access::write(&self.transport, self.base + offset, &raw, Format::BE32, AddrMode::Linear)
    }

    /// Writes magic and version, and clears the flags, counters and command queue.
    pub fn initialize(&self) -> Result<(), TransportError> {
        self.write_words(offsets::MAGIC, &[SHARED_MAGIC, SHARED_VERSION, 0, 0, 0, 0, 0, 0, 0, 0])?;
        self.write_words(offsets::CMD_WRITE, &[0, 0])
    }

    /// Returns `true` if the magic word is present.
    pub fn is_initialized(&self) -> Result<bool, TransportError> {
        Ok(self.read_u32(offsets::MAGIC)? == SHARED_MAGIC)
    }

    /// Reads the busy flag.
    pub fn busy(&self) -> Result<bool, TransportError> {
        Ok(self.read_u32(offsets::BUSY)? != 0)
    }

    /// Writes the busy flag.
    pub fn set_busy(&self, on: bool) -> Result<(), TransportError> {
        self.write_u32(offsets::BUSY, u32::from(on))
    }

    /// Reads a firmware counter.
    pub fn counter(&self, counter: Counter) -> Result<u32, TransportError> {
        self.read_u32(counter.offset())
    }

    /// Writes a firmware counter.
    pub fn set_counter(&self, counter: Counter, value: u32) -> Result<(), TransportError> {
        self.write_u32(counter.offset(), value)
    }

    // ═══════════════════════════════════════════════════════════════════
    // FG macro table
    // ═══════════════════════════════════════════════════════════════════

    /// Reads macro table entry `index`.
    pub fn read_macro(&self, index: usize) -> Result<FgMacro, TransportError> {
        let mut w = [0u32; 2];
        self.read_words(offsets::MACROS + index as u64 * MACRO_SIZE, &mut w)?;
        Ok(FgMacro::from_words(w))
    }

    /// Reads the macro table up to the first sentinel.
    pub fn read_macros(&self) -> Result<Vec<FgMacro>, TransportError> {
        let count = (self.read_u32(offsets::FG_COUNT)? as usize).min(MACRO_ENTRIES);
        let mut raw = vec![0u32; 2 * count];
        self.read_words(offsets::MACROS, &mut raw)?;
        Ok(raw
            .chunks_exact(2)
            .map(|w| FgMacro::from_words([w[0], w[1]]))
            .take_while(|m| !m.is_sentinel())
            .collect())
    }

    /// Writes the macro table, a sentinel behind it and the FG count.
    pub fn write_macros(&self, macros: &[FgMacro]) -> Result<(), TransportError> {
        let n = macros.len().min(MACRO_ENTRIES - 1);
        let mut raw: Vec<u32> = macros[..n].iter().flat_map(FgMacro::to_words).collect();
        raw.extend(FgMacro::default().to_words());
        self.write_words(offsets::MACROS, &raw)?;
        self.write_u32(offsets::FG_COUNT, n as u32)
    }

    /// Clears the whole macro table.
    pub fn clear_macros(&self) -> Result<(), TransportError> {
        self.write_words(offsets::MACROS, &vec![0u32; 2 * MACRO_ENTRIES])?;
        self.write_u32(offsets::FG_COUNT, 0)
    }

    // ═══════════════════════════════════════════════════════════════════
    // Channel registers
    // ═══════════════════════════════════════════════════════════════════

    const fn channel_offset(channel: usize) -> u64 {
        offsets::CHANNELS + channel as u64 * CHANNEL_SIZE
    }

    /// Reads the register of `channel`.
    pub fn read_channel(&self, channel: usize) -> Result<ChannelReg, TransportError> {
        let mut w = [0u32; CHANNEL_REG_WORDS];
        self.read_words(Self::channel_offset(channel), &mut w)?;
        Ok(ChannelReg::from_words(&w))
    }

    /// Writes the whole register of `channel`.
    pub fn write_channel(&self, channel: usize, reg: &ChannelReg) -> Result<(), TransportError> {
        self.write_words(Self::channel_offset(channel), &reg.to_words())
    }

    /// Writes one field of the register of `channel`.
    pub fn write_channel_field(
        &self,
        channel: usize,
        field: ChannelField,
        value: u32,
    ) -> Result<(), TransportError> {
        self.write_u32(Self::channel_offset(channel) + 4 * field as u64, value)
    }

    /// Reads one field of the register of `channel`.
    pub fn read_channel_field(&self, channel: usize, field: ChannelField) -> Result<u32, TransportError> {
        self.read_u32(Self::channel_offset(channel) + 4 * field as u64)
    }

    // ═══════════════════════════════════════════════════════════════════
    // Polynomial buffers
    // ═══════════════════════════════════════════════════════════════════

    const fn poly_offset(channel: usize, index: u32) -> u64 {
        offsets::POLYNOMIALS
            + (channel as u64 * POLY_ENTRIES as u64 + (index % POLY_ENTRIES) as u64) * POLY_SIZE
    }

    /// Reads polynomial `index` of `channel`.
    pub fn read_poly(&self, channel: usize, index: u32) -> Result<PolynomialParams, TransportError> {
        let mut w = [0u32; POLYNOMIAL_WORDS];
        self.read_words(Self::poly_offset(channel, index), &mut w)?;
        Ok(PolynomialParams::from_words(w))
    }

    /// Writes polynomial `index` of `channel`.
    pub fn write_poly(&self, channel: usize, index: u32, params: &PolynomialParams) -> Result<(), TransportError> {
        self.write_words(Self::poly_offset(channel, index), &params.to_words())
    }

    // ═══════════════════════════════════════════════════════════════════
    // Command queue
    // ═══════════════════════════════════════════════════════════════════

    /// Reads `(write, read)` counters of the command queue.
    pub fn command_counters(&self) -> Result<(u32, u32), TransportError> {
        let mut w = [0u32; 2];
        self.read_words(offsets::CMD_WRITE, &mut w)?;
        Ok((w[0], w[1]))
    }

    /// Writes command slot `counter % 16` and advances the write counter in one cycle.
    pub fn post_command(&self, counter: u32, cmd: RawCommand) -> Result<(), TransportError> {
        let slot = self.base + offsets::CMD_SLOTS + u64::from(counter % CMD_QUEUE_SLOTS) * 8;
        self.transport.cycle(&mut [
            BusOp::write(slot, Width::U32, u64::from(cmd.opcode)),
            BusOp::write(slot + 4, Width::U32, u64::from(cmd.arg)),
            BusOp::write(self.base + offsets::CMD_WRITE, Width::U32, u64::from(counter.wrapping_add(1))),
        ])
    }

    /// Reads command slot `counter % 16`.
    pub fn read_command(&self, counter: u32) -> Result<RawCommand, TransportError> {
        let mut w = [0u32; 2];
        self.read_words(offsets::CMD_SLOTS + u64::from(counter % CMD_QUEUE_SLOTS) * 8, &mut w)?;
        Ok(RawCommand {
            opcode: w[0],
            arg: w[1],
        })
    }

    /// Writes the read counter.
    pub fn set_command_read(&self, counter: u32) -> Result<(), TransportError> {
        self.write_u32(offsets::CMD_READ, counter)
    }
}
