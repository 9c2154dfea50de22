//! Host-to-firmware commands.
//!
//! Commands travel as `(opcode, arg)` pairs of 32-bit words through a small
//! queue in the shared memory. DAQ commands pack their argument as
//! `slot << 24 | channel << 16 | value`.

use std::fmt;

use crate::common::{ChannelId, Slot};

/// Command opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Opcode {
    /// Zero a channel register; arg: channel.
    ResetChannel = 0x01,
    /// Arm a channel; arg: channel.
    EnableChannel = 0x02,
    /// Stop a channel and reset its slave FG; arg: channel.
    DisableChannel = 0x03,
    /// Reset all handler state (queues, counters).
    ClearHandlerState = 0x04,
    /// Re-enumerate the slaves and rebuild the macro table.
    Rescan = 0x05,
    /// Set the extension-bus gap read interval in ticks; 0 turns it off.
    MilGapInterval = 0x06,
    /// Dump the history ring to the log.
    PrintHistory = 0x07,
    /// Continuous sampling on; value: rate index 0..=2.
    DaqContinuousOn = 0x10,
    /// High-resolution capture on.
    DaqHiresOn = 0x11,
    /// Post-mortem capture on.
    DaqPostMortemOn = 0x12,
    /// All sampling off.
    DaqOff = 0x13,
    /// Low half of the trigger tag.
    DaqTriggerLo = 0x14,
    /// High half of the trigger tag.
    DaqTriggerHi = 0x15,
    /// Trigger gating; value: 0 off, otherwise on.
    DaqTriggerEnable = 0x16,
}

impl Opcode {
    /// All opcodes.
    pub const ALL: [Self; 14] = [
        Self::ResetChannel,
        Self::EnableChannel,
        Self::DisableChannel,
        Self::ClearHandlerState,
        Self::Rescan,
        Self::MilGapInterval,
        Self::PrintHistory,
        Self::DaqContinuousOn,
        Self::DaqHiresOn,
        Self::DaqPostMortemOn,
        Self::DaqOff,
        Self::DaqTriggerLo,
        Self::DaqTriggerHi,
        Self::DaqTriggerEnable,
    ];

    /// Returns `true` if the argument is an FG channel index.
    pub const fn takes_channel(self) -> bool {
        matches!(self, Self::ResetChannel | Self::EnableChannel | Self::DisableChannel)
    }

    /// Returns `true` for DAQ configuration commands.
    pub const fn is_daq(self) -> bool {
        (self as u32) >= 0x10
    }
}

impl TryFrom<u32> for Opcode {
    type Error = u32;

    fn try_from(raw: u32) -> Result<Self, Self::Error> {
        Self::ALL.into_iter().find(|op| *op as u32 == raw).ok_or(raw)
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::ResetChannel => "RESET_CHANNEL",
            Self::EnableChannel => "ENABLE_CHANNEL",
            Self::DisableChannel => "DISABLE_CHANNEL",
            Self::ClearHandlerState => "CLEAR_HANDLER_STATE",
            Self::Rescan => "RESCAN",
            Self::MilGapInterval => "MIL_GAP_INTERVAL",
            Self::PrintHistory => "PRINT_HISTORY",
            Self::DaqContinuousOn => "DAQ_CONTINUOUS_ON",
            Self::DaqHiresOn => "DAQ_HIRES_ON",
            Self::DaqPostMortemOn => "DAQ_POST_MORTEM_ON",
            Self::DaqOff => "DAQ_OFF",
            Self::DaqTriggerLo => "DAQ_TRIGGER_LO",
            Self::DaqTriggerHi => "DAQ_TRIGGER_HI",
            Self::DaqTriggerEnable => "DAQ_TRIGGER_ENABLE",
        };
        f.write_str(s)
    }
}

/// A raw command as stored in the queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RawCommand {
    /// Opcode word.
    pub opcode: u32,
    /// Argument word.
    pub arg: u32,
}

impl RawCommand {
    /// Creates a raw command from a typed opcode.
    pub const fn new(opcode: Opcode, arg: u32) -> Self {
        Self {
            opcode: opcode as u32,
            arg,
        }
    }
}

/// Argument of a DAQ command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DaqArg {
    /// Addressed channel.
    pub channel: ChannelId,
    /// Command value.
    pub value: u16,
}

impl DaqArg {
    /// Encodes as `slot << 24 | channel << 16 | value`.
    pub const fn encode(&self) -> u32 {
        (self.channel.slot.number() as u32) << 24 | (self.channel.channel as u32) << 16 | self.value as u32
    }

    /// Decodes; `None` for an invalid slot or channel.
    pub fn decode(arg: u32) -> Option<Self> {
        let slot = Slot::new((arg >> 24) as u8)?;
        let channel = ChannelId::new(slot, (arg >> 16) as u8)?;
        Some(Self {
            channel,
            value: arg as u16,
        })
    }
}
