//! Function generator records shared by firmware and host.
//!
//! This module defines the encodings of the FG part of the shared memory. It provides:
//! 1. **Macro table entries:** One discovered FG as `{socket, device, version, output_bits}`.
//! 2. **Channel registers:** Per-channel indices, state and counters.
//! 3. **Polynomial parameters:** The opaque parameter set copied to slave hardware.

use std::fmt;

use crate::common::Socket;

/// Channel state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum FgState {
    /// Unbound or disabled.
    #[default]
    Idle = 0,
    /// Parameters loaded, waiting for the start event.
    Armed = 1,
    /// Ramp running.
    Active = 2,
    /// Ramp finished or stopped.
    Stopped = 3,
}

impl TryFrom<u32> for FgState {
    type Error = u32;

    fn try_from(raw: u32) -> Result<Self, Self::Error> {
        match raw {
            0 => Ok(Self::Idle),
            1 => Ok(Self::Armed),
            2 => Ok(Self::Active),
            3 => Ok(Self::Stopped),
            other => Err(other),
        }
    }
}

impl fmt::Display for FgState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "IDLE",
            Self::Armed => "ARMED",
            Self::Active => "ACTIVE",
            Self::Stopped => "STOPPED",
        };
        f.write_str(s)
    }
}

/// Entry of the FG macro table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct FgMacro {
    /// Container of the FG.
    pub socket: Socket,
    /// FG index within the container.
    pub device: u8,
    /// Firmware version of the FG.
    pub version: u8,
    /// Output resolution; 0 marks the end of the table.
    pub output_bits: u8,
}

impl FgMacro {
    /// Returns `true` for the end-of-table entry.
    pub const fn is_sentinel(&self) -> bool {
        self.output_bits == 0
    }

    /// Encodes into `(socket, device << 16 | version << 8 | output_bits)`.
    pub const fn to_words(&self) -> [u32; 2] {
        [
            self.socket.raw(),
            (self.device as u32) << 16 | (self.version as u32) << 8 | self.output_bits as u32,
        ]
    }

    /// Decodes from two words.
    pub const fn from_words(w: [u32; 2]) -> Self {
        Self {
            socket: Socket::from_raw(w[0]),
            device: (w[1] >> 16) as u8,
            version: (w[1] >> 8) as u8,
            output_bits: w[1] as u8,
        }
    }
}

impl fmt::Display for FgMacro {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "fg-{}-{} v{} {} bit",
            self.socket.raw(),
            self.device,
            self.version,
            self.output_bits
        )
    }
}

/// Number of 32-bit words of a channel register.
pub const CHANNEL_REG_WORDS: usize = 8;

/// Per-channel register in shared memory.
///
/// `write_index` is written by the host only, `read_index` by the firmware only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelReg {
    /// Next polynomial slot the host fills.
    pub write_index: u32,
    /// Next polynomial slot the firmware copies.
    pub read_index: u32,
    /// Channel state.
    pub state: FgState,
    /// Parameter sets handed to the slave.
    pub ramp_count: u32,
    /// Bound macro table index, -1 if unbound.
    pub macro_index: i32,
    /// Event tag to start on.
    pub tag: u32,
    /// Mailbox slot for reverse messages.
    pub mbx_slot: u32,
    /// Completed ramp counter.
    pub sequence: u32,
}

impl Default for ChannelReg {
    fn default() -> Self {
        Self {
            write_index: 0,
            read_index: 0,
            state: FgState::Idle,
            ramp_count: 0,
            macro_index: -1,
            tag: 0,
            mbx_slot: 0,
            sequence: 0,
        }
    }
}

impl ChannelReg {
    /// Encodes into eight words.
    pub const fn to_words(&self) -> [u32; CHANNEL_REG_WORDS] {
        [
            self.write_index,
            self.read_index,
            self.state as u32,
            self.ramp_count,
            self.macro_index as u32,
            self.tag,
            self.mbx_slot,
            self.sequence,
        ]
    }

    /// Decodes from eight words; an unknown state decodes as idle.
    pub fn from_words(w: &[u32; CHANNEL_REG_WORDS]) -> Self {
        Self {
            write_index: w[0],
            read_index: w[1],
            state: FgState::try_from(w[2]).unwrap_or_default(),
            ramp_count: w[3],
            macro_index: w[4] as i32,
            tag: w[5],
            mbx_slot: w[6],
            sequence: w[7],
        }
    }

    /// Parameter sets the host has queued and the firmware not yet copied.
    pub const fn pending(&self, buffer_size: u32) -> u32 {
        if buffer_size == 0 {
            return 0;
        }
        (self.write_index % buffer_size + buffer_size - self.read_index % buffer_size) % buffer_size
    }
}

/// Number of 32-bit words of a serialized parameter set.
pub const POLYNOMIAL_WORDS: usize = 3;

/// Polynomial parameter set interpreted by the slave FG.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct PolynomialParams {
    /// Quadratic coefficient.
    pub coeff_a: i16,
    /// Linear coefficient.
    pub coeff_b: i16,
    /// Shift of coefficient a (6 bits).
    pub shift_a: u8,
    /// Shift of coefficient b (6 bits).
    pub shift_b: u8,
    /// Start value.
    pub coeff_c: i32,
    /// Step count selector (3 bits).
    pub step: u8,
    /// Frequency selector (3 bits).
    pub freq: u8,
}

impl PolynomialParams {
    /// Serializes into three words.
    pub const fn to_words(&self) -> [u32; POLYNOMIAL_WORDS] {
        [
            (self.coeff_a as u16 as u32) << 16 | self.coeff_b as u16 as u32,
            self.coeff_c as u32,
            (self.shift_a as u32 & 0x3F)
                | (self.shift_b as u32 & 0x3F) << 8
                | (self.step as u32 & 0x7) << 16
                | (self.freq as u32 & 0x7) << 24,
        ]
    }

    /// Deserializes from three words.
    pub const fn from_words(w: [u32; POLYNOMIAL_WORDS]) -> Self {
        Self {
            coeff_a: (w[0] >> 16) as u16 as i16,
            coeff_b: w[0] as u16 as i16,
            coeff_c: w[1] as i32,
            shift_a: (w[2] & 0x3F) as u8,
            shift_b: ((w[2] >> 8) & 0x3F) as u8,
            step: ((w[2] >> 16) & 0x7) as u8,
            freq: ((w[2] >> 24) & 0x7) as u8,
        }
    }

    /// Value of the `SHIFT` register: `shift_a | shift_b << 6`.
    pub const fn shift_reg(&self) -> u16 {
        (self.shift_a as u16 & 0x3F) | (self.shift_b as u16 & 0x3F) << 6
    }

    /// Step and frequency bits of the `CNTRL` register.
    pub const fn control_bits(&self) -> u16 {
        (self.step as u16 & 0x7) << 4 | (self.freq as u16 & 0x7) << 7
    }
}
