//! Backplane slot and FG socket types.
//!
//! This module defines strong types for the addressing units of an SCU. It provides:
//! 1. **Slots:** Backplane positions 1..=12 and their register-file base addresses.
//! 2. **Sockets:** The encoded container of a function generator (backplane slot,
//!    extension-bus adapter on a slot, or extension-bus direct).
//! 3. **Channel ids:** `(slot, channel)` pairs identifying a DAQ channel.

use std::fmt;

use super::constants::{MAX_SLOTS, SLOT_STRIDE};

/// A backplane slot number (1..=12).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Slot(u8);

impl Slot {
    /// Creates a slot from its number; `None` outside 1..=12.
    #[inline]
    pub const fn new(number: u8) -> Option<Self> {
        if number >= 1 && number as usize <= MAX_SLOTS {
            Some(Self(number))
        } else {
            None
        }
    }

    /// Returns the slot number.
    #[inline(always)]
    pub const fn number(self) -> u8 {
        self.0
    }

    /// Returns the bit of this slot in a slot bitmap (bit 0 = slot 1).
    #[inline]
    pub const fn bit(self) -> u16 {
        1 << (self.0 - 1)
    }

    /// Returns the base address of the slot's register file.
    ///
    /// # Arguments
    ///
    /// * `bus_base` - Base address of the backplane master window.
    #[inline]
    pub const fn base_address(self, bus_base: u64) -> u64 {
        bus_base + self.0 as u64 * SLOT_STRIDE
    }

    /// Iterates over all slots in ascending order.
    pub fn all() -> impl Iterator<Item = Self> {
        (1..=MAX_SLOTS as u8).map(Self)
    }

    /// Iterates over the slots set in `bitmap`, ascending.
    pub fn from_bitmap(bitmap: u16) -> impl Iterator<Item = Self> {
        Self::all().filter(move |s| bitmap & s.bit() != 0)
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Flag marking an FG behind an extension-bus adapter on a backplane slot.
pub const SOCKET_MIL_ON_BACKPLANE: u32 = 1 << 4;
/// Flag marking an FG reached through the extension-bus controller directly.
pub const SOCKET_MIL_DIRECT: u32 = 1 << 5;
const SOCKET_SLOT_MASK: u32 = 0x0F;
const SOCKET_IFK_SHIFT: u32 = 8;
const SOCKET_IFK_MASK: u32 = 0xFF;

/// The decoded kind of a socket.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SocketKind {
    /// FG card plugged into a backplane slot.
    Backplane(Slot),
    /// Extension-bus interface card behind an adapter on a backplane slot.
    MilOnBackplane {
        /// Slot of the adapter.
        slot: Slot,
        /// Interface-card address.
        ifk: u8,
    },
    /// Extension-bus interface card on the controller's own port.
    MilDirect {
        /// Interface-card address.
        ifk: u8,
    },
}

/// Encoded FG container selector.
///
/// Bits 0..3 carry the backplane slot, bit 4 marks an extension-bus adapter on
/// that slot, bit 5 marks the extension-bus controller port, bits 8..15 carry the
/// interface-card address.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Socket(u32);

impl Socket {
    /// Wraps a raw socket word.
    #[inline(always)]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Returns the raw socket word.
    #[inline(always)]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Socket of an FG card in a backplane slot.
    pub const fn backplane(slot: Slot) -> Self {
        Self(slot.number() as u32)
    }

    /// Socket of an extension-bus FG behind the adapter in `slot`.
    pub const fn mil_on_backplane(slot: Slot, ifk: u8) -> Self {
        Self(slot.number() as u32 | SOCKET_MIL_ON_BACKPLANE | (ifk as u32) << SOCKET_IFK_SHIFT)
    }

    /// Socket of an extension-bus FG on the controller's own port.
    pub const fn mil_direct(ifk: u8) -> Self {
        Self(SOCKET_MIL_DIRECT | (ifk as u32) << SOCKET_IFK_SHIFT)
    }

    /// Decodes the socket; `None` for malformed words.
    pub fn kind(self) -> Option<SocketKind> {
        let ifk = ((self.0 >> SOCKET_IFK_SHIFT) & SOCKET_IFK_MASK) as u8;
        if self.0 & SOCKET_MIL_DIRECT != 0 {
            return Some(SocketKind::MilDirect { ifk });
        }
        let slot = Slot::new((self.0 & SOCKET_SLOT_MASK) as u8)?;
        if self.0 & SOCKET_MIL_ON_BACKPLANE != 0 {
            Some(SocketKind::MilOnBackplane { slot, ifk })
        } else {
            Some(SocketKind::Backplane(slot))
        }
    }

    /// Returns `true` for FGs reached over the extension bus.
    pub fn is_mil(self) -> bool {
        self.0 & (SOCKET_MIL_DIRECT | SOCKET_MIL_ON_BACKPLANE) != 0
    }

    /// Returns the backplane slot, if the socket lives on one.
    pub fn slot(self) -> Option<Slot> {
        match self.kind()? {
            SocketKind::Backplane(slot) | SocketKind::MilOnBackplane { slot, .. } => Some(slot),
            SocketKind::MilDirect { .. } => None,
        }
    }
}

impl fmt::Display for Socket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind() {
            Some(SocketKind::Backplane(slot)) => write!(f, "slot{slot}"),
            Some(SocketKind::MilOnBackplane { slot, ifk }) => write!(f, "slot{slot}/ifk{ifk:#04x}"),
            Some(SocketKind::MilDirect { ifk }) => write!(f, "mil/ifk{ifk:#04x}"),
            None => write!(f, "socket{:#x}", self.0),
        }
    }
}

/// A DAQ channel: slot plus channel number 1..=4.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChannelId {
    /// Slot of the DAQ card.
    pub slot: Slot,
    /// Channel number on the card, 1-based.
    pub channel: u8,
}

impl ChannelId {
    /// Creates a channel id; `None` when the channel number is outside 1..=4.
    pub const fn new(slot: Slot, channel: u8) -> Option<Self> {
        if channel >= 1 && channel <= super::constants::DAQ_MAX_CHANNELS {
            Some(Self { slot, channel })
        } else {
            None
        }
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.slot, self.channel)
    }
}
