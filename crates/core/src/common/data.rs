//! Bus Access Types.
//!
//! This module defines the classification of bus accesses used throughout the core and the host.
//! These types are used for the following:
//! 1. **Element Formats:** Element width and byte order of a typed register access.
//! 2. **Address Modes:** Linear, frozen (fifo) and 64-bit toggling address strides.
//! 3. **Statistics Tracking:** Categorizing accesses for per-kind duration measurement.

use std::fmt;

/// Width of one element on the bus.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Width {
    /// 8-bit access.
    U8,
    /// 16-bit access (backplane slave registers).
    U16,
    /// 32-bit access (LM32 native word).
    U32,
    /// 64-bit access (RAM payload word).
    U64,
}

impl Width {
    /// Returns the element size in bytes.
    #[inline]
    pub const fn bytes(self) -> u64 {
        match self {
            Self::U8 => 1,
            Self::U16 => 2,
            Self::U32 => 4,
            Self::U64 => 8,
        }
    }

    /// Returns the value mask of an element of this width.
    #[inline]
    pub const fn mask(self) -> u64 {
        match self {
            Self::U8 => 0xFF,
            Self::U16 => 0xFFFF,
            Self::U32 => 0xFFFF_FFFF,
            Self::U64 => u64::MAX,
        }
    }
}

/// Byte order of an element relative to the (big-endian) bus.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum Endian {
    /// Elements are taken as the bus presents them.
    #[default]
    Big,
    /// Each element is byte-swapped.
    Little,
}

/// Element format of a typed access: width combined with byte order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Format {
    /// Element width.
    pub width: Width,
    /// Element byte order.
    pub endian: Endian,
}

impl Format {
    /// 8-bit elements.
    pub const B8: Self = Self::new(Width::U8, Endian::Big);
    /// Big-endian 16-bit elements.
    pub const BE16: Self = Self::new(Width::U16, Endian::Big);
    /// Little-endian 16-bit elements.
    pub const LE16: Self = Self::new(Width::U16, Endian::Little);
    /// Big-endian 32-bit elements.
    pub const BE32: Self = Self::new(Width::U32, Endian::Big);
    /// Little-endian 32-bit elements.
    pub const LE32: Self = Self::new(Width::U32, Endian::Little);
    /// Big-endian 64-bit elements.
    pub const BE64: Self = Self::new(Width::U64, Endian::Big);
    /// Little-endian 64-bit elements.
    pub const LE64: Self = Self::new(Width::U64, Endian::Little);

    /// Combines a width with a byte order.
    pub const fn new(width: Width, endian: Endian) -> Self {
        Self { width, endian }
    }

    /// Converts a bus-native element into this format's byte order.
    #[inline]
    pub const fn from_bus(self, raw: u64) -> u64 {
        match self.endian {
            Endian::Big => raw & self.width.mask(),
            Endian::Little => swap(raw, self.width),
        }
    }

    /// Converts an element in this format's byte order into its bus-native form.
    #[inline]
    pub const fn to_bus(self, value: u64) -> u64 {
        // byte swapping is an involution
        self.from_bus(value)
    }
}

const fn swap(raw: u64, width: Width) -> u64 {
    match width {
        Width::U8 => raw & 0xFF,
        Width::U16 => (raw as u16).swap_bytes() as u64,
        Width::U32 => (raw as u32).swap_bytes() as u64,
        Width::U64 => raw.swap_bytes(),
    }
}

/// Address stride of a multi-element access (`modOffset` in register terms).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum AddrMode {
    /// Address advances by the element size (modOffset 0).
    #[default]
    Linear,
    /// Address stays fixed, e.g. for fifo data registers (modOffset 1).
    Frozen,
    /// Address toggles between the two 32-bit halves of a 64-bit register (modOffset 2).
    Toggle64,
}

impl AddrMode {
    /// Returns the address of element `index` for an access starting at `base`.
    #[inline]
    pub const fn address(self, base: u64, index: u64, width: Width) -> u64 {
        match self {
            Self::Linear => base + index * width.bytes(),
            Self::Frozen => base,
            Self::Toggle64 => base + (index & 1) * 4,
        }
    }
}

impl TryFrom<u32> for AddrMode {
    type Error = u32;

    fn try_from(mod_offset: u32) -> Result<Self, Self::Error> {
        match mod_offset {
            0 => Ok(Self::Linear),
            1 => Ok(Self::Frozen),
            2 => Ok(Self::Toggle64),
            other => Err(other),
        }
    }
}

/// Kind of a measured host access.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AccessKind {
    /// Read of LM32 shared memory or slave registers.
    Lm32Read,
    /// Write to LM32 shared memory or slave registers.
    Lm32Write,
    /// Read of the off-chip RAM.
    RamRead,
    /// Write to the off-chip RAM.
    RamWrite,
}

impl fmt::Display for AccessKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Lm32Read => "lm32-read",
            Self::Lm32Write => "lm32-write",
            Self::RamRead => "ram-read",
            Self::RamWrite => "ram-write",
        };
        f.write_str(s)
    }
}
