//! Backplane slave register map.
//!
//! All registers are 16 bits wide; offsets are bytes relative to the slot base
//! (`bus_base + slot · 0x20000`). Only the registers the firmware touches are listed.

/// Card system id.
pub const CID_SYSTEM: u64 = 0x00;
/// Card group id.
pub const CID_GROUP: u64 = 0x02;
/// Slave firmware version.
pub const SLAVE_VERSION: u64 = 0x04;
/// Pending interrupt flags, write one to clear.
pub const INT_PENDING: u64 = 0x20;
/// Interrupt enable mask.
pub const INT_ENABLE: u64 = 0x22;
/// Broadcast target: any write starts every enabled FG of the card.
pub const FG_START: u64 = 0x24;

/// System id of SCU cards.
pub const SYS_CSCO: u16 = 55;
/// Group: analog in/out card with two FGs and DAQ channels.
pub const GRP_ADDAC: u16 = 3;
/// Group: DAQ-only card.
pub const GRP_DAQ: u16 = 38;
/// Group: single-FG card.
pub const GRP_ACU: u16 = 0x42;
/// Group: extension-bus adapter.
pub const GRP_MIL_ADAPTER: u16 = 26;

/// Function generator register window.
pub mod fg {
    /// Offset of FG 0; FG `d` is at `BASE + d · STRIDE`.
    pub const BASE: u64 = 0x300;
    /// Distance between two FG windows.
    pub const STRIDE: u64 = 0x40;

    /// Control register.
    pub const CNTRL: u64 = 0x00;
    /// Coefficient a.
    pub const COEFF_A: u64 = 0x02;
    /// Coefficient b.
    pub const COEFF_B: u64 = 0x04;
    /// Shifts of a and b.
    pub const SHIFT: u64 = 0x06;
    /// Start value, high half.
    pub const START_H: u64 = 0x08;
    /// Start value, low half; writing commits the staged set to the fifo.
    pub const START_L: u64 = 0x0A;
    /// Consumed parameter sets, low half.
    pub const RAMP_CNT_LO: u64 = 0x0C;
    /// Consumed parameter sets, high half.
    pub const RAMP_CNT_HI: u64 = 0x0E;
    /// Start tag, low half.
    pub const TAG_LO: u64 = 0x10;
    /// Start tag, high half.
    pub const TAG_HI: u64 = 0x12;
    /// Parameter sets in the fifo.
    pub const FIFO_LEVEL: u64 = 0x14;
    /// Output value, high half.
    pub const ACTUAL_HI: u64 = 0x16;
    /// Output value, low half.
    pub const ACTUAL_LO: u64 = 0x18;

    /// `CNTRL`: enable.
    pub const CNTRL_ENABLE: u16 = 1 << 0;
    /// `CNTRL`: reset (self clearing).
    pub const CNTRL_RESET: u16 = 1 << 1;
    /// `CNTRL`: step and frequency selector bits.
    pub const CNTRL_PARAM_MASK: u16 = 0x3F0;
    /// `CNTRL`: running (read only).
    pub const CNTRL_RUNNING: u16 = 1 << 15;

    /// Depth of the parameter fifo.
    pub const FIFO_DEPTH: u16 = 8;

    /// Offset of FG `device` within a slot.
    pub const fn window(device: u8) -> u64 {
        BASE + device as u64 * STRIDE
    }
}

/// Extension-bus port, on an adapter card or on the controller itself.
pub mod mil {
    /// Number of interface cards present.
    pub const IFK_COUNT: u64 = 0x40;
    /// First entry of the interface-card address list.
    pub const IFK_LIST: u64 = 0x42;
    /// Offset of the FG window of interface card 0.
    pub const FG_BASE: u64 = 0x800;
    /// Distance between two interface-card FG windows.
    pub const FG_STRIDE: u64 = 0x40;
    /// Broadcast start counter (read) and trigger (write).
    pub const BROADCAST: u64 = 0x24;

    /// Offset of the FG window of interface card `ifk`.
    pub const fn window(ifk: u8) -> u64 {
        FG_BASE + ifk as u64 * FG_STRIDE
    }
}

/// DAQ block.
pub mod daq {
    /// Pending flags, write one to clear: bits 0..3 fifo full, bits 8..11 hires/pm done.
    pub const INT_PENDING: u64 = 0x1000;
    /// Offset of channel 1; channel `c` (1-based) is at `CHANNEL_BASE + (c-1) · STRIDE`.
    pub const CHANNEL_BASE: u64 = 0x1020;
    /// Distance between two channel windows.
    pub const STRIDE: u64 = 0x20;

    /// Control register.
    pub const CTRL: u64 = 0x00;
    /// Trigger tag, low half.
    pub const TRIG_LO: u64 = 0x02;
    /// Trigger tag, high half.
    pub const TRIG_HI: u64 = 0x04;
    /// Trigger delay.
    pub const TRIG_DLY: u64 = 0x06;
    /// Words in the continuous fifo.
    pub const FIFO_WORDS: u64 = 0x08;
    /// Continuous fifo data (pop on read).
    pub const FIFO_DATA: u64 = 0x0A;
    /// Words in the hires/pm fifo.
    pub const PM_WORDS: u64 = 0x0C;
    /// Hires/pm fifo data (pop on read).
    pub const PM_DATA: u64 = 0x0E;

    /// `CTRL`: continuous, 1 ms.
    pub const CTRL_CONT_1MS: u16 = 1 << 0;
    /// `CTRL`: continuous, 100 µs.
    pub const CTRL_CONT_100US: u16 = 1 << 1;
    /// `CTRL`: continuous, 10 µs.
    pub const CTRL_CONT_10US: u16 = 1 << 2;
    /// `CTRL`: high resolution.
    pub const CTRL_HIRES: u16 = 1 << 3;
    /// `CTRL`: post mortem.
    pub const CTRL_PM: u16 = 1 << 4;
    /// `CTRL`: trigger enable.
    pub const CTRL_TRIGGER: u16 = 1 << 5;
    /// `CTRL`: all continuous rate bits.
    pub const CTRL_CONT_MASK: u16 = CTRL_CONT_1MS | CTRL_CONT_100US | CTRL_CONT_10US;

    /// Offset of channel `channel` (1-based).
    pub const fn window(channel: u8) -> u64 {
        CHANNEL_BASE + (channel as u64 - 1) * STRIDE
    }

    /// `INT_PENDING` fifo-full bit of `channel` (1-based).
    pub const fn fifo_full_bit(channel: u8) -> u16 {
        1 << (channel - 1)
    }

    /// `INT_PENDING` hires/pm bit of `channel` (1-based).
    pub const fn hires_bit(channel: u8) -> u16 {
        1 << (channel + 7)
    }
}

/// Backplane master registers in the slot 0 window.
pub mod master {
    /// Slot bitmap selected for broadcasts.
    pub const SLAVE_SELECT: u64 = 0x00;
    /// Register offset a broadcast writes to.
    pub const BROADCAST_OFFSET: u64 = 0x02;
    /// Writing broadcasts the value to every selected slot.
    pub const BROADCAST_DATA: u64 = 0x04;
    /// Bitmap of equipped slots.
    pub const SLAVE_PRESENT: u64 = 0x06;
}

/// Timing receiver event queue.
pub mod eca {
    /// Events pending.
    pub const COUNT: u64 = 0x00;
    /// Event tag of the head entry.
    pub const TAG: u64 = 0x04;
    /// Deadline of the head entry, high half.
    pub const TIME_HI: u64 = 0x08;
    /// Deadline of the head entry, low half.
    pub const TIME_LO: u64 = 0x0C;
    /// Writing pops the head entry.
    pub const POP: u64 = 0x10;
    /// Size of the register window.
    pub const WINDOW: u64 = 0x20;
}
