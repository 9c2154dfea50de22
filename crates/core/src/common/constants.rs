//! Global System Constants.
//!
//! This module defines system-wide constants shared by the firmware, the simulated
//! SoC and the host. It includes:
//! 1. **Backplane Constants:** Slot count and register-file stride.
//! 2. **Transport Constants:** Cycle length limit and the directory sentinel.
//! 3. **IRQ Constants:** MSI line assignment and slot pending flags.
//! 4. **DAQ Constants:** Channel count and fifo block geometry.

/// Number of slots on one backplane.
pub const MAX_SLOTS: usize = 12;

/// Address stride between two slot register files.
pub const SLOT_STRIDE: u64 = 0x20000;

/// Maximum number of operations carried by one transport cycle.
pub const MAX_CYCLE_OPS: usize = 255;

/// Sentinel returned by the bus directory for absent devices.
pub const ADDRESS_NOT_FOUND: u64 = 0xFFFF_FFFE;

/// Register value read from an empty backplane slot.
pub const EMPTY_SLOT_PATTERN: u16 = 0xDEAD;

/// Number of MSI lines handled by the interrupt fabric.
pub const MAX_IRQ_LINES: usize = 8;
/// MSI line of the timing receiver.
pub const IRQ_LINE_TIMING: u8 = 0;
/// MSI line of the backplane slaves.
pub const IRQ_LINE_BACKPLANE: u8 = 1;
/// MSI line of the extension-bus controller.
pub const IRQ_LINE_MIL: u8 = 2;
/// MSI line used as software doorbell.
pub const IRQ_LINE_SOFTWARE: u8 = 3;

/// Slot pending flag: FG 0 fifo below threshold.
pub const PEND_FG0_FIFO_LOW: u16 = 1 << 0;
/// Slot pending flag: FG 0 ramp finished.
pub const PEND_FG0_DONE: u16 = 1 << 1;
/// Slot pending flag: FG 1 fifo below threshold.
pub const PEND_FG1_FIFO_LOW: u16 = 1 << 2;
/// Slot pending flag: FG 1 ramp finished.
pub const PEND_FG1_DONE: u16 = 1 << 3;
/// Slot pending flag: continuous DAQ block ready.
pub const PEND_DAQ_FIFO_FULL: u16 = 1 << 4;
/// Slot pending flag: high-resolution or post-mortem block ready.
pub const PEND_DAQ_HIRES_DONE: u16 = 1 << 5;
/// All FG related pending flags.
pub const PEND_FG_MASK: u16 = PEND_FG0_FIFO_LOW | PEND_FG0_DONE | PEND_FG1_FIFO_LOW | PEND_FG1_DONE;
/// All DAQ related pending flags.
pub const PEND_DAQ_MASK: u16 = PEND_DAQ_FIFO_FULL | PEND_DAQ_HIRES_DONE;

/// Number of DAQ channels per card.
pub const DAQ_MAX_CHANNELS: u8 = 4;

/// Samples in a continuous-mode block payload.
pub const DAQ_FIFO_DAQ_WORD_SIZE: usize = 500;

/// Samples in a high-resolution / post-mortem block payload.
pub const DAQ_FIFO_PM_HIRES_WORD_SIZE: usize = 4084;

/// Sixteen-bit words of a block descriptor.
pub const DAQ_DESCRIPTOR_WORD_SIZE: usize = 12;

/// Number of function generators per backplane card at most.
pub const MAX_FG_PER_SOCKET: u8 = 2;
