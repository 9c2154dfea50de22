//! Wire formats shared by firmware and host.
//!
//! This module defines the layouts both sides of the serial bus agree on. It includes:
//! 1. **DAQ blocks:** Header, packed payload and descriptor of a block in the ring.
//! 2. **FG records:** Macro table entries, channel registers, polynomial parameters.
//! 3. **Commands:** Opcodes and argument encodings.
//! 4. **Shared memory:** The LM32 shared memory layout and its typed accessor.

/// Host-to-firmware commands.
pub mod command;

/// DAQ block wire format.
pub mod daq_block;

/// Function generator records.
pub mod fg;

/// LM32 shared memory.
pub mod shared;

/// Backplane slave register map.
pub mod slave;

pub use command::{DaqArg, Opcode, RawCommand};
pub use daq_block::{BlockError, BlockKind, DaqBlock, DaqMode, Descriptor};
pub use fg::{ChannelReg, FgMacro, FgState, PolynomialParams};
pub use shared::{ChannelField, Counter, SharedMemory};
