//! Common utilities and types used throughout the SCU core.
//!
//! This module provides fundamental building blocks that are shared across all components
//! of the firmware, the simulated SoC and the host library. It includes:
//! 1. **Address Types:** Strong types for backplane slots, FG sockets and DAQ channels.
//! 2. **Constants:** System-wide constants for the backplane, IRQ lines and DAQ blocks.
//! 3. **Bus Access:** Element widths, byte orders, address modes and access kinds.
//! 4. **Error Handling:** Transport errors, CPU exceptions and the crate-level error.

/// Slot, socket and channel identifiers.
pub mod addr;

/// Common constants used throughout the core.
pub mod constants;

/// Bus access type definitions.
pub mod data;

/// Error types and exception definitions.
pub mod error;

pub use addr::{ChannelId, Slot, Socket, SocketKind};
pub use data::{AccessKind, AddrMode, Endian, Format, Width};
pub use error::{Exception, ScuError, TransportError};
