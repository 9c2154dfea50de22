//! Host error type.

use std::io;

use scu_core::common::TransportError;
use scu_core::protocol::BlockError;
use scu_core::ram::{MmuError, RamError};
use thiserror::Error;

/// Failure of a host-side operation.
#[derive(Debug, Error)]
pub enum HostError {
    /// Serial-bus transport failure.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// Partition table failure.
    #[error(transparent)]
    Mmu(#[from] MmuError),
    /// Off-chip RAM failure.
    #[error(transparent)]
    Ram(#[from] RamError),
    /// Malformed DAQ block in the ring.
    #[error(transparent)]
    Block(#[from] BlockError),
    /// Malformed configuration.
    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),
    /// File or lock failure.
    #[error(transparent)]
    Io(#[from] io::Error),
    /// A device is missing from the bus directory.
    #[error("device {0} is absent")]
    DeviceAbsent(&'static str),
    /// The shared memory does not carry the expected header.
    #[error("shared memory not initialized by the firmware")]
    NotInitialized,
    /// A caller supplied an out-of-range argument.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// The firmware did not finish a command in time.
    #[error("timed out waiting for {0}")]
    Timeout(&'static str),
    /// The command queue holds as many commands as it has slots.
    #[error("command queue full")]
    QueueFull,
}
