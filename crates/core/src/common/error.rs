//! Error and exception definitions.
//!
//! This module defines the failure kinds shared across the crate. It provides:
//! 1. **Transport Errors:** Failures of a serial-bus cycle.
//! 2. **CPU Exceptions:** Faults raised by firmware tasks, handled by the scheduler.
//! 3. **Umbrella Error:** `ScuError`, collecting the subsystem errors for callers that
//!    drive the whole application.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::ram::RamError;
use crate::ram::mmu::MmuError;

/// Failure of a serial-bus transport cycle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// No connection is open.
    #[error("transport is not connected")]
    NotConnected,
    /// The cycle was not acknowledged in time.
    #[error("transport cycle timed out after {0:?}")]
    Timeout(Duration),
    /// No device answered at the given address.
    #[error("bus error at address {addr:#x}")]
    BusError {
        /// Faulting bus address.
        addr: u64,
    },
    /// A single cycle carried more operations than the transport allows.
    #[error("cycle of {len} operations exceeds the limit of {max}")]
    CycleTooLong {
        /// Requested cycle length.
        len: usize,
        /// Transport limit.
        max: usize,
    },
    /// The process-wide device lock could not be taken.
    #[error("device lock failed: {0}")]
    Lock(String),
}

/// CPU exception raised while a firmware task runs.
///
/// The scheduler logs the exception and either halts or restarts the
/// application according to the configured [`ExceptionPolicy`](crate::config::ExceptionPolicy).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Exception {
    /// Bus access without acknowledge; the associated value is the address.
    BusFault(u64),
    /// Software trap with its trap code.
    Trap(u32),
    /// Integer division by zero.
    DivideByZero,
    /// Access outside any mapped region; the associated value is the address.
    SegmentationFault(u64),
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BusFault(addr) => write!(f, "BusFault({addr:#x})"),
            Self::Trap(code) => write!(f, "Trap({code})"),
            Self::DivideByZero => write!(f, "DivideByZero"),
            Self::SegmentationFault(addr) => write!(f, "SegmentationFault({addr:#x})"),
        }
    }
}

impl std::error::Error for Exception {}

impl From<TransportError> for Exception {
    /// A transport failure inside a task is reported as bus fault.
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::BusError { addr } => Self::BusFault(addr),
            _ => Self::BusFault(0),
        }
    }
}

impl From<RamError> for Exception {
    /// An access beyond the RAM is a segmentation fault, everything else a bus fault.
    fn from(err: RamError) -> Self {
        match err {
            RamError::Transport(err) => err.into(),
            RamError::OutOfRange { index, .. } => Self::SegmentationFault(index),
            _ => Self::BusFault(0),
        }
    }
}

/// Crate-level error collecting subsystem failures.
#[derive(Debug, Error)]
pub enum ScuError {
    /// Serial-bus transport failure.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// Partition table failure.
    #[error(transparent)]
    Mmu(#[from] MmuError),
    /// Off-chip RAM failure.
    #[error(transparent)]
    Ram(#[from] RamError),
    /// Malformed configuration.
    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),
    /// A required device is missing from the bus directory.
    #[error("device {0} is absent")]
    DeviceAbsent(&'static str),
    /// A caller supplied an out-of-range argument.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// A wait did not complete in time.
    #[error("timed out waiting for {0}")]
    Timeout(&'static str),
}
