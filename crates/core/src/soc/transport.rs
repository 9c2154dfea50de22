//! Transport over the simulated bus.
//!
//! Firmware tasks, IRQ handlers and the host library all reach the simulated SoC through
//! a [`SocTransport`]. One cycle holds the bus lock for its whole duration, so the
//! operations of a cycle are never interleaved with another caller's.

use std::sync::{Arc, Mutex};

use crate::access::{BusOp, Transport};
use crate::common::TransportError;
use crate::common::constants::MAX_CYCLE_OPS;
use crate::rtos::lock;
use crate::soc::interconnect::Bus;

/// Cloneable handle executing cycles on a shared [`Bus`].
#[derive(Debug, Clone)]
pub struct SocTransport {
    bus: Arc<Mutex<Bus>>,
    max_ops: usize,
}

impl SocTransport {
    /// Creates a transport on `bus` with the default cycle limit.
    pub const fn new(bus: Arc<Mutex<Bus>>) -> Self {
        Self {
            bus,
            max_ops: MAX_CYCLE_OPS,
        }
    }

    /// Returns a transport with a smaller cycle limit (at least 1).
    #[must_use]
    pub fn with_max_cycle_ops(mut self, max_ops: usize) -> Self {
        self.max_ops = max_ops.clamp(1, MAX_CYCLE_OPS);
        self
    }
}

impl Transport for SocTransport {
    fn cycle(&self, ops: &mut [BusOp]) -> Result<(), TransportError> {
        if ops.len() > self.max_ops {
            return Err(TransportError::CycleTooLong {
                len: ops.len(),
                max: self.max_ops,
            });
        }
        lock(&self.bus).cycle(ops)
    }

    fn max_cycle_ops(&self) -> usize {
        self.max_ops
    }
}
