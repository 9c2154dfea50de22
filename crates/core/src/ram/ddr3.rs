//! DDR3 driver.
//!
//! The device exposes two windows:
//! 1. **Transparent:** Word `i` at `base + 8·i`, high half at `+0`, low half at `+4`.
//!    Writes go high then low (the low half commits), reads go low then high (the low
//!    half latches the word). Both halves of a word travel in one transport cycle.
//! 2. **Burst fifo:** Program a start index and a length of at most
//!    [`BURST_FIFO_SIZE`] words, poll the status register, then pop `(low, high)` pairs.

use std::fmt;

use tracing::trace;

use crate::access::{self, BusOp, Transport, TransportExt};
use crate::common::{AddrMode, Width};

use super::{RamAccess, RamError};

/// Depth of the burst fifo in 64-bit words.
pub const BURST_FIFO_SIZE: usize = 256;

/// Status polls without progress before a burst read without callback gives up.
pub const BURST_MAX_IDLE_POLLS: usize = 1000;

/// Register offsets of the burst window.
#[derive(Debug, Clone, Copy)]
pub struct BurstRegs;

impl BurstRegs {
    /// Start word index (write).
    pub const START: u64 = 0x00;
    /// Length in words (write; starts the transfer).
    pub const LEN: u64 = 0x04;
    /// Fifo status (read).
    pub const STATUS: u64 = 0x08;
    /// Low half of the fifo head (read; latches the head word).
    pub const DATA_LO: u64 = 0x0C;
    /// High half of the fifo head (read; pops the head word).
    pub const DATA_HI: u64 = 0x10;
    /// Size of the register window.
    pub const WINDOW: u64 = 0x20;

    /// Status: used word count.
    pub const STATUS_COUNT_MASK: u32 = 0x1FF;
    /// Status: fifo empty.
    pub const STATUS_EMPTY: u32 = 1 << 16;
    /// Status: fifo initialized.
    pub const STATUS_INITIALIZED: u32 = 1 << 17;
}

/// Decoded fifo status word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FifoStatus {
    /// Words available.
    pub count: usize,
    /// Fifo empty flag.
    pub empty: bool,
    /// Fifo initialized flag.
    pub initialized: bool,
}

impl FifoStatus {
    /// Decodes a raw status word.
    pub const fn from_raw(raw: u32) -> Self {
        Self {
            count: (raw & BurstRegs::STATUS_COUNT_MASK) as usize,
            empty: raw & BurstRegs::STATUS_EMPTY != 0,
            initialized: raw & BurstRegs::STATUS_INITIALIZED != 0,
        }
    }

    /// Encodes the status word.
    pub const fn to_raw(self) -> u32 {
        let mut raw = self.count as u32 & BurstRegs::STATUS_COUNT_MASK;
        if self.empty {
            raw |= BurstRegs::STATUS_EMPTY;
        }
        if self.initialized {
            raw |= BurstRegs::STATUS_INITIALIZED;
        }
        raw
    }
}

/// Poll callback of a burst read, called while the fifo is empty.
///
/// Receives the number of polls so far. A negative return aborts the read,
/// a positive return ends it early with the words read so far, zero continues.
pub type PollFn<'a> = &'a mut dyn FnMut(usize) -> i32;

/// DDR3 driver over a transport.
#[derive(Clone)]
pub struct Ddr3<T> {
    transport: T,
    base: u64,
    burst_base: Option<u64>,
    capacity64: u64,
    burst_read: bool,
}

impl<T> fmt::Debug for Ddr3<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ddr3")
            .field("base", &format_args!("{:#x}", self.base))
            .field("burst_base", &self.burst_base)
            .field("capacity64", &self.capacity64)
            .field("burst_read", &self.burst_read)
            .finish_non_exhaustive()
    }
}

impl<T: Transport> Ddr3<T> {
    /// Creates a driver for the transparent window at `base`.
    pub const fn new(transport: T, base: u64, capacity64: u64) -> Self {
        Self {
            transport,
            base,
            burst_base: None,
            capacity64,
            burst_read: false,
        }
    }

    /// Attaches the burst window at `burst_base`.
    #[must_use]
    pub fn with_burst(mut self, burst_base: u64) -> Self {
        self.burst_base = Some(burst_base);
        self
    }

    /// Routes [`RamAccess::read64`] through the burst window.
    pub fn set_burst_read(&mut self, on: bool) {
        self.burst_read = on;
    }

    /// Returns the underlying transport.
    pub const fn transport(&self) -> &T {
        &self.transport
    }

    /// Reads through the transparent window.
    pub fn read_transparent(&self, index: u64, out: &mut [u64]) -> Result<(), RamError> {
        self.check_range(index, out.len())?;
        access::ddr3_read(&self.transport, self.base + index * 8, out, AddrMode::Linear)?;
        Ok(())
    }

    /// Reads the fifo status.
    pub fn fifo_status(&self) -> Result<FifoStatus, RamError> {
        let base = self.burst_base.ok_or(RamError::NoBurstWindow)?;
        Ok(FifoStatus::from_raw(self.transport.read_u32(base + BurstRegs::STATUS)?))
    }

    /// Reads through the burst fifo window.
    ///
    /// # Arguments
    ///
    /// * `index` - First word index.
    /// * `out` - Destination; its length is the number of words requested.
    /// * `poll` - Callback run while the fifo is empty; `None` polls up to
    ///   [`BURST_MAX_IDLE_POLLS`] times.
    ///
    /// # Returns
    ///
    /// The number of words read; less than `out.len()` only if `poll` ended the read early.
    pub fn read_burst(
        &self,
        index: u64,
        out: &mut [u64],
        mut poll: Option<PollFn<'_>>,
    ) -> Result<usize, RamError> {
        self.check_range(index, out.len())?;
        let base = self.burst_base.ok_or(RamError::NoBurstWindow)?;
        let mut done = 0;
        while done < out.len() {
            let len = (out.len() - done).min(BURST_FIFO_SIZE);
            self.transport.cycle(&mut [
                BusOp::write(base + BurstRegs::START, Width::U32, index + done as u64),
                BusOp::write(base + BurstRegs::LEN, Width::U32, len as u64),
            ])?;
            let mut got = 0;
            let mut polls = 0;
            while got < len {
                let status = self.fifo_status()?;
                if !status.initialized {
                    return Err(RamError::Fifo("fifo not initialized"));
                }
                if status.empty || status.count == 0 {
                    polls += 1;
                    let verdict = match poll.as_mut() {
                        Some(cb) => cb(polls),
                        None if polls >= BURST_MAX_IDLE_POLLS => {
                            return Err(RamError::Fifo("fifo stayed empty"));
                        }
                        None => 0,
                    };
                    if verdict < 0 {
                        return Err(RamError::Aborted(verdict));
                    }
                    if verdict > 0 {
                        return Ok(done + got);
                    }
                    continue;
                }
                let n = status.count.min(len - got);
                let mut ops = Vec::with_capacity(2 * n);
                for _ in 0..n {
                    ops.push(BusOp::read(base + BurstRegs::DATA_LO, Width::U32));
                    ops.push(BusOp::read(base + BurstRegs::DATA_HI, Width::U32));
                }
                for chunk in ops.chunks_mut(self.transport.max_cycle_ops().max(2) & !1) {
                    self.transport.cycle(chunk)?;
                }
                for (k, pair) in ops.chunks_exact(2).enumerate() {
                    out[done + got + k] = pair[1].value << 32 | pair[0].value;
                }
                got += n;
            }
            trace!(index = index + done as u64, len, "burst read");
            done += len;
        }
        Ok(done)
    }
}

impl<T: Transport> RamAccess for Ddr3<T> {
    fn read64(&self, index: u64, out: &mut [u64]) -> Result<(), RamError> {
        if self.burst_read && self.burst_base.is_some() {
            let n = self.read_burst(index, out, None)?;
            if n != out.len() {
                return Err(RamError::Fifo("short burst read"));
            }
            Ok(())
        } else {
            self.read_transparent(index, out)
        }
    }

    fn write64(&self, index: u64, data: &[u64]) -> Result<(), RamError> {
        self.check_range(index, data.len())?;
        access::ddr3_write(&self.transport, self.base + index * 8, data, AddrMode::Linear)?;
        Ok(())
    }

    fn capacity64(&self) -> u64 {
        self.capacity64
    }
}
