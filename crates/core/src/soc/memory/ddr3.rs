//! DDR3 controller model.
//!
//! The transparent window maps word `i` at `8·i`: the high half at `+0` is staged,
//! writing the low half at `+4` commits the word; reading the low half latches the
//! word, reading the high half returns the latched upper half. The burst registers
//! follow the transparent window (see [`BurstRegs`]).

use std::collections::VecDeque;

use tracing::debug;

use super::buffer::DramBuffer;
use crate::ram::BurstRegs;
use crate::ram::ddr3::{BURST_FIFO_SIZE, FifoStatus};
use crate::soc::traits::Device;

/// Words moved from the array into the burst fifo per status poll.
const BURST_FILL_PER_POLL: usize = 64;

/// DDR3 device with transparent and burst windows.
#[derive(Debug)]
pub struct Ddr3Device {
    buffer: DramBuffer,
    base: u64,
    staged_high: u32,
    latched: u64,
    burst_start: u32,
    burst_next: u64,
    burst_remaining: usize,
    fifo: VecDeque<u64>,
    fifo_latched: u64,
}

impl Ddr3Device {
    /// Creates a DDR3 of `capacity64` words at `base`.
    pub fn new(base: u64, capacity64: u64) -> std::io::Result<Self> {
        Ok(Self {
            buffer: DramBuffer::new(capacity64 as usize)?,
            base,
            staged_high: 0,
            latched: 0,
            burst_start: 0,
            burst_next: 0,
            burst_remaining: 0,
            fifo: VecDeque::with_capacity(BURST_FIFO_SIZE),
            fifo_latched: 0,
        })
    }

    /// Address of the burst register window.
    pub fn burst_base(&self) -> u64 {
        self.base + self.window_size()
    }

    fn window_size(&self) -> u64 {
        self.buffer.len() as u64 * 8
    }

    fn fill_fifo(&mut self) {
        let n = self.burst_remaining.min(BURST_FILL_PER_POLL).min(BURST_FIFO_SIZE - self.fifo.len());
        for _ in 0..n {
            self.fifo.push_back(self.buffer.read(self.burst_next as usize));
            self.burst_next += 1;
        }
        self.burst_remaining -= n;
    }

    fn status(&self) -> FifoStatus {
        FifoStatus {
            count: self.fifo.len(),
            empty: self.fifo.is_empty(),
            initialized: true,
        }
    }

    fn read_burst_reg(&mut self, reg: u64) -> u32 {
        match reg {
            BurstRegs::START => self.burst_start,
            BurstRegs::LEN => self.burst_remaining as u32,
            BurstRegs::STATUS => {
                let status = self.status();
                self.fill_fifo();
                status.to_raw()
            }
            BurstRegs::DATA_LO => {
                self.fifo_latched = self.fifo.front().copied().unwrap_or(0);
                self.fifo_latched as u32
            }
            BurstRegs::DATA_HI => {
                let _ = self.fifo.pop_front();
                (self.fifo_latched >> 32) as u32
            }
            _ => 0,
        }
    }

    fn write_burst_reg(&mut self, reg: u64, val: u32) {
        match reg {
            BurstRegs::START => self.burst_start = val,
            BurstRegs::LEN => {
                self.fifo.clear();
                self.burst_next = u64::from(self.burst_start);
                self.burst_remaining = (val as usize).min(BURST_FIFO_SIZE);
                debug!(start = self.burst_start, len = self.burst_remaining, "ddr3 burst started");
            }
            _ => {}
        }
    }
}

impl Device for Ddr3Device {
    fn name(&self) -> &str {
        "DDR3"
    }

    fn address_range(&self) -> (u64, u64) {
        (self.base, self.window_size() + BurstRegs::WINDOW)
    }

    fn read_u16(&mut self, offset: u64) -> u16 {
        let word = self.read_u32(offset & !3);
        if offset & 2 == 0 { (word >> 16) as u16 } else { word as u16 }
    }

    fn read_u32(&mut self, offset: u64) -> u32 {
        if offset >= self.window_size() {
            return self.read_burst_reg(offset - self.window_size());
        }
        if offset & 4 == 0 {
            (self.latched >> 32) as u32
        } else {
            self.latched = self.buffer.read((offset / 8) as usize);
            self.latched as u32
        }
    }

    fn read_u64(&mut self, offset: u64) -> u64 {
        self.buffer.read((offset / 8) as usize)
    }

    fn write_u16(&mut self, _offset: u64, _val: u16) {}

    fn write_u32(&mut self, offset: u64, val: u32) {
        if offset >= self.window_size() {
            self.write_burst_reg(offset - self.window_size(), val);
        } else if offset & 4 == 0 {
            self.staged_high = val;
        } else {
            let word = u64::from(self.staged_high) << 32 | u64::from(val);
            self.buffer.write((offset / 8) as usize, word);
        }
    }

    fn write_u64(&mut self, offset: u64, val: u64) {
        self.buffer.write((offset / 8) as usize, val);
    }
}
