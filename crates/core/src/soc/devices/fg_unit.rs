//! Function generator model.
//!
//! One FG owns a small fifo of parameter sets. Committing `START_L` pushes the staged
//! set; a broadcast start makes an enabled FG run. While running, the FG consumes one
//! set per segment (`step + 1` ticks long), reports a low fifo once per refill and
//! reports done after starving for [`STARVE_TICKS`] ticks with an empty fifo.

use std::collections::VecDeque;

use tracing::debug;

use crate::protocol::PolynomialParams;
use crate::protocol::slave::fg;

/// Ticks an FG may run dry before it reports done.
pub const STARVE_TICKS: u32 = 2;

/// Fifo level at or below which a running FG asks for more.
const LOW_WATERMARK: usize = 1;

/// Notifications raised by one FG tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FgEvents {
    /// Fifo ran low.
    pub fifo_low: bool,
    /// Ramp ended.
    pub done: bool,
}

/// Register-level model of one function generator.
#[derive(Debug, Default)]
pub struct FgUnit {
    cntrl: u16,
    staged: PolynomialParams,
    fifo: VecDeque<PolynomialParams>,
    running: bool,
    segment_left: u32,
    starving: u32,
    low_reported: bool,
    ramp_count: u32,
    tag: u32,
    actual: i32,
    starts: u32,
}

impl FgUnit {
    /// Creates an idle FG.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` while a ramp is running.
    pub const fn is_running(&self) -> bool {
        self.running
    }

    /// Parameter sets consumed since the last reset.
    pub const fn ramp_count(&self) -> u32 {
        self.ramp_count
    }

    /// Broadcast starts this FG has accepted.
    pub const fn starts(&self) -> u32 {
        self.starts
    }

    /// Parameter sets waiting in the fifo.
    pub fn fifo_level(&self) -> usize {
        self.fifo.len()
    }

    /// Current output value.
    pub const fn actual(&self) -> i32 {
        self.actual
    }

    /// Handles a broadcast start; only an enabled, idle FG starts.
    pub fn start(&mut self) {
        if self.cntrl & fg::CNTRL_ENABLE != 0 && !self.running {
            self.running = true;
            self.segment_left = 0;
            self.starving = 0;
            self.low_reported = false;
            self.starts += 1;
            debug!(level = self.fifo.len(), "fg started");
        }
    }

    fn reset(&mut self) {
        self.fifo.clear();
        self.running = false;
        self.segment_left = 0;
        self.starving = 0;
        self.low_reported = false;
        self.ramp_count = 0;
    }

    /// Reads the register at `reg` within the FG window.
    pub fn read(&self, reg: u64) -> u16 {
        match reg {
            fg::CNTRL => self.cntrl | if self.running { fg::CNTRL_RUNNING } else { 0 },
            fg::COEFF_A => self.staged.coeff_a as u16,
            fg::COEFF_B => self.staged.coeff_b as u16,
            fg::SHIFT => self.staged.shift_reg(),
            fg::START_H => (self.staged.coeff_c >> 16) as u16,
            fg::START_L => self.staged.coeff_c as u16,
            fg::RAMP_CNT_LO => self.ramp_count as u16,
            fg::RAMP_CNT_HI => (self.ramp_count >> 16) as u16,
            fg::TAG_LO => self.tag as u16,
            fg::TAG_HI => (self.tag >> 16) as u16,
            fg::FIFO_LEVEL => self.fifo.len() as u16,
            fg::ACTUAL_HI => (self.actual >> 16) as u16,
            fg::ACTUAL_LO => self.actual as u16,
            _ => 0,
        }
    }

    /// Writes the register at `reg` within the FG window.
    pub fn write(&mut self, reg: u64, val: u16) {
        match reg {
            fg::CNTRL => {
                if val & fg::CNTRL_RESET != 0 {
                    self.reset();
                }
                self.cntrl = val & !(fg::CNTRL_RESET | fg::CNTRL_RUNNING);
                self.staged.step = ((val >> 4) & 0x7) as u8;
                self.staged.freq = ((val >> 7) & 0x7) as u8;
                if val & fg::CNTRL_ENABLE == 0 {
                    self.running = false;
                }
            }
            fg::COEFF_A => self.staged.coeff_a = val as i16,
            fg::COEFF_B => self.staged.coeff_b = val as i16,
            fg::SHIFT => {
                self.staged.shift_a = (val & 0x3F) as u8;
                self.staged.shift_b = ((val >> 6) & 0x3F) as u8;
            }
            fg::START_H => {
                self.staged.coeff_c = (self.staged.coeff_c & 0xFFFF) | (i32::from(val as i16) << 16);
            }
            fg::START_L => {
                self.staged.coeff_c = (self.staged.coeff_c & !0xFFFF) | i32::from(val);
                if self.fifo.len() < fg::FIFO_DEPTH as usize {
                    self.fifo.push_back(self.staged);
                    self.low_reported = false;
                    self.starving = 0;
                }
            }
            fg::TAG_LO => self.tag = (self.tag & 0xFFFF_0000) | u32::from(val),
            fg::TAG_HI => self.tag = (self.tag & 0xFFFF) | u32::from(val) << 16,
            _ => {}
        }
    }

    /// Advances the FG by one tick.
    pub fn tick(&mut self) -> FgEvents {
        let mut events = FgEvents::default();
        if !self.running {
            return events;
        }
        if self.segment_left > 0 {
            self.segment_left -= 1;
            if self.segment_left > 0 {
                return events;
            }
        }
        if let Some(params) = self.fifo.pop_front() {
            self.segment_left = u32::from(params.step) + 1;
            self.actual = params.coeff_c;
            self.ramp_count += 1;
            self.starving = 0;
        } else {
            self.starving += 1;
            if self.starving > STARVE_TICKS {
                self.running = false;
                events.done = true;
                debug!(ramps = self.ramp_count, "fg done");
                return events;
            }
        }
        if self.fifo.len() <= LOW_WATERMARK && !self.low_reported {
            self.low_reported = true;
            events.fifo_low = true;
        }
        events
    }
}
