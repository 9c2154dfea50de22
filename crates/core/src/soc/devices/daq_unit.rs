//! DAQ channel model.
//!
//! Every channel digitizes a deterministic test waveform. Continuous modes collect
//! short blocks into the channel fifo; high-resolution and post-mortem modes produce
//! one long block into the pm fifo. A completed block is the payload followed by its
//! descriptor, exactly what the firmware drains from `FIFO_DATA` / `PM_DATA`.
//!
//! The continuous fifo holds one block. A block completing while the previous one is
//! still undrained is lost; its sequence number is consumed all the same, so the
//! loss shows up as a gap downstream.

use std::collections::VecDeque;

use tracing::{debug, warn};

use crate::common::constants::{DAQ_FIFO_PM_HIRES_WORD_SIZE, DAQ_MAX_CHANNELS};
use crate::protocol::daq_block::payload_crc;
use crate::protocol::slave::daq;
use crate::protocol::{BlockKind, DaqMode, Descriptor};

/// Accelerator time advanced per tick, in nanoseconds (10 kHz).
pub const NS_PER_TICK: u64 = 100_000;

/// Samples produced per tick in a given mode.
const fn samples_per_tick(mode: DaqMode) -> usize {
    match mode {
        DaqMode::Continuous1ms => 5,
        DaqMode::Continuous100us => 50,
        DaqMode::Continuous10us | DaqMode::HiRes | DaqMode::PostMortem => 500,
    }
}

/// Notifications raised by one DAQ tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DaqEvents {
    /// A short block is ready.
    pub fifo_full: bool,
    /// A long block is ready.
    pub hires_done: bool,
}

/// Register-level model of one DAQ channel.
#[derive(Debug)]
pub struct DaqChannel {
    number: u8,
    ctrl: u16,
    trigger: u32,
    delay: u16,
    fifo: VecDeque<u16>,
    pm: VecDeque<u16>,
    collecting: Vec<u16>,
    history: VecDeque<u16>,
    hires_captured: bool,
    sequence: u16,
    phase: u32,
    overruns: u32,
    forged_origin: Option<(u8, u8)>,
}

impl DaqChannel {
    fn new(number: u8) -> Self {
        Self {
            number,
            ctrl: 0,
            trigger: 0,
            delay: 0,
            fifo: VecDeque::new(),
            pm: VecDeque::new(),
            collecting: Vec::new(),
            history: VecDeque::new(),
            hires_captured: false,
            sequence: 0,
            phase: 0,
            overruns: 0,
            forged_origin: None,
        }
    }

    /// Blocks lost because the fifo was still full.
    pub const fn overruns(&self) -> u32 {
        self.overruns
    }

    /// Next sequence number this channel will stamp.
    pub const fn next_sequence(&self) -> u16 {
        self.sequence
    }

    /// Current control register.
    pub const fn ctrl(&self) -> u16 {
        self.ctrl
    }

    fn mode(&self) -> Option<DaqMode> {
        DaqMode::from_selector(self.ctrl & 0x1F)
    }

    fn sample(&mut self) -> u16 {
        self.phase = self.phase.wrapping_add(1);
        (self.phase.wrapping_mul(37) as u16).wrapping_add(u16::from(self.number) * 1000)
    }

    fn finish_block(&mut self, slot: u8, mode: DaqMode, payload: &[u16], now: u64) -> Vec<u16> {
        let (slot, channel) = self.forged_origin.take().unwrap_or((slot, self.number));
        let descriptor = Descriptor {
            slot,
            channel,
            mode: mode.selector(),
            trigger: self.trigger,
            timestamp: now * NS_PER_TICK,
            sequence: self.sequence,
            crc: payload_crc(payload),
        };
        self.sequence = self.sequence.wrapping_add(1);
        let mut words = payload.to_vec();
        words.extend_from_slice(&descriptor.to_words());
        words
    }

    fn tick(&mut self, slot: u8, now: u64) -> DaqEvents {
        let mut events = DaqEvents::default();
        let Some(mode) = self.mode() else {
            return events;
        };
        let n = samples_per_tick(mode);
        match mode {
            DaqMode::HiRes => {
                if self.hires_captured {
                    return events;
                }
                for _ in 0..n {
                    let s = self.sample();
                    self.collecting.push(s);
                }
                if self.collecting.len() >= DAQ_FIFO_PM_HIRES_WORD_SIZE {
                    let payload: Vec<u16> = self.collecting.drain(..).take(DAQ_FIFO_PM_HIRES_WORD_SIZE).collect();
                    let block = self.finish_block(slot, mode, &payload, now);
                    self.pm.clear();
                    self.pm.extend(block);
                    self.hires_captured = true;
                    events.hires_done = true;
                }
            }
            DaqMode::PostMortem => {
                for _ in 0..n {
                    let s = self.sample();
                    self.history.push_back(s);
                }
                while self.history.len() > DAQ_FIFO_PM_HIRES_WORD_SIZE {
                    let _ = self.history.pop_front();
                }
            }
            _ => {
                let block_len = BlockKind::Short.payload_samples();
                for _ in 0..n {
                    let s = self.sample();
                    self.collecting.push(s);
                    if self.collecting.len() == block_len {
                        let payload = std::mem::take(&mut self.collecting);
                        let block = self.finish_block(slot, mode, &payload, now);
                        if self.fifo.is_empty() {
                            self.fifo.extend(block);
                            events.fifo_full = true;
                        } else {
                            self.overruns += 1;
                            warn!(slot, channel = self.number, "daq fifo overrun, block lost");
                        }
                    }
                }
            }
        }
        events
    }

    fn write_ctrl(&mut self, slot: u8, val: u16, now: u64) -> DaqEvents {
        let mut events = DaqEvents::default();
        let was = self.ctrl;
        self.ctrl = val & 0x3F;
        if was & daq::CTRL_PM != 0 && val & daq::CTRL_PM == 0 && !self.history.is_empty() {
            let mut payload: Vec<u16> = self.history.drain(..).collect();
            payload.resize(DAQ_FIFO_PM_HIRES_WORD_SIZE, 0);
            let block = self.finish_block(slot, DaqMode::PostMortem, &payload, now);
            self.pm.clear();
            self.pm.extend(block);
            events.hires_done = true;
            debug!(slot, channel = self.number, "post-mortem frozen");
        }
        if val & daq::CTRL_HIRES == 0 {
            self.hires_captured = false;
        }
        if (was ^ val) & 0x1F != 0 {
            self.collecting.clear();
        }
        events
    }

    fn read(&mut self, reg: u64) -> u16 {
        match reg {
            daq::CTRL => self.ctrl,
            daq::TRIG_LO => self.trigger as u16,
            daq::TRIG_HI => (self.trigger >> 16) as u16,
            daq::TRIG_DLY => self.delay,
            daq::FIFO_WORDS => self.fifo.len() as u16,
            daq::FIFO_DATA => self.fifo.pop_front().unwrap_or(0),
            daq::PM_WORDS => self.pm.len() as u16,
            daq::PM_DATA => self.pm.pop_front().unwrap_or(0),
            _ => 0,
        }
    }
}

/// DAQ block of a slave card: up to four channels and a pending register.
#[derive(Debug)]
pub struct DaqUnit {
    channels: Vec<DaqChannel>,
    pending: u16,
    now: u64,
}

impl Default for DaqUnit {
    fn default() -> Self {
        Self::new()
    }
}

impl DaqUnit {
    /// Creates a unit with all four channels idle.
    pub fn new() -> Self {
        Self {
            channels: (1..=DAQ_MAX_CHANNELS).map(DaqChannel::new).collect(),
            pending: 0,
            now: 0,
        }
    }

    /// Channel `number` (1-based).
    pub fn channel(&self, number: u8) -> Option<&DaqChannel> {
        self.channels.get(usize::from(number).checked_sub(1)?)
    }

    /// Makes the next block of channel `number` carry a forged origin in its descriptor.
    pub fn forge_next_origin(&mut self, number: u8, slot: u8, channel: u8) {
        if let Some(ch) = usize::from(number).checked_sub(1).and_then(|i| self.channels.get_mut(i)) {
            ch.forged_origin = Some((slot, channel));
        }
    }

    /// Raises the fifo-full flag of channel `number` without data behind it.
    pub fn raise_spurious_fifo_full(&mut self, number: u8) -> bool {
        if number == 0 || number > DAQ_MAX_CHANNELS {
            return false;
        }
        self.pending |= daq::fifo_full_bit(number);
        true
    }

    /// Pending register.
    pub const fn pending(&self) -> u16 {
        self.pending
    }

    /// Advances all channels by one tick.
    pub fn tick(&mut self, slot: u8) -> DaqEvents {
        self.now += 1;
        let mut events = DaqEvents::default();
        for ch in &mut self.channels {
            let e = ch.tick(slot, self.now);
            if e.fifo_full {
                self.pending |= daq::fifo_full_bit(ch.number);
                events.fifo_full = true;
            }
            if e.hires_done {
                self.pending |= daq::hires_bit(ch.number);
                events.hires_done = true;
            }
        }
        events
    }

    fn locate(offset: u64) -> Option<(usize, u64)> {
        let rel = offset.checked_sub(daq::CHANNEL_BASE)?;
        let index = (rel / daq::STRIDE) as usize;
        (index < usize::from(DAQ_MAX_CHANNELS)).then_some((index, rel % daq::STRIDE))
    }

    /// Reads a register of the DAQ window (`offset` relative to the slot).
    pub fn read(&mut self, offset: u64) -> u16 {
        if offset == daq::INT_PENDING {
            return self.pending;
        }
        match Self::locate(offset) {
            Some((index, reg)) => self.channels[index].read(reg),
            None => 0,
        }
    }

    /// Writes a register of the DAQ window; returns events raised by the write.
    pub fn write(&mut self, slot: u8, offset: u64, val: u16) -> DaqEvents {
        if offset == daq::INT_PENDING {
            self.pending &= !val;
            return DaqEvents::default();
        }
        let Some((index, reg)) = Self::locate(offset) else {
            return DaqEvents::default();
        };
        let now = self.now;
        let ch = &mut self.channels[index];
        match reg {
            daq::CTRL => {
                let events = ch.write_ctrl(slot, val, now);
                let number = ch.number;
                if events.hires_done {
                    self.pending |= daq::hires_bit(number);
                }
                return events;
            }
            daq::TRIG_LO => ch.trigger = (ch.trigger & 0xFFFF_0000) | u32::from(val),
            daq::TRIG_HI => ch.trigger = (ch.trigger & 0xFFFF) | u32::from(val) << 16,
            daq::TRIG_DLY => ch.delay = val,
            _ => {}
        }
        DaqEvents::default()
    }
}
