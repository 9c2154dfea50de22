//! Timing receiver event queue.
//!
//! Events are injected by the simulation driver. Each injected event posts an MSI on
//! the timing line carrying its tag; the handler then reads the queue head and pops it.

use std::collections::VecDeque;
use std::sync::Arc;

use tracing::debug;

use crate::common::constants::IRQ_LINE_TIMING;
use crate::protocol::slave::eca;
use crate::rtos::Msi;
use crate::soc::msi::MsiQueue;
use crate::soc::traits::Device;

/// Entries the hardware queue holds before it drops new events.
pub const ECA_QUEUE_DEPTH: usize = 64;

/// A timing event: tag plus deadline in accelerator nanoseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimingEvent {
    /// Event tag.
    pub tag: u32,
    /// Deadline.
    pub time: u64,
}

/// Timing receiver queue device.
#[derive(Debug)]
pub struct Eca {
    base: u64,
    queue: VecDeque<TimingEvent>,
    dropped: u64,
    msi: Arc<MsiQueue>,
}

impl Eca {
    /// Creates an empty queue at `base`.
    pub fn new(base: u64, msi: Arc<MsiQueue>) -> Self {
        Self {
            base,
            queue: VecDeque::new(),
            dropped: 0,
            msi,
        }
    }

    /// Delivers an event; returns `false` if the queue was full.
    pub fn inject(&mut self, event: TimingEvent) -> bool {
        if self.queue.len() >= ECA_QUEUE_DEPTH {
            self.dropped += 1;
            return false;
        }
        self.queue.push_back(event);
        self.msi.post(
            IRQ_LINE_TIMING,
            Msi {
                msg: event.tag,
                addr: event.time as u32,
                sel: u32::from(IRQ_LINE_TIMING),
            },
        );
        debug!(tag = format_args!("{:#x}", event.tag), time = event.time, "timing event");
        true
    }

    /// Events dropped on a full queue.
    pub const fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Events waiting.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Returns `true` if no event waits.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    fn head(&self) -> TimingEvent {
        self.queue.front().copied().unwrap_or_default()
    }
}

impl Device for Eca {
    fn name(&self) -> &str {
        "ECA"
    }

    fn address_range(&self) -> (u64, u64) {
        (self.base, eca::WINDOW)
    }

    fn read_u16(&mut self, offset: u64) -> u16 {
        let word = self.read_u32(offset & !3);
        if offset & 2 == 0 { (word >> 16) as u16 } else { word as u16 }
    }

    fn read_u32(&mut self, offset: u64) -> u32 {
        match offset {
            eca::COUNT => self.queue.len() as u32,
            eca::TAG => self.head().tag,
            eca::TIME_HI => (self.head().time >> 32) as u32,
            eca::TIME_LO => self.head().time as u32,
            _ => 0,
        }
    }

    fn write_u16(&mut self, offset: u64, _val: u16) {
        if offset & !3 == eca::POP {
            let _ = self.queue.pop_front();
        }
    }

    fn write_u32(&mut self, offset: u64, _val: u32) {
        if offset == eca::POP {
            let _ = self.queue.pop_front();
        }
    }

    fn as_eca_mut(&mut self) -> Option<&mut Eca> {
        Some(self)
    }
}
