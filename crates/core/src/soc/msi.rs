//! Message-signalled interrupt queue of the simulated SoC.
//!
//! Devices post `(line, msi)` pairs; the firmware's IRQ table drains them through the
//! [`MsiSource`] trait. Each line keeps its own FIFO, so a burst of backplane MSIs
//! never overtakes a timing MSI posted earlier on another line.

use std::collections::VecDeque;
use std::sync::Mutex;

use tracing::trace;

use crate::common::constants::MAX_IRQ_LINES;
use crate::rtos::{Msi, MsiSource, lock};

/// MSI FIFOs, one per interrupt line.
#[derive(Debug, Default)]
pub struct MsiQueue {
    lines: Mutex<[VecDeque<Msi>; MAX_IRQ_LINES]>,
}

impl MsiQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Posts an MSI on `line`; out-of-range lines are dropped.
    pub fn post(&self, line: u8, msi: Msi) {
        let mut lines = lock(&self.lines);
        if let Some(fifo) = lines.get_mut(line as usize) {
            fifo.push_back(msi);
            trace!(line, depth = fifo.len(), ?msi, "msi posted");
        }
    }

    /// Number of MSIs waiting on all lines.
    pub fn len(&self) -> usize {
        lock(&self.lines).iter().map(VecDeque::len).sum()
    }

    /// Returns `true` if no MSI is waiting.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every waiting MSI.
    pub fn clear(&self) {
        lock(&self.lines).iter_mut().for_each(VecDeque::clear);
    }
}

impl MsiSource for MsiQueue {
    fn pending_lines(&self) -> u32 {
        lock(&self.lines)
            .iter()
            .enumerate()
            .filter(|(_, fifo)| !fifo.is_empty())
            .fold(0, |acc, (line, _)| acc | 1 << line)
    }

    fn pop(&self, line: u8) -> Option<Msi> {
        lock(&self.lines).get_mut(line as usize)?.pop_front()
    }
}
