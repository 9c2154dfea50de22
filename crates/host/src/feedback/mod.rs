//! DAQ feedback administration.
//!
//! The firmware appends DAQ blocks to a ring in the off-chip RAM. The
//! [`FeedbackAdmin`] is the one consumer of that ring on the host. Each poll it:
//! 1. **Reads the admin:** Skips the poll while the firmware has not folded in the
//!    previous acknowledge.
//! 2. **Bulk-reads:** Takes every available word in as few cycles as the RAM allows.
//! 3. **Demultiplexes:** Splits the words into blocks by their headers, checks the
//!    CRC and hands each block to the subscriber of its `(slot, channel)`. Blocks
//!    nobody subscribed to are counted and dropped.
//! 4. **Acknowledges:** Writes the consumed word count for the firmware to fold in.

/// Per-channel receive statistics.
pub mod statistics;

/// Block subscribers.
pub mod subscriber;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use scu_core::common::{ChannelId, Slot};
use scu_core::protocol::{BlockError, DaqBlock};
use scu_core::ram::{Mmu, RamAccess, SharedRing};
use tracing::{debug, info, trace, warn};

use crate::config::HostConfig;
use crate::error::HostError;

pub use statistics::{ChannelStats, FeedbackStats};
pub use subscriber::{Collector, SharedCollector, Subscriber};

/// Outcome of one poll.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PollReport {
    /// The ring was not read because the last acknowledge is still pending.
    pub skipped: bool,
    /// Words acknowledged.
    pub words: u32,
    /// Blocks decoded.
    pub blocks: u32,
    /// Blocks handed to a subscriber.
    pub delivered: u32,
    /// Blocks whose CRC did not match.
    pub crc_errors: u32,
}

/// Host-side consumer of the DAQ ring.
pub struct FeedbackAdmin<R> {
    mmu: Mmu<R>,
    ring: SharedRing<R>,
    subscribers: BTreeMap<ChannelId, Box<dyn Subscriber>>,
    stats: FeedbackStats,
    buffer: Vec<u64>,
    poll_interval: Duration,
}

impl<R> fmt::Debug for FeedbackAdmin<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeedbackAdmin")
            .field("subscribers", &self.subscribers.keys().collect::<Vec<_>>())
            .field("poll_interval", &self.poll_interval)
            .finish_non_exhaustive()
    }
}

impl<R: RamAccess + Clone> FeedbackAdmin<R> {
    /// Opens the DAQ ring partition, creating it if the table lacks it.
    ///
    /// # Arguments
    ///
    /// * `mmu` - Partition table of the off-chip RAM.
    /// * `config` - Ring tag and capacity, poll and print intervals.
    pub fn new(mmu: Mmu<R>, config: &HostConfig) -> Result<Self, HostError> {
        let memory = &config.memory;
        let ring = SharedRing::create(&mmu, memory.daq_ring_tag, memory.daq_ring_capacity)?;
        info!(tag = memory.daq_ring_tag, admin = ring.admin_index(), "daq ring attached");
        Ok(Self {
            mmu,
            ring,
            subscribers: BTreeMap::new(),
            stats: FeedbackStats::new(config.stats_interval()),
            buffer: Vec::new(),
            poll_interval: config.poll_interval(),
        })
    }

    /// Partition table.
    pub const fn mmu(&self) -> &Mmu<R> {
        &self.mmu
    }

    /// DAQ ring.
    pub const fn ring(&self) -> &SharedRing<R> {
        &self.ring
    }

    /// Receive statistics.
    pub const fn stats(&self) -> &FeedbackStats {
        &self.stats
    }

    /// Clears the receive statistics.
    pub fn reset_stats(&mut self) {
        self.stats.reset();
    }

    /// Attaches `subscriber` to `id`.
    ///
    /// # Returns
    ///
    /// The subscriber it replaces, if any.
    pub fn subscribe(&mut self, id: ChannelId, subscriber: Box<dyn Subscriber>) -> Option<Box<dyn Subscriber>> {
        debug!(channel = %id, "subscribed");
        self.subscribers.insert(id, subscriber)
    }

    /// Detaches the subscriber of `id`.
    pub fn unsubscribe(&mut self, id: ChannelId) -> Option<Box<dyn Subscriber>> {
        self.subscribers.remove(&id)
    }

    /// Channels with a subscriber, in `(slot, channel)` order.
    pub fn subscribed(&self) -> impl Iterator<Item = ChannelId> + '_ {
        self.subscribers.keys().copied()
    }

    /// Drains the ring once.
    pub fn poll(&mut self) -> Result<PollReport, HostError> {
        let mut report = PollReport::default();
        let Some(indexes) = self.ring.poll()? else {
            self.stats.skipped_polls += 1;
            report.skipped = true;
            return Ok(report);
        };
        let size = indexes.size() as usize;
        if size == 0 {
            return Ok(report);
        }
        self.buffer.resize(size, 0);
        self.ring.read(&indexes, &mut self.buffer)?;

        let mut pos = 0;
        while pos < size {
            match DaqBlock::decode(&self.buffer[pos..size]) {
                Ok((block, used)) => {
                    pos += used;
                    report.blocks += 1;
                    self.dispatch(&block, &mut report);
                }
                Err(BlockError::Truncated { need, have }) => {
                    warn!(need, have, "partial block at the ring head, left for the next poll");
                    break;
                }
                Err(e) => {
                    // No way to find the next header; drop everything read.
                    warn!(error = %e, words = size - pos, "undecodable ring content dropped");
                    self.stats.invalid += 1;
                    pos = size;
                }
            }
        }
        report.words = pos as u32;
        if pos > 0 {
            self.ring.acknowledge(report.words)?;
        }
        trace!(?report, "ring polled");
        Ok(report)
    }

    fn dispatch(&mut self, block: &DaqBlock, report: &mut PollReport) {
        let d = &block.descriptor;
        let Some(id) = Slot::new(d.slot).and_then(|s| ChannelId::new(s, d.channel)) else {
            warn!(slot = d.slot, channel = d.channel, "block names no valid channel");
            self.stats.invalid += 1;
            return;
        };
        let crc_ok = block.crc_ok();
        if !crc_ok {
            warn!(channel = %id, sequence = d.sequence, "block crc mismatch");
            report.crc_errors += 1;
        }
        let subscriber = self.subscribers.get_mut(&id);
        let subscribed = subscriber.is_some();
        let gap = self.stats.record(id, d, crc_ok, subscribed);
        if gap > 0 {
            warn!(channel = %id, lost = gap, sequence = d.sequence, "sequence gap");
        }
        if let Some(subscriber) = subscriber {
            subscriber.on_block(d, &block.payload);
            report.delivered += 1;
        }
    }

    /// Polls at the configured interval until `stop` is set.
    ///
    /// Statistics are printed at their throttled interval.
    pub fn run(&mut self, stop: &AtomicBool) -> Result<(), HostError> {
        info!(interval = ?self.poll_interval, "feedback polling started");
        while !stop.load(Ordering::Relaxed) {
            let started = Instant::now();
            let _ = self.poll()?;
            let _ = self.stats.print_throttled(Instant::now());
            if let Some(rest) = self.poll_interval.checked_sub(started.elapsed()) {
                thread::sleep(rest);
            }
        }
        info!(received = self.stats.total_received(), lost = self.stats.total_lost(), "feedback polling stopped");
        Ok(())
    }
}
