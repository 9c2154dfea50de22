//! Per-channel receive statistics.
//!
//! Every block the feedback administration takes out of the ring is counted
//! against its `(slot, channel)`. Sequence numbers are 16-bit and count up by one
//! per block on each channel, so a jump reveals blocks the firmware dropped.

use std::collections::BTreeMap;
use std::fmt;
use std::time::{Duration, Instant};

use scu_core::common::ChannelId;
use scu_core::protocol::Descriptor;

/// Counters of one channel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ChannelStats {
    /// Blocks received.
    pub received: u64,
    /// Blocks missing from the sequence.
    pub lost: u64,
    /// Blocks whose payload CRC did not match.
    pub crc_errors: u64,
    /// Blocks nobody subscribed to.
    pub unsubscribed: u64,
    /// Sequence number of the last block.
    pub last_sequence: Option<u16>,
    /// Timestamp of the last block.
    pub last_timestamp: u64,
}

/// Statistics table sorted by `(slot, channel)`.
#[derive(Debug)]
pub struct FeedbackStats {
    channels: BTreeMap<ChannelId, ChannelStats>,
    /// Blocks that could not be decoded or named no valid channel.
    pub invalid: u64,
    /// Ring polls skipped because the firmware had not folded in the last acknowledge.
    pub skipped_polls: u64,
    print_interval: Option<Duration>,
    last_print: Instant,
}

impl FeedbackStats {
    /// Creates an empty table printed at most every `print_interval`.
    pub fn new(print_interval: Option<Duration>) -> Self {
        Self {
            channels: BTreeMap::new(),
            invalid: 0,
            skipped_polls: 0,
            print_interval,
            last_print: Instant::now(),
        }
    }

    /// Counts one block.
    ///
    /// # Returns
    ///
    /// The number of blocks missing between this block and the previous one.
    pub fn record(&mut self, id: ChannelId, descriptor: &Descriptor, crc_ok: bool, subscribed: bool) -> u64 {
        let entry = self.channels.entry(id).or_default();
        let gap = entry
            .last_sequence
            .map_or(0, |last| u64::from(descriptor.sequence.wrapping_sub(last).wrapping_sub(1)));
        entry.received += 1;
        entry.lost += gap;
        entry.crc_errors += u64::from(!crc_ok);
        entry.unsubscribed += u64::from(!subscribed);
        entry.last_sequence = Some(descriptor.sequence);
        entry.last_timestamp = descriptor.timestamp;
        gap
    }

    /// Counters of `id`.
    pub fn channel(&self, id: ChannelId) -> Option<&ChannelStats> {
        self.channels.get(&id)
    }

    /// All channels in `(slot, channel)` order.
    pub fn channels(&self) -> impl Iterator<Item = (&ChannelId, &ChannelStats)> {
        self.channels.iter()
    }

    /// Blocks received on all channels.
    pub fn total_received(&self) -> u64 {
        self.channels.values().map(|c| c.received).sum()
    }

    /// Blocks lost on all channels.
    pub fn total_lost(&self) -> u64 {
        self.channels.values().map(|c| c.lost).sum()
    }

    /// Clears every counter.
    pub fn reset(&mut self) {
        self.channels.clear();
        self.invalid = 0;
        self.skipped_polls = 0;
    }

    /// Prints the table if the print interval has elapsed since the last print.
    ///
    /// # Returns
    ///
    /// `true` if the table was printed.
    pub fn print_throttled(&mut self, now: Instant) -> bool {
        let Some(interval) = self.print_interval else {
            return false;
        };
        if now.duration_since(self.last_print) < interval {
            return false;
        }
        self.last_print = now;
        println!("{self}");
        true
    }
}

impl fmt::Display for FeedbackStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "==========================================================")?;
        writeln!(f, "DAQ FEEDBACK STATISTICS")?;
        writeln!(f, "==========================================================")?;
        writeln!(f, "{:<10} {:>10} {:>8} {:>8} {:>8} {:>8}", "channel", "received", "lost", "crc", "unsub", "seq")?;
        for (id, c) in &self.channels {
            let seq = c.last_sequence.map_or_else(|| "-".to_owned(), |s| s.to_string());
            writeln!(
                f,
                "{:<10} {:>10} {:>8} {:>8} {:>8} {:>8}",
                id.to_string(),
                c.received,
                c.lost,
                c.crc_errors,
                c.unsubscribed,
                seq
            )?;
        }
        writeln!(f, "----------------------------------------------------------")?;
        write!(
            f,
            "total received {}  lost {}  invalid {}  skipped polls {}",
            self.total_received(),
            self.total_lost(),
            self.invalid,
            self.skipped_polls
        )
    }
}
