//! Firmware statistics collection and reporting.
//!
//! This module tracks the counters of the firmware application. It provides:
//! 1. **DAQ path:** Blocks emitted, dropped for lack of ring space, discarded on an empty
//!    fifo and dropped on a descriptor mismatch.
//! 2. **FG path:** Parameter sets copied, ramps started and completed.
//! 3. **Interrupts and events:** IRQs taken per line, timing events matched and ignored.
//! 4. **Housekeeping:** Commands handled or rejected, queue overflow reports, gap reads.
//!
//! Counters are atomics so IRQ handlers and tasks update them without locking;
//! [`FirmwareStats::snapshot`] freezes a consistent-enough copy for reporting.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Live firmware counters.
#[derive(Debug)]
pub struct FirmwareStats {
    start_time: Instant,
    /// DAQ blocks written to the ring.
    pub daq_blocks: AtomicU64,
    /// DAQ blocks dropped because the ring was full.
    pub daq_drops: AtomicU64,
    /// Fifo-full interrupts with an empty fifo.
    pub daq_discards: AtomicU64,
    /// Blocks whose descriptor did not match the draining channel.
    pub daq_mismatches: AtomicU64,
    /// Blocks shorter than their mode requires.
    pub daq_incomplete: AtomicU64,
    /// Parameter sets handed to slave FGs.
    pub fg_params: AtomicU64,
    /// Ramps started by a timing event.
    pub fg_starts: AtomicU64,
    /// Ramps reported complete.
    pub fg_done: AtomicU64,
    /// Backplane IRQs taken.
    pub irq_backplane: AtomicU64,
    /// Timing IRQs taken.
    pub irq_timing: AtomicU64,
    /// Extension-bus IRQs taken.
    pub irq_mil: AtomicU64,
    /// Timing events that armed channels started on.
    pub events_matched: AtomicU64,
    /// Timing events no armed channel waited for.
    pub events_ignored: AtomicU64,
    /// Host commands executed.
    pub commands: AtomicU64,
    /// Host commands dropped as invalid.
    pub commands_rejected: AtomicU64,
    /// Overflow reports taken from the alarm queue.
    pub alarms: AtomicU64,
    /// Actual-value reads of idle extension-bus FGs.
    pub mil_gap_reads: AtomicU64,
}

impl Default for FirmwareStats {
    fn default() -> Self {
        Self {
            start_time: Instant::now(),
            daq_blocks: AtomicU64::new(0),
            daq_drops: AtomicU64::new(0),
            daq_discards: AtomicU64::new(0),
            daq_mismatches: AtomicU64::new(0),
            daq_incomplete: AtomicU64::new(0),
            fg_params: AtomicU64::new(0),
            fg_starts: AtomicU64::new(0),
            fg_done: AtomicU64::new(0),
            irq_backplane: AtomicU64::new(0),
            irq_timing: AtomicU64::new(0),
            irq_mil: AtomicU64::new(0),
            events_matched: AtomicU64::new(0),
            events_ignored: AtomicU64::new(0),
            commands: AtomicU64::new(0),
            commands_rejected: AtomicU64::new(0),
            alarms: AtomicU64::new(0),
            mil_gap_reads: AtomicU64::new(0),
        }
    }
}

/// Adds one to `counter`.
#[inline]
pub fn bump(counter: &AtomicU64) {
    let _ = counter.fetch_add(1, Ordering::Relaxed);
}

/// Frozen copy of [`FirmwareStats`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Milliseconds since the counters were created.
    pub uptime_ms: u64,
    /// See [`FirmwareStats::daq_blocks`].
    pub daq_blocks: u64,
    /// See [`FirmwareStats::daq_drops`].
    pub daq_drops: u64,
    /// See [`FirmwareStats::daq_discards`].
    pub daq_discards: u64,
    /// See [`FirmwareStats::daq_mismatches`].
    pub daq_mismatches: u64,
    /// See [`FirmwareStats::daq_incomplete`].
    pub daq_incomplete: u64,
    /// See [`FirmwareStats::fg_params`].
    pub fg_params: u64,
    /// See [`FirmwareStats::fg_starts`].
    pub fg_starts: u64,
    /// See [`FirmwareStats::fg_done`].
    pub fg_done: u64,
    /// See [`FirmwareStats::irq_backplane`].
    pub irq_backplane: u64,
    /// See [`FirmwareStats::irq_timing`].
    pub irq_timing: u64,
    /// See [`FirmwareStats::irq_mil`].
    pub irq_mil: u64,
    /// See [`FirmwareStats::events_matched`].
    pub events_matched: u64,
    /// See [`FirmwareStats::events_ignored`].
    pub events_ignored: u64,
    /// See [`FirmwareStats::commands`].
    pub commands: u64,
    /// See [`FirmwareStats::commands_rejected`].
    pub commands_rejected: u64,
    /// See [`FirmwareStats::alarms`].
    pub alarms: u64,
    /// See [`FirmwareStats::mil_gap_reads`].
    pub mil_gap_reads: u64,
}

/// Section names for selective stats output.
///
/// Valid section identifiers: `"summary"`, `"daq"`, `"fg"`, `"irq"`, `"host"`.
/// Pass an empty slice to `print_sections` to print all sections.
pub const STATS_SECTIONS: &[&str] = &["summary", "daq", "fg", "irq", "host"];

impl FirmwareStats {
    /// Copies all counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        let get = |c: &AtomicU64| c.load(Ordering::Relaxed);
        StatsSnapshot {
            uptime_ms: u64::try_from(self.start_time.elapsed().as_millis()).unwrap_or(u64::MAX),
            daq_blocks: get(&self.daq_blocks),
            daq_drops: get(&self.daq_drops),
            daq_discards: get(&self.daq_discards),
            daq_mismatches: get(&self.daq_mismatches),
            daq_incomplete: get(&self.daq_incomplete),
            fg_params: get(&self.fg_params),
            fg_starts: get(&self.fg_starts),
            fg_done: get(&self.fg_done),
            irq_backplane: get(&self.irq_backplane),
            irq_timing: get(&self.irq_timing),
            irq_mil: get(&self.irq_mil),
            events_matched: get(&self.events_matched),
            events_ignored: get(&self.events_ignored),
            commands: get(&self.commands),
            commands_rejected: get(&self.commands_rejected),
            alarms: get(&self.alarms),
            mil_gap_reads: get(&self.mil_gap_reads),
        }
    }

    /// Zeroes the DAQ counters; the others keep running.
    pub fn reset_daq(&self) {
        for c in [
            &self.daq_blocks,
            &self.daq_drops,
            &self.daq_discards,
            &self.daq_mismatches,
            &self.daq_incomplete,
        ] {
            c.store(0, Ordering::Relaxed);
        }
    }
}

impl StatsSnapshot {
    /// Prints only the requested statistics sections to stdout.
    ///
    /// # Arguments
    ///
    /// * `sections` - Slice of section names to print, or empty for all.
    pub fn print_sections(&self, sections: &[String]) {
        let want = |s: &str| sections.is_empty() || sections.iter().any(|x| x == s);
        let drop_rate = |lost: u64| {
            let total = self.daq_blocks + lost;
            if total == 0 { 0.0 } else { lost as f64 / total as f64 * 100.0 }
        };

        println!("\n==========================================================");
        println!("SCU FIRMWARE STATISTICS");
        println!("==========================================================");
        if want("summary") {
            println!("uptime                   {:.3} s", self.uptime_ms as f64 / 1000.0);
            println!("daq.blocks               {}", self.daq_blocks);
            println!("fg.ramps                 {}", self.fg_done);
            println!("----------------------------------------------------------");
        }
        if want("daq") {
            println!("DAQ");
            println!("  blocks                 {}", self.daq_blocks);
            println!("  drops                  {} ({:.2}%)", self.daq_drops, drop_rate(self.daq_drops));
            println!("  discards               {}", self.daq_discards);
            println!("  mismatches             {}", self.daq_mismatches);
            println!("  incomplete             {}", self.daq_incomplete);
            println!("----------------------------------------------------------");
        }
        if want("fg") {
            println!("FUNCTION GENERATORS");
            println!("  params                 {}", self.fg_params);
            println!("  starts                 {}", self.fg_starts);
            println!("  done                   {}", self.fg_done);
            println!("  mil.gap_reads          {}", self.mil_gap_reads);
            println!("----------------------------------------------------------");
        }
        if want("irq") {
            println!("INTERRUPTS");
            println!("  irq.backplane          {}", self.irq_backplane);
            println!("  irq.timing             {}", self.irq_timing);
            println!("  irq.mil                {}", self.irq_mil);
            println!("  events.matched         {}", self.events_matched);
            println!("  events.ignored         {}", self.events_ignored);
            println!("----------------------------------------------------------");
        }
        if want("host") {
            println!("HOST INTERFACE");
            println!("  commands               {}", self.commands);
            println!("  commands.rejected      {}", self.commands_rejected);
            println!("  alarms                 {}", self.alarms);
        }
        println!("==========================================================");
    }

    /// Prints all statistics sections to stdout.
    pub fn print(&self) {
        self.print_sections(&[]);
    }
}
