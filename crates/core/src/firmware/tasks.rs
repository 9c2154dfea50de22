//! Firmware tasks.
//!
//! Three tasks share the CPU:
//! 1. **DAQ** (realtime): Blocks on the DAQ interrupt queue and drains the cards.
//! 2. **FG** (high): Woken by timing events and FG interrupts, runs the dispatcher and
//!    polls the extension-bus FGs every tick.
//! 3. **Command** (low): Executes host commands, reports queue overflows and
//!    publishes the counters.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use tracing::{trace, warn};

use super::FirmwareContext;
use super::command::CommandHandler;
use super::timing;
use crate::common::Exception;
use crate::protocol::Counter;
use crate::rtos::{Suspend, Task, TaskContext, Waitable, lock};
use crate::stats::bump;

/// Name of the DAQ task.
pub const DAQ_TASK: &str = "daq";
/// Name of the FG task.
pub const FG_TASK: &str = "fg";
/// Name of the command task.
pub const COMMAND_TASK: &str = "command";

/// Drains DAQ interrupts.
#[derive(Debug)]
pub struct DaqTask {
    cx: Arc<FirmwareContext>,
}

impl DaqTask {
    /// Creates the task over `cx`.
    pub const fn new(cx: Arc<FirmwareContext>) -> Self {
        Self { cx }
    }
}

impl Task for DaqTask {
    fn name(&self) -> &str {
        DAQ_TASK
    }

    fn run(&mut self, _cx: &mut TaskContext<'_>) -> Result<Suspend, Exception> {
        while let Some(irq) = self.cx.daq_irqs.pop() {
            let report = lock(&self.cx.daq).handle_irq(irq.slot, irq.pending)?;
            trace!(slot = %irq.slot, ?report, "daq drained");
        }
        let source: Arc<dyn Waitable> = self.cx.daq_irqs.clone();
        Ok(Suspend::WaitFor { source, timeout: None })
    }
}

/// Runs the FG dispatcher.
#[derive(Debug)]
pub struct FgTask {
    cx: Arc<FirmwareContext>,
    last_gap_read: u64,
}

impl FgTask {
    /// Creates the task over `cx`.
    pub const fn new(cx: Arc<FirmwareContext>) -> Self {
        Self { cx, last_gap_read: 0 }
    }
}

impl Task for FgTask {
    fn name(&self) -> &str {
        FG_TASK
    }

    fn run(&mut self, tcx: &mut TaskContext<'_>) -> Result<Suspend, Exception> {
        let cx = &self.cx;
        let mut fg = lock(&cx.fg);
        let mut wakeups = 0u64;
        while cx.fg_wakeups.pop() {
            wakeups += 1;
        }
        if wakeups > 1 {
            trace!(wakeups, "coalesced fg wakeups");
        }
        while let Some(event) = cx.events.pop() {
            let _ = timing::handle_event(&mut fg, &event)?;
        }
        while let Some(irq) = cx.fg_irqs.pop() {
            fg.handle_slave_irq(irq.slot, irq.pending)?;
        }
        while let Some(msi) = cx.mil_irqs.pop() {
            trace!(socket = msi.addr, flags = msi.msg, "extension-bus irq");
        }
        fg.poll_mil()?;

        let interval = u64::from(cx.mil_gap_interval());
        if interval > 0 && tcx.tick >= self.last_gap_read + interval {
            self.last_gap_read = tcx.tick;
            let _ = fg.read_mil_gaps()?;
        }
        Ok(Suspend::WaitNotify { timeout: Some(1) })
    }
}

/// Executes host commands and housekeeping.
#[derive(Debug)]
pub struct CommandTask {
    handler: CommandHandler,
    period: u32,
}

impl CommandTask {
    /// Creates the task; it polls the command queue every `period` ticks.
    pub const fn new(handler: CommandHandler, period: u32) -> Self {
        Self { handler, period }
    }
}

impl Task for CommandTask {
    fn name(&self) -> &str {
        COMMAND_TASK
    }

    fn run(&mut self, _cx: &mut TaskContext<'_>) -> Result<Suspend, Exception> {
        let _ = self.handler.poll()?;
        let fw = self.handler.context();
        for report in fw.alarms.poll(true) {
            bump(&fw.stats.alarms);
            warn!(queue = %report.name, level = report.level, "queue overflowed, reset");
        }
        let gap_reads = fw.stats.mil_gap_reads.load(Ordering::Relaxed);
        fw.shared.set_counter(Counter::MilGapReads, gap_reads as u32)?;
        lock(&fw.daq).publish()?;
        Ok(Suspend::Sleep(self.period))
    }
}
