//! Host command handling.
//!
//! The host posts `(opcode, arg)` pairs into a small queue in the shared memory and
//! advances the write counter. The handler executes them in order. While it does, it
//! holds the `BUSY` word at 1. It advances the read counter and clears `BUSY` after
//! every command, including rejected ones, so the host can always tell when a
//! command is done.

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::FirmwareContext;
use super::history::HistoryKind;
use crate::common::TransportError;
use crate::protocol::{DaqArg, Opcode, RawCommand};
use crate::rtos::{TaskHandle, lock};
use crate::stats::bump;

/// Result of one command.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Executed.
    Done(Opcode),
    /// Dropped: unknown opcode, argument out of range or no such hardware.
    Rejected,
}

/// Executes commands from the shared-memory queue.
#[derive(Debug)]
pub struct CommandHandler {
    cx: Arc<FirmwareContext>,
    max_macros: usize,
    fg_task: Option<TaskHandle>,
    daq_task: Option<TaskHandle>,
}

impl CommandHandler {
    /// Creates a handler over `cx`.
    ///
    /// # Arguments
    ///
    /// * `cx` - Shared firmware state.
    /// * `max_macros` - Macro table capacity used by rescans.
    pub const fn new(cx: Arc<FirmwareContext>, max_macros: usize) -> Self {
        Self {
            cx,
            max_macros,
            fg_task: None,
            daq_task: None,
        }
    }

    /// Shared firmware state.
    pub fn context(&self) -> &Arc<FirmwareContext> {
        &self.cx
    }

    /// Sets the tasks a rescan stops and restarts.
    pub fn set_tasks(&mut self, fg_task: TaskHandle, daq_task: TaskHandle) {
        self.fg_task = Some(fg_task);
        self.daq_task = Some(daq_task);
    }

    /// Executes every queued command.
    ///
    /// # Returns
    ///
    /// The outcome of each command in queue order.
    pub fn poll(&self) -> Result<Vec<Outcome>, TransportError> {
        let shared = &self.cx.shared;
        let (write, mut read) = shared.command_counters()?;
        let mut outcomes = Vec::new();
        while read != write {
            shared.set_busy(true)?;
            let result = shared.read_command(read).and_then(|raw| self.execute(raw));
            read = read.wrapping_add(1);
            let acked = shared.set_command_read(read).and_then(|()| shared.set_busy(false));
            outcomes.push(result?);
            acked?;
        }
        Ok(outcomes)
    }

    /// Executes one command.
    pub fn execute(&self, raw: RawCommand) -> Result<Outcome, TransportError> {
        let Ok(opcode) = Opcode::try_from(raw.opcode) else {
            return Ok(self.reject(format_args!("unknown opcode {:#x}", raw.opcode)));
        };
        debug!(%opcode, arg = raw.arg, "command");
        let cx = Arc::clone(&self.cx);

        if opcode.takes_channel() {
            let channel = raw.arg as usize;
            let mut fg = lock(&cx.fg);
            if channel >= fg.channel_count() {
                return Ok(self.reject(format_args!("{opcode}: channel {channel} out of range")));
            }
            match opcode {
                Opcode::ResetChannel => fg.reset_channel(channel)?,
                Opcode::EnableChannel => {
                    let state = fg.enable(channel)?;
                    debug!(channel, %state, "enable");
                }
                _ => fg.disable(channel)?,
            }
        } else if opcode.is_daq() {
            let Some(arg) = DaqArg::decode(raw.arg) else {
                return Ok(self.reject(format_args!("{opcode}: bad daq argument {:#x}", raw.arg)));
            };
            if !lock(&cx.daq).configure(opcode, arg)? {
                return Ok(self.reject(format_args!("{opcode}: rejected for {}", arg.channel)));
            }
        } else {
            match opcode {
                Opcode::ClearHandlerState => self.clear_handler_state()?,
                Opcode::Rescan => self.rescan()?,
                Opcode::MilGapInterval => cx.set_mil_gap_interval(raw.arg)?,
                Opcode::PrintHistory => cx.history.dump(),
                _ => {}
            }
        }
        bump(&cx.stats.commands);
        cx.history.record(HistoryKind::Command { opcode, arg: raw.arg });
        Ok(Outcome::Done(opcode))
    }

    fn reject(&self, reason: std::fmt::Arguments<'_>) -> Outcome {
        warn!("command dropped: {reason}");
        bump(&self.cx.stats.commands_rejected);
        self.cx.history.record(HistoryKind::Error(format!("command dropped: {reason}")));
        Outcome::Rejected
    }

    fn clear_handler_state(&self) -> Result<(), TransportError> {
        self.cx.reset_queues();
        let _ = self.cx.alarms.poll(true);
        self.cx.stats.reset_daq();
        lock(&self.cx.daq).publish()?;
        self.cx.history.clear();
        info!("handler state cleared");
        Ok(())
    }

    fn rescan(&self) -> Result<(), TransportError> {
        let tasks = [&self.fg_task, &self.daq_task];
        tasks.iter().copied().flatten().for_each(TaskHandle::suspend);
        let report = self.cx.rescan(self.max_macros)?;
        if let Some(task) = &self.fg_task
            && (report.fgs > 0 || self.cx.hardware.eca.is_some())
        {
            task.resume();
        }
        if let Some(task) = &self.daq_task
            && report.daq_slots > 0
        {
            task.resume();
        }
        Ok(())
    }
}
