//! Host command handshake.
//!
//! Commands travel through a 16-slot queue in the shared memory. The host writes
//! the slot and advances the write counter in one cycle. The firmware raises
//! `BUSY`, executes, advances the read counter and clears `BUSY`. A command is done
//! once the read counter has passed it and `BUSY` is clear.

use std::thread;
use std::time::{Duration, Instant};

use scu_core::access::Transport;
use scu_core::common::TransportError;
use scu_core::protocol::shared::CMD_QUEUE_SLOTS;
use scu_core::protocol::{DaqArg, Opcode, RawCommand, SharedMemory};
use tracing::debug;

use crate::config::HostConfig;
use crate::error::HostError;

/// Queue position of a posted command.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Ticket(u32);

impl Ticket {
    /// Queue counter the command was posted at.
    pub const fn counter(self) -> u32 {
        self.0
    }
}

/// Posts commands and waits for the firmware to finish them.
#[derive(Debug)]
pub struct CommandClient<T> {
    shared: SharedMemory<T>,
    timeout: Duration,
    poll: Duration,
}

impl<T: Transport> CommandClient<T> {
    /// Creates a client over `shared` with the timeouts of `config`.
    pub const fn new(shared: SharedMemory<T>, config: &HostConfig) -> Self {
        Self {
            shared,
            timeout: config.timeout(),
            poll: config.command_poll(),
        }
    }

    /// Shared memory the client posts into.
    pub const fn shared(&self) -> &SharedMemory<T> {
        &self.shared
    }

    /// Posts a command without waiting.
    ///
    /// # Returns
    ///
    /// A ticket for [`CommandClient::is_done`], or `QueueFull` if the firmware has
    /// not caught up with the previous commands.
    pub fn post(&self, opcode: Opcode, arg: u32) -> Result<Ticket, HostError> {
        let (write, read) = self.shared.command_counters()?;
        if write.wrapping_sub(read) >= CMD_QUEUE_SLOTS {
            return Err(HostError::QueueFull);
        }
        self.shared.post_command(write, RawCommand::new(opcode, arg))?;
        debug!(%opcode, arg, counter = write, "command posted");
        Ok(Ticket(write))
    }

    /// Returns `true` once the firmware has finished the command of `ticket`.
    pub fn is_done(&self, ticket: Ticket) -> Result<bool, TransportError> {
        let (_, read) = self.shared.command_counters()?;
        let passed = read.wrapping_sub(ticket.0) as i32 > 0;
        Ok(passed && !self.shared.busy()?)
    }

    /// Blocks until the command of `ticket` is done or the timeout expires.
    pub fn wait(&self, ticket: Ticket) -> Result<(), HostError> {
        let deadline = Instant::now() + self.timeout;
        while !self.is_done(ticket)? {
            if Instant::now() >= deadline {
                return Err(HostError::Timeout("command completion"));
            }
            thread::sleep(self.poll);
        }
        Ok(())
    }

    /// Posts a command and waits for it.
    pub fn execute(&self, opcode: Opcode, arg: u32) -> Result<(), HostError> {
        let ticket = self.post(opcode, arg)?;
        self.wait(ticket)
    }

    /// Posts a DAQ configuration command and waits for it.
    pub fn configure_daq(&self, opcode: Opcode, arg: DaqArg) -> Result<(), HostError> {
        if !opcode.is_daq() {
            return Err(HostError::InvalidArgument(format!("{opcode} is not a daq command")));
        }
        self.execute(opcode, arg.encode())
    }

    /// Asks the firmware to re-enumerate its hardware.
    pub fn rescan(&self) -> Result<(), HostError> {
        self.execute(Opcode::Rescan, 0)
    }

    /// Asks the firmware to reset its queues and counters.
    pub fn clear_handler_state(&self) -> Result<(), HostError> {
        self.execute(Opcode::ClearHandlerState, 0)
    }

    /// Sets the extension-bus gap read interval in ticks; 0 turns it off.
    pub fn set_mil_gap_interval(&self, ticks: u32) -> Result<(), HostError> {
        self.execute(Opcode::MilGapInterval, ticks)
    }

    /// Asks the firmware to log its history.
    pub fn print_history(&self) -> Result<(), HostError> {
        self.execute(Opcode::PrintHistory, 0)
    }
}
