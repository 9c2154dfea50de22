//! FG channel API.
//!
//! The host drives an FG through a channel register in the shared memory:
//! 1. **Bind:** Point the channel at a macro table entry and pick the start event.
//! 2. **Load:** Append polynomial parameter sets to the channel's buffer. The host
//!    owns `write_index`; the firmware owns `read_index` and copies sets to the
//!    hardware while the ramp runs.
//! 3. **Arm:** `ENABLE_CHANNEL` arms the FG; the next matching timing event starts it.

use scu_core::access::Transport;
use scu_core::config::FgConfig;
use scu_core::protocol::{ChannelField, ChannelReg, FgMacro, FgState, Opcode, PolynomialParams, SharedMemory};
use tracing::debug;

use crate::command::CommandClient;
use crate::error::HostError;

/// Host view of the FG channels of one device.
#[derive(Debug)]
pub struct FgClient<'a, T> {
    commands: &'a CommandClient<T>,
    channels: usize,
    buffer_size: u32,
}

impl<'a, T: Transport> FgClient<'a, T> {
    /// Creates the client; channel commands go through `commands`.
    pub const fn new(commands: &'a CommandClient<T>, config: &FgConfig) -> Self {
        Self {
            commands,
            channels: config.channels,
            buffer_size: config.buffer_size,
        }
    }

    fn shared(&self) -> &SharedMemory<T> {
        self.commands.shared()
    }

    fn check(&self, channel: usize) -> Result<(), HostError> {
        if channel < self.channels {
            Ok(())
        } else {
            Err(HostError::InvalidArgument(format!(
                "channel {channel} out of range (0..{})",
                self.channels
            )))
        }
    }

    /// FGs the firmware found at its last scan.
    pub fn macros(&self) -> Result<Vec<FgMacro>, HostError> {
        Ok(self.shared().read_macros()?)
    }

    /// Reads the register of `channel`.
    pub fn channel(&self, channel: usize) -> Result<ChannelReg, HostError> {
        self.check(channel)?;
        Ok(self.shared().read_channel(channel)?)
    }

    /// Reads the state of `channel`.
    pub fn state(&self, channel: usize) -> Result<FgState, HostError> {
        Ok(self.channel(channel)?.state)
    }

    /// Binds `channel` to macro table entry `macro_index`, starting on `tag`.
    ///
    /// A `tag` of 0 selects the firmware's default start event. The channel must
    /// be idle.
    pub fn bind(&self, channel: usize, macro_index: usize, tag: u32) -> Result<(), HostError> {
        let reg = self.channel(channel)?;
        if !matches!(reg.state, FgState::Idle | FgState::Stopped) {
            return Err(HostError::InvalidArgument(format!("channel {channel} is {}", reg.state)));
        }
        let fgs = self.macros()?.len();
        if macro_index >= fgs {
            return Err(HostError::InvalidArgument(format!(
                "macro {macro_index} out of range (0..{fgs})"
            )));
        }
        let shared = self.shared();
        shared.write_channel_field(channel, ChannelField::MacroIndex, macro_index as u32)?;
        shared.write_channel_field(channel, ChannelField::Tag, tag)?;
        debug!(channel, macro_index, tag, "channel bound");
        Ok(())
    }

    /// Free parameter slots of `channel`; one slot always stays empty.
    pub fn free(&self, channel: usize) -> Result<u32, HostError> {
        let reg = self.channel(channel)?;
        Ok(self.buffer_size.saturating_sub(1) - reg.pending(self.buffer_size))
    }

    /// Appends as many of `params` as fit into the channel buffer.
    ///
    /// # Returns
    ///
    /// The number of parameter sets queued.
    pub fn push(&self, channel: usize, params: &[PolynomialParams]) -> Result<usize, HostError> {
        let reg = self.channel(channel)?;
        let free = self.buffer_size.saturating_sub(1) - reg.pending(self.buffer_size);
        let count = params.len().min(free as usize);
        let shared = self.shared();
        let mut index = reg.write_index % self.buffer_size.max(1);
        for p in &params[..count] {
            shared.write_poly(channel, index, p)?;
            index = (index + 1) % self.buffer_size;
        }
        if count > 0 {
            shared.write_channel_field(channel, ChannelField::WriteIndex, index)?;
        }
        debug!(channel, queued = count, offered = params.len(), "parameters pushed");
        Ok(count)
    }

    /// Arms `channel`.
    pub fn enable(&self, channel: usize) -> Result<(), HostError> {
        self.channel_command(Opcode::EnableChannel, channel)
    }

    /// Stops `channel`.
    pub fn disable(&self, channel: usize) -> Result<(), HostError> {
        self.channel_command(Opcode::DisableChannel, channel)
    }

    /// Stops `channel` and empties its buffer.
    pub fn reset(&self, channel: usize) -> Result<(), HostError> {
        self.channel_command(Opcode::ResetChannel, channel)
    }

    fn channel_command(&self, opcode: Opcode, channel: usize) -> Result<(), HostError> {
        self.check(channel)?;
        self.commands.execute(opcode, channel as u32)
    }
}
