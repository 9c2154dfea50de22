//! FG dispatcher.
//!
//! This module keeps every active FG fed with parameter sets from the host buffers.
//! It performs:
//! 1. **State machine:** `IDLE → ARMED` on enable with queued sets, `ARMED → ACTIVE` on
//!    the start event, `ACTIVE → STOPPED` when the slave reports done, any `→ IDLE`
//!    on disable.
//! 2. **Refill:** On a fifo-low notification (or a poll for extension-bus FGs) copies
//!    sets from the host buffer while the slave fifo has room and the buffer is not empty.
//! 3. **Publication:** Writes `read_index`, `ramp_count`, `state` and `sequence` back
//!    to the channel register; the host owns every other field.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, trace, warn};

use super::fg_list::MacroTable;
use super::fg_slave::{self, FgSlave};
use super::history::{History, HistoryKind};
use crate::access::{SharedTransport, TransportExt};
use crate::common::constants::{MAX_FG_PER_SOCKET, PEND_FG_MASK, PEND_FG0_DONE, PEND_FG0_FIFO_LOW};
use crate::common::{Slot, Socket, TransportError};
use crate::config::FgConfig;
use crate::protocol::shared::CHANNEL_COUNT;
use crate::protocol::slave::{self, fg};
use crate::protocol::{ChannelField, ChannelReg, FgState, SharedMemory};
use crate::stats::{FirmwareStats, bump};

/// Binding of a channel established by enable.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Binding {
    /// Macro table index.
    pub macro_index: usize,
    /// Socket of the bound FG.
    pub socket: Socket,
    /// Event tag the channel starts on.
    pub tag: u32,
}

#[derive(Clone, Copy, Debug, Default)]
struct ChannelSlot {
    state: FgState,
    binding: Option<Binding>,
}

/// Channel state machine and parameter pump.
pub struct FgDispatcher {
    shared: SharedMemory<SharedTransport>,
    bus_base: u64,
    mil_base: Option<u64>,
    config: FgConfig,
    table: MacroTable,
    slaves: Vec<Option<Box<dyn FgSlave>>>,
    channels: Vec<ChannelSlot>,
    stats: Arc<FirmwareStats>,
    history: Arc<History>,
}

impl fmt::Debug for FgDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FgDispatcher")
            .field("macros", &self.table.len())
            .field("channels", &self.channels.len())
            .finish_non_exhaustive()
    }
}

impl FgDispatcher {
    /// Creates a dispatcher with an empty macro table.
    ///
    /// # Arguments
    ///
    /// * `shared` - Accessor of the LM32 shared memory.
    /// * `bus_base` - Backplane window base.
    /// * `mil_base` - Extension-bus controller base, if present.
    /// * `config` - FG settings (channel count, buffer size, default tag).
    /// * `stats` - Firmware counters.
    /// * `history` - History ring.
    pub fn new(
        shared: SharedMemory<SharedTransport>,
        bus_base: u64,
        mil_base: Option<u64>,
        config: &FgConfig,
        stats: Arc<FirmwareStats>,
        history: Arc<History>,
    ) -> Self {
        let channels = config.channels.min(CHANNEL_COUNT);
        Self {
            shared,
            bus_base,
            mil_base,
            config: config.clone(),
            table: MacroTable::new(config.max_macros),
            slaves: Vec::new(),
            channels: vec![ChannelSlot::default(); channels],
            stats,
            history,
        }
    }

    /// Transport the dispatcher drives the slaves with.
    pub fn transport(&self) -> &SharedTransport {
        self.shared.transport()
    }

    /// Backplane window base.
    pub const fn bus_base(&self) -> u64 {
        self.bus_base
    }

    /// Extension-bus controller base.
    pub const fn mil_base(&self) -> Option<u64> {
        self.mil_base
    }

    /// The macro table in use.
    pub const fn table(&self) -> &MacroTable {
        &self.table
    }

    /// Number of channel registers.
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Cached state of `channel`.
    pub fn state(&self, channel: usize) -> Option<FgState> {
        self.channels.get(channel).map(|c| c.state)
    }

    /// Binding of `channel`, if enabled.
    pub fn binding(&self, channel: usize) -> Option<Binding> {
        self.channels.get(channel)?.binding
    }

    /// Event tag used for channels whose register carries tag 0.
    pub const fn default_tag(&self) -> u32 {
        self.config.event_tag
    }

    /// Firmware counters.
    pub fn stats(&self) -> &FirmwareStats {
        &self.stats
    }

    /// Appends `kind` to the history.
    pub fn record(&self, kind: HistoryKind) {
        self.history.record(kind);
    }

    /// Writes default registers for all channels.
    pub fn reset_registers(&mut self) -> Result<(), TransportError> {
        for channel in 0..self.channels.len() {
            self.shared.write_channel(channel, &ChannelReg::default())?;
            self.channels[channel] = ChannelSlot::default();
        }
        Ok(())
    }

    /// Replaces the macro table, creates the slave drivers and publishes the table.
    pub fn install(&mut self, table: MacroTable) -> Result<(), TransportError> {
        let transport = SharedTransport::clone(self.shared.transport());
        self.slaves = table
            .entries()
            .iter()
            .map(|entry| fg_slave::for_macro(&transport, entry, self.bus_base, self.mil_base))
            .collect();
        self.shared.write_macros(table.entries())?;
        info!(fgs = table.len(), "macro table installed");
        self.table = table;
        Ok(())
    }

    /// Empties the macro table and drops the slave drivers.
    pub fn clear_table(&mut self) -> Result<(), TransportError> {
        self.slaves.clear();
        self.table.clear();
        self.shared.clear_macros()
    }

    fn slave(&self, macro_index: usize) -> Option<&dyn FgSlave> {
        self.slaves.get(macro_index)?.as_deref()
    }

    fn set_state(&mut self, channel: usize, to: FgState) -> Result<(), TransportError> {
        let from = self.channels[channel].state;
        if from == to {
            return Ok(());
        }
        self.shared.write_channel_field(channel, ChannelField::State, to as u32)?;
        self.channels[channel].state = to;
        debug!(channel, %from, %to, "channel state");
        self.history.record(HistoryKind::State { channel, from, to });
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════
    // Host commands
    // ═══════════════════════════════════════════════════════════════════

    /// Arms `channel` if its buffer holds at least one parameter set.
    ///
    /// A `STOPPED` channel is disabled first, so it passes through `IDLE`.
    ///
    /// # Returns
    ///
    /// The state after the call. A channel bound to no known FG or with an empty
    /// buffer is not armed.
    pub fn enable(&mut self, channel: usize) -> Result<FgState, TransportError> {
        let state = self.channels[channel].state;
        match state {
            FgState::Armed | FgState::Active => {
                warn!(channel, %state, "channel already enabled");
                return Ok(state);
            }
            FgState::Stopped => self.disable(channel)?,
            FgState::Idle => {}
        }
        let state = FgState::Idle;
        let reg = self.shared.read_channel(channel)?;
        let Some((macro_index, socket)) = usize::try_from(reg.macro_index)
            .ok()
            .and_then(|i| self.slave(i).map(|s| (i, s.socket())))
        else {
            warn!(channel, macro_index = reg.macro_index, "channel not bound to a known fg");
            return Ok(state);
        };
        if reg.pending(self.config.buffer_size) == 0 {
            info!(channel, "no parameter sets queued, channel not armed");
            return Ok(state);
        }
        let tag = if reg.tag == 0 { self.config.event_tag } else { reg.tag };
        if let Some(slave) = self.slave(macro_index) {
            slave.enable(tag)?;
        }
        self.channels[channel].binding = Some(Binding {
            macro_index,
            socket,
            tag,
        });
        self.set_state(channel, FgState::Armed)?;
        Ok(FgState::Armed)
    }

    /// Stops `channel`, resets its FG and returns it to `IDLE`.
    pub fn disable(&mut self, channel: usize) -> Result<(), TransportError> {
        let macro_index = match self.channels[channel].binding.take() {
            Some(b) => Some(b.macro_index),
            None => usize::try_from(self.shared.read_channel_field(channel, ChannelField::MacroIndex)? as i32).ok(),
        };
        if let Some(slave) = macro_index.and_then(|i| self.slave(i)) {
            slave.disable()?;
            slave.reset()?;
        }
        self.set_state(channel, FgState::Idle)
    }

    /// Disables `channel` and zeroes its register, keeping the binding and the tag.
    pub fn reset_channel(&mut self, channel: usize) -> Result<(), TransportError> {
        self.disable(channel)?;
        let reg = self.shared.read_channel(channel)?;
        self.shared.write_channel(
            channel,
            &ChannelReg {
                macro_index: reg.macro_index,
                tag: reg.tag,
                ..ChannelReg::default()
            },
        )
    }

    /// Disables every channel that is not idle.
    pub fn stop_all(&mut self) -> Result<(), TransportError> {
        for channel in 0..self.channels.len() {
            if self.channels[channel].state != FgState::Idle || self.channels[channel].binding.is_some() {
                self.disable(channel)?;
            }
        }
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════
    // Start events
    // ═══════════════════════════════════════════════════════════════════

    /// Armed channels waiting for `tag`, with their sockets.
    pub fn armed_for(&self, tag: u32) -> Vec<(usize, Socket)> {
        self.channels
            .iter()
            .enumerate()
            .filter(|(_, c)| c.state == FgState::Armed)
            .filter_map(|(n, c)| c.binding.filter(|b| b.tag == tag).map(|b| (n, b.socket)))
            .collect()
    }

    /// Moves the started channels to `ACTIVE`.
    pub fn mark_started(&mut self, channels: &[usize]) -> Result<(), TransportError> {
        for &channel in channels {
            self.set_state(channel, FgState::Active)?;
            bump(&self.stats.fg_starts);
        }
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════
    // Slave notifications
    // ═══════════════════════════════════════════════════════════════════

    fn bound_channels(&self, macro_index: usize) -> Vec<usize> {
        self.channels
            .iter()
            .enumerate()
            .filter(|(_, c)| c.binding.is_some_and(|b| b.macro_index == macro_index))
            .map(|(n, _)| n)
            .collect()
    }

    /// Handles the FG bits of a backplane interrupt from `slot`.
    pub fn handle_slave_irq(&mut self, slot: Slot, pending: u16) -> Result<(), TransportError> {
        let socket = Socket::backplane(slot);
        for device in 0..MAX_FG_PER_SOCKET {
            let shift = 2 * u16::from(device);
            let bits = pending >> shift;
            if bits & (PEND_FG0_FIFO_LOW | PEND_FG0_DONE) == 0 {
                continue;
            }
            let Some(index) = self.table.find(socket, device) else {
                debug!(%slot, device, "notification from unknown fg");
                continue;
            };
            if bits & PEND_FG0_FIFO_LOW != 0 {
                self.on_fifo_low(index)?;
            }
            if bits & PEND_FG0_DONE != 0 {
                self.on_done(index)?;
            }
        }
        let handled = pending & PEND_FG_MASK;
        self.transport()
            .write_u16(slot.base_address(self.bus_base) + slave::INT_PENDING, handled)
    }

    /// Refills every active channel bound to FG `macro_index`.
    pub fn on_fifo_low(&mut self, macro_index: usize) -> Result<(), TransportError> {
        for channel in self.bound_channels(macro_index) {
            if self.channels[channel].state == FgState::Active {
                let _ = self.refill(channel, macro_index)?;
            }
        }
        Ok(())
    }

    /// Stops every active channel bound to FG `macro_index` and bumps its sequence.
    pub fn on_done(&mut self, macro_index: usize) -> Result<(), TransportError> {
        for channel in self.bound_channels(macro_index) {
            if self.channels[channel].state != FgState::Active {
                continue;
            }
            let sequence = self.shared.read_channel_field(channel, ChannelField::Sequence)?;
            self.shared
                .write_channel_field(channel, ChannelField::Sequence, sequence.wrapping_add(1))?;
            self.set_state(channel, FgState::Stopped)?;
            bump(&self.stats.fg_done);
            info!(channel, sequence = sequence.wrapping_add(1), "ramp done");
        }
        Ok(())
    }

    /// Copies parameter sets of `channel` into its FG until the fifo is full or the
    /// buffer is empty.
    ///
    /// # Returns
    ///
    /// The number of sets copied.
    fn refill(&mut self, channel: usize, macro_index: usize) -> Result<u32, TransportError> {
        let Some(slave) = self.slave(macro_index) else {
            return Ok(0);
        };
        let buffer_size = self.config.buffer_size;
        let mut reg = self.shared.read_channel(channel)?;
        let mut level = slave.fifo_level()?;
        let mut copied = 0;
        while level < fg::FIFO_DEPTH && reg.pending(buffer_size) > 0 {
            let params = self.shared.read_poly(channel, reg.read_index)?;
            slave.write_param(&params)?;
            reg.read_index = (reg.read_index + 1) % buffer_size;
            reg.ramp_count = reg.ramp_count.wrapping_add(1);
            level += 1;
            copied += 1;
        }
        if copied > 0 {
            self.shared.write_channel_field(channel, ChannelField::ReadIndex, reg.read_index)?;
            self.shared.write_channel_field(channel, ChannelField::RampCount, reg.ramp_count)?;
            for _ in 0..copied {
                bump(&self.stats.fg_params);
            }
            trace!(channel, copied, level, "fg refilled");
        }
        Ok(copied)
    }

    // ═══════════════════════════════════════════════════════════════════
    // Extension-bus polling
    // ═══════════════════════════════════════════════════════════════════

    /// Polls the active extension-bus channels: refills low fifos and detects the end
    /// of a ramp.
    pub fn poll_mil(&mut self) -> Result<(), TransportError> {
        for channel in 0..self.channels.len() {
            let slot = self.channels[channel];
            let Some(binding) = slot.binding.filter(|b| b.socket.is_mil()) else {
                continue;
            };
            if slot.state != FgState::Active {
                continue;
            }
            let Some(slave) = self.slave(binding.macro_index) else {
                continue;
            };
            if slave.fifo_level()? <= 1 {
                let _ = self.refill(channel, binding.macro_index)?;
            }
            let Some(slave) = self.slave(binding.macro_index) else {
                continue;
            };
            if !slave.is_running()? && slave.fifo_level()? == 0 {
                self.on_done(binding.macro_index)?;
            }
        }
        Ok(())
    }

    /// Reads the output of every extension-bus FG no active channel drives.
    ///
    /// # Returns
    ///
    /// The number of FGs read.
    pub fn read_mil_gaps(&mut self) -> Result<usize, TransportError> {
        let active: Vec<usize> = self
            .channels
            .iter()
            .filter(|c| c.state == FgState::Active)
            .filter_map(|c| c.binding.map(|b| b.macro_index))
            .collect();
        let mut reads = 0;
        for (index, entry) in self.table.entries().iter().enumerate() {
            if !entry.socket.is_mil() || active.contains(&index) {
                continue;
            }
            if let Some(slave) = self.slave(index) {
                let value = slave.actual()?;
                trace!(fg = %entry, value, "gap read");
                bump(&self.stats.mil_gap_reads);
                reads += 1;
            }
        }
        Ok(reads)
    }
}
