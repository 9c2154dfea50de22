//! Firmware application.
//!
//! This module contains the real-time application that runs on the soft-core CPU.
//! It provides:
//! 1. **Hardware discovery:** Slave scan and the FG macro table.
//! 2. **FG path:** Slave capability, dispatcher and timing-event handler.
//! 3. **DAQ path:** Block assembler feeding the shared ring.
//! 4. **Host interface:** Command handler and history log.
//! 5. **Assembly:** The tasks, IRQ handlers and the [`Application`] tying them together.
//!
//! The state the tasks share lives in one [`FirmwareContext`] owned by the application
//! instance, so several simulated devices can run side by side in one process.

/// Application assembly and the tick loop.
pub mod application;

/// Host command queue handling.
pub mod command;

/// DAQ block assembler.
pub mod daq;

/// FG channel state machine and parameter pump.
pub mod dispatcher;

/// FG macro table.
pub mod fg_list;

/// FG slave capability.
pub mod fg_slave;

/// Bounded history of notable firmware actions.
pub mod history;

/// Backplane and extension-bus enumeration.
pub mod slaves;

/// Firmware tasks.
pub mod tasks;

/// Timing-event handler.
pub mod timing;

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use tracing::info;

use crate::access::SharedTransport;
use crate::common::{Slot, TransportError};
use crate::protocol::SharedMemory;
use crate::protocol::shared::offsets;
use crate::rtos::{AlarmQueue, EventCounter, Msi, SharedQueue, lock};
use crate::stats::FirmwareStats;

pub use application::Application;
pub use command::CommandHandler;
pub use daq::{DaqAssembler, DrainReport};
pub use dispatcher::{Binding, FgDispatcher};
pub use fg_list::MacroTable;
pub use fg_slave::FgSlave;
pub use history::{History, HistoryEntry, HistoryKind};
pub use slaves::SlaveInfo;
pub use timing::{EcaEvent, StartReport};

/// Base addresses of the optional hardware, as found in the bus directory.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Hardware {
    /// Backplane master window.
    pub bus: Option<u64>,
    /// Extension-bus controller.
    pub mil: Option<u64>,
    /// Timing receiver queue.
    pub eca: Option<u64>,
    /// Backplane slots to probe.
    pub slots: u8,
}

/// A backplane interrupt: the slot and its pending flags.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SlotIrq {
    /// Interrupting slot.
    pub slot: Slot,
    /// Slot pending flags.
    pub pending: u16,
}

/// What a scan of the hardware found.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RescanReport {
    /// Backplane cards.
    pub slaves: Vec<SlaveInfo>,
    /// FGs in the macro table.
    pub fgs: usize,
    /// Slots with DAQ channels.
    pub daq_slots: usize,
}

/// State shared by the tasks and IRQ handlers of one application.
pub struct FirmwareContext {
    /// Transport to the bus.
    pub transport: SharedTransport,
    /// LM32 shared memory.
    pub shared: SharedMemory<SharedTransport>,
    /// Optional hardware.
    pub hardware: Hardware,
    /// FG dispatcher.
    pub fg: Mutex<FgDispatcher>,
    /// DAQ assembler.
    pub daq: Mutex<DaqAssembler>,
    /// Backplane interrupts for the FG task.
    pub fg_irqs: Arc<SharedQueue<SlotIrq>>,
    /// Backplane interrupts for the DAQ task.
    pub daq_irqs: Arc<SharedQueue<SlotIrq>>,
    /// Timing events.
    pub events: Arc<SharedQueue<EcaEvent>>,
    /// Extension-bus interrupts.
    pub mil_irqs: Arc<SharedQueue<Msi>>,
    /// FG task wakeups signalled by interrupts and not yet consumed.
    pub fg_wakeups: Arc<EventCounter>,
    /// Overflowed queues.
    pub alarms: Arc<AlarmQueue>,
    /// Firmware counters.
    pub stats: Arc<FirmwareStats>,
    /// History log.
    pub history: Arc<History>,
    /// Extension-bus gap read interval in ticks; 0 is off.
    pub mil_gap_interval: AtomicU32,
}

impl fmt::Debug for FirmwareContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FirmwareContext")
            .field("hardware", &self.hardware)
            .field("shared", &self.shared)
            .field("mil_gap_interval", &self.mil_gap_interval())
            .finish_non_exhaustive()
    }
}

impl FirmwareContext {
    /// Current extension-bus gap read interval.
    pub fn mil_gap_interval(&self) -> u32 {
        self.mil_gap_interval.load(Ordering::Relaxed)
    }

    /// Sets the gap read interval and mirrors it into the shared memory.
    pub fn set_mil_gap_interval(&self, ticks: u32) -> Result<(), TransportError> {
        self.mil_gap_interval.store(ticks, Ordering::Relaxed);
        self.shared.write_u32(offsets::MIL_GAP_INTERVAL, ticks)
    }

    /// Empties every interrupt and event queue.
    pub fn reset_queues(&self) {
        self.fg_irqs.reset();
        self.daq_irqs.reset();
        self.events.reset();
        self.mil_irqs.reset();
        self.fg_wakeups.clear();
    }

    /// Re-enumerates the hardware and rebuilds the FG macro table.
    ///
    /// Every channel is disabled first. The caller keeps the FG and DAQ tasks from
    /// running until this returns.
    pub fn rescan(&self, max_macros: usize) -> Result<RescanReport, TransportError> {
        let slaves = match self.hardware.bus {
            Some(bus) => slaves::scan(&*self.transport, bus, self.hardware.slots)?,
            None => Vec::new(),
        };
        let fgs = {
            let mut fg = lock(&self.fg);
            fg.stop_all()?;
            fg.clear_table()?;
            let table = MacroTable::build(
                &*self.transport,
                &slaves,
                self.hardware.bus.unwrap_or_default(),
                self.hardware.mil,
                max_macros,
            )?;
            let fgs = table.len();
            fg.install(table)?;
            fgs
        };
        self.fg_irqs.reset();
        self.daq_irqs.reset();
        let daq_slots: Vec<Slot> = slaves.iter().filter(|s| s.has_daq()).map(|s| s.slot).collect();
        lock(&self.daq).set_slots(daq_slots.iter().copied())?;
        info!(cards = slaves.len(), fgs, daq_slots = daq_slots.len(), "hardware scanned");
        Ok(RescanReport {
            daq_slots: daq_slots.len(),
            slaves,
            fgs,
        })
    }
}
