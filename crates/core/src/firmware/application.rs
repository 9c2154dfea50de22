//! Application assembly and the tick loop.
//!
//! This module brings the firmware up the way the reset vector does on the device.
//! It performs:
//! 1. **Discovery:** Looks up every device in the bus directory. The shared memory is
//!    required; a missing backplane, extension-bus controller, RAM or timing receiver
//!    disables only the subsystem depending on it.
//! 2. **Initialization:** Publishes the shared-memory header, clears the channel
//!    registers, opens the DAQ ring and scans the slaves.
//! 3. **Wiring:** Registers the IRQ handlers and spawns the tasks.
//! 4. **Execution:** Runs one scheduler tick per call and applies the exception
//!    policy when a task faults.

use std::fmt;
use std::sync::{Arc, Mutex};
use std::sync::atomic::AtomicU32;

use tracing::{error, info, warn};

use super::command::CommandHandler;
use super::daq::DaqAssembler;
use super::dispatcher::FgDispatcher;
use super::history::{History, HistoryKind};
use super::tasks::{CommandTask, DaqTask, FgTask};
use super::timing;
use super::{FirmwareContext, Hardware, SlotIrq};
use crate::access::SharedTransport;
use crate::common::constants::{IRQ_LINE_BACKPLANE, IRQ_LINE_MIL, IRQ_LINE_TIMING, MAX_SLOTS, PEND_DAQ_MASK, PEND_FG_MASK};
use crate::common::{ScuError, Slot};
use crate::config::{Config, FgConfig};
use crate::directory::{
    DEVICE_ECA_QUEUE, DEVICE_LM32_RAM_USER, DEVICE_MIL, DEVICE_SCU_BUS_MASTER, Directory, VENDOR_GSI,
};
use crate::protocol::SharedMemory;
use crate::ram::{Mmu, RamDevice, SharedRing};
use crate::rtos::{
    AlarmQueue, EventCounter, ExceptionAction, ExceptionHandler, IrqControl, IrqTable, Msi, MsiSource, Priority, Scheduler,
    SharedQueue, TaskHandle, TickReport, lock,
};
use crate::stats::{FirmwareStats, bump};

/// MSI arrival queue the application takes interrupts from.
pub type SharedMsiSource = Arc<dyn MsiSource + Send + Sync>;

/// The firmware application of one device.
pub struct Application {
    config: Config,
    transport: SharedTransport,
    msi: SharedMsiSource,
    cx: Arc<FirmwareContext>,
    irq: Arc<IrqControl>,
    irqs: IrqTable,
    scheduler: Scheduler,
    exceptions: ExceptionHandler,
    halted: bool,
}

impl fmt::Debug for Application {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Application")
            .field("cx", &self.cx)
            .field("scheduler", &self.scheduler)
            .field("halted", &self.halted)
            .finish_non_exhaustive()
    }
}

impl Application {
    /// Brings the application up.
    ///
    /// # Arguments
    ///
    /// * `transport` - Transport to the device bus.
    /// * `msi` - MSI arrival queue of the CPU.
    /// * `config` - Application configuration.
    ///
    /// # Returns
    ///
    /// The running application, or [`ScuError::DeviceAbsent`] if the shared memory is
    /// missing. A full RAM partition table fails with [`ScuError::Mmu`], an FG buffer
    /// larger than the polynomial table with [`ScuError::InvalidArgument`].
    pub fn new(transport: SharedTransport, msi: SharedMsiSource, config: &Config) -> Result<Self, ScuError> {
        let _ = FgConfig::check_buffer_size(config.fg.buffer_size).map_err(ScuError::InvalidArgument)?;
        let sys = &config.system;
        let directory = Directory::new(&*transport, sys.directory_root);
        let Some(shared_base) = directory.find(VENDOR_GSI, DEVICE_LM32_RAM_USER, 0)?.map(|r| r.base) else {
            error!("shared memory not in bus directory");
            return Err(ScuError::DeviceAbsent("lm32 shared memory"));
        };
        let optional = |device, name: &str| -> Result<Option<u64>, ScuError> {
            let base = directory.find(VENDOR_GSI, device, 0)?.map(|r| r.base);
            if base.is_none() {
                warn!(device = name, "device absent, subsystem disabled");
            }
            Ok(base)
        };
        let hardware = Hardware {
            bus: optional(DEVICE_SCU_BUS_MASTER, "backplane")?,
            mil: optional(DEVICE_MIL, "extension-bus controller")?,
            eca: optional(DEVICE_ECA_QUEUE, "timing receiver")?,
            slots: sys.slots.min(MAX_SLOTS as u8),
        };

        let shared = SharedMemory::new(SharedTransport::clone(&transport), shared_base);
        shared.initialize()?;

        let ring = match RamDevice::discover(SharedTransport::clone(&transport), sys.directory_root, &config.memory)? {
            Some(ram) => {
                let mmu = Mmu::new(ram, config.memory.mmu_anchor);
                Some(SharedRing::create(&mmu, config.memory.daq_ring_tag, config.memory.daq_ring_capacity)?)
            }
            None => {
                warn!(device = "ram", "device absent, daq blocks will be dropped");
                None
            }
        };

        let stats = Arc::new(FirmwareStats::default());
        let history = Arc::new(History::new(config.general.history_depth));
        let irq = Arc::new(IrqControl::new());
        let q = &config.queues;
        let alarms = Arc::new(AlarmQueue::new(q.alarm_queue, Arc::clone(&irq)));

        let mut fg = FgDispatcher::new(
            shared.clone(),
            hardware.bus.unwrap_or_default(),
            hardware.mil,
            &config.fg,
            Arc::clone(&stats),
            Arc::clone(&history),
        );
        fg.reset_registers()?;
        let daq = DaqAssembler::new(
            shared.clone(),
            hardware.bus.unwrap_or_default(),
            ring,
            Arc::clone(&stats),
            Arc::clone(&history),
        );

        let cx = Arc::new(FirmwareContext {
            transport: SharedTransport::clone(&transport),
            shared,
            hardware,
            fg: Mutex::new(fg),
            daq: Mutex::new(daq),
            fg_irqs: queue("fg-irq", q.irq_queue, &irq, &alarms),
            daq_irqs: queue("daq-irq", q.irq_queue, &irq, &alarms),
            events: queue("events", q.event_queue, &irq, &alarms),
            mil_irqs: queue("mil-irq", q.mil_queue, &irq, &alarms),
            fg_wakeups: EventCounter::new("fg-wakeup", q.irq_queue, Arc::clone(&irq), Some(Arc::clone(&alarms))),
            alarms,
            stats,
            history,
            mil_gap_interval: AtomicU32::new(0),
        });
        let report = cx.rescan(config.fg.max_macros)?;

        let mut scheduler = Scheduler::new();
        let daq_task = scheduler.spawn(Box::new(DaqTask::new(Arc::clone(&cx))), Priority::Realtime);
        let fg_task = scheduler.spawn(Box::new(FgTask::new(Arc::clone(&cx))), Priority::High);
        let mut handler = CommandHandler::new(Arc::clone(&cx), config.fg.max_macros);
        handler.set_tasks(fg_task.clone(), daq_task.clone());
        let _ = scheduler.spawn(
            Box::new(CommandTask::new(handler, config.general.command_poll_ticks)),
            Priority::Low,
        );
        if report.daq_slots == 0 {
            daq_task.suspend();
        }

        let mut irqs = IrqTable::new();
        register_handlers(&mut irqs, &cx, &fg_task, &daq_task);

        info!(
            fgs = report.fgs,
            daq_slots = report.daq_slots,
            ring = lock(&cx.daq).ring().is_some(),
            "application started"
        );
        Ok(Self {
            config: config.clone(),
            transport,
            msi,
            cx,
            irq,
            irqs,
            scheduler,
            exceptions: ExceptionHandler::new(config.general.exception_policy),
            halted: false,
        })
    }

    /// Shared firmware state.
    pub const fn context(&self) -> &Arc<FirmwareContext> {
        &self.cx
    }

    /// Firmware counters.
    pub fn stats(&self) -> &FirmwareStats {
        &self.cx.stats
    }

    /// History log.
    pub fn history(&self) -> &History {
        &self.cx.history
    }

    /// The scheduler.
    pub const fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Interrupt enable and critical-section state.
    pub fn irq_control(&self) -> &IrqControl {
        &self.irq
    }

    /// Faults handled so far.
    pub const fn exceptions(&self) -> &ExceptionHandler {
        &self.exceptions
    }

    /// Returns `true` after a fault under the halt policy.
    pub const fn is_halted(&self) -> bool {
        self.halted
    }

    /// Runs one scheduler tick.
    ///
    /// A faulting task is handled according to the exception policy: the application
    /// either halts, after which ticks do nothing, or is rebuilt from its reset state.
    pub fn tick(&mut self) -> Result<TickReport, ScuError> {
        if self.halted {
            return Ok(TickReport::default());
        }
        self.cx.history.set_now(self.scheduler.tick() + 1);
        let (irqs, irq, msi) = (&mut self.irqs, &self.irq, &self.msi);
        match self.scheduler.run_tick(|| {
            let _ = irqs.dispatch(irq, msi.as_ref());
        }) {
            Ok(report) => Ok(report),
            Err(fault) => {
                let tick = fault.tick;
                self.cx.history.record(HistoryKind::Error(fault.to_string()));
                match self.exceptions.handle(fault) {
                    ExceptionAction::Halt => {
                        self.halted = true;
                        self.scheduler.clear();
                        self.irqs.clear();
                    }
                    ExceptionAction::Restart => self.restart()?,
                }
                Ok(TickReport {
                    tick,
                    ..TickReport::default()
                })
            }
        }
    }

    /// Runs `ticks` scheduler ticks.
    pub fn run(&mut self, ticks: u64) -> Result<(), ScuError> {
        for _ in 0..ticks {
            let _ = self.tick()?;
        }
        Ok(())
    }

    /// Rebuilds the application from its reset state, keeping the fault record.
    pub fn restart(&mut self) -> Result<(), ScuError> {
        warn!("restarting application");
        self.scheduler.clear();
        self.irqs.clear();
        let mut fresh = Self::new(SharedTransport::clone(&self.transport), Arc::clone(&self.msi), &self.config)?;
        std::mem::swap(&mut fresh.exceptions, &mut self.exceptions);
        *self = fresh;
        Ok(())
    }
}

fn queue<T: Send + 'static>(
    name: &str,
    capacity: usize,
    irq: &Arc<IrqControl>,
    alarms: &Arc<AlarmQueue>,
) -> Arc<SharedQueue<T>> {
    SharedQueue::new(name, capacity, Arc::clone(irq), Some(Arc::clone(alarms)))
}

fn register_handlers(irqs: &mut IrqTable, cx: &Arc<FirmwareContext>, fg_task: &TaskHandle, daq_task: &TaskHandle) {
    if let Some(eca) = cx.hardware.eca {
        let (cx, fg_task) = (Arc::clone(cx), fg_task.clone());
        let _ = irqs.register(
            IRQ_LINE_TIMING,
            Box::new(move |_line: u8, _msi: Msi| {
                bump(&cx.stats.irq_timing);
                loop {
                    match timing::pop_event(&*cx.transport, eca) {
                        Ok(Some(event)) => {
                            let _ = cx.events.push(event);
                        }
                        Ok(None) => break,
                        Err(err) => {
                            warn!(%err, "timing receiver read failed");
                            break;
                        }
                    }
                }
                let _ = cx.fg_wakeups.push();
                fg_task.notify();
            }),
        );
    }

    let (bp_cx, bp_fg, bp_daq) = (Arc::clone(cx), fg_task.clone(), daq_task.clone());
    let _ = irqs.register(
        IRQ_LINE_BACKPLANE,
        Box::new(move |_line: u8, msi: Msi| {
            bump(&bp_cx.stats.irq_backplane);
            let Some(slot) = u8::try_from(msi.addr).ok().and_then(Slot::new) else {
                warn!(addr = msi.addr, "backplane irq from invalid slot");
                return;
            };
            let pending = msi.msg as u16;
            if pending & PEND_FG_MASK != 0 {
                let _ = bp_cx.fg_irqs.push(SlotIrq { slot, pending });
                let _ = bp_cx.fg_wakeups.push();
                bp_fg.notify();
            }
            if pending & PEND_DAQ_MASK != 0 {
                let _ = bp_cx.daq_irqs.push(SlotIrq { slot, pending });
                bp_daq.notify();
            }
        }),
    );

    let (mil_cx, mil_fg) = (Arc::clone(cx), fg_task.clone());
    let _ = irqs.register(
        IRQ_LINE_MIL,
        Box::new(move |_line: u8, msi: Msi| {
            bump(&mil_cx.stats.irq_mil);
            let _ = mil_cx.mil_irqs.push(msi);
            let _ = mil_cx.fg_wakeups.push();
            mil_fg.notify();
        }),
    );
}
