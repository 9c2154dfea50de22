//! Simulated SoC construction and the top-level `Soc` type.
//!
//! This module builds the complete SoC from configuration. It performs:
//! 1. **Bus setup:** Creates the interconnect and the MSI arrival queue.
//! 2. **Device registration:** Instantiates the backplane (with the requested slave cards),
//!    the LM32 shared RAM, DDR3 or SRAM, the timing receiver and the extension-bus controller.
//! 3. **Directory:** Publishes every device in a directory ROM at the configured root.

use std::io;
use std::sync::{Arc, Mutex};

use tracing::info;

use crate::config::{Config, RamKind};
use crate::directory::{
    DEVICE_DDR3_BURST, DEVICE_DDR3_TRANSPARENT, DEVICE_ECA_QUEUE, DEVICE_LM32_RAM_USER, DEVICE_MIL,
    DEVICE_SCU_BUS_MASTER, DeviceRecord, VENDOR_GSI,
};
use crate::ram::BurstRegs;
use crate::rtos::lock;
use crate::soc::devices::{Backplane, ByteMemory, Eca, MilController, SlaveCard, TimingEvent};
use crate::soc::interconnect::Bus;
use crate::soc::memory::{Ddr3Device, Sram};
use crate::soc::msi::MsiQueue;
use crate::soc::transport::SocTransport;

/// Top-level simulated SoC: the shared bus and the MSI arrival queue.
#[derive(Debug, Clone)]
pub struct Soc {
    bus: Arc<Mutex<Bus>>,
    msi: Arc<MsiQueue>,
}

/// Collects the slave cards and extension-bus interface cards of a SoC.
#[derive(Debug)]
pub struct SocBuilder {
    config: Config,
    cards: Vec<(u8, SlaveCard)>,
    mil_ifks: Vec<u8>,
    with_mil: bool,
}

impl SocBuilder {
    /// Plugs `card` into backplane `slot`.
    #[must_use]
    pub fn card(mut self, slot: u8, card: SlaveCard) -> Self {
        self.cards.push((slot, card));
        self
    }

    /// Attaches interface cards to the extension-bus controller's own port.
    #[must_use]
    pub fn mil_ifks(mut self, ifks: &[u8]) -> Self {
        self.mil_ifks.extend_from_slice(ifks);
        self
    }

    /// Leaves the extension-bus controller out of the SoC.
    #[must_use]
    pub const fn without_mil(mut self) -> Self {
        self.with_mil = false;
        self
    }

    /// Builds the SoC.
    ///
    /// # Returns
    ///
    /// The SoC, or the OS error if the RAM backing could not be mapped.
    pub fn build(self) -> io::Result<Soc> {
        let sys = &self.config.system;
        let mem = &self.config.memory;
        let msi = Arc::new(MsiQueue::new());
        let mut bus = Bus::new();
        let mut records = Vec::new();
        let record = |device, base, size, name: &str| DeviceRecord {
            vendor: VENDOR_GSI,
            device,
            version: 1,
            base,
            size,
            next: 0,
            name: name.to_owned(),
        };

        let mut backplane = Backplane::new(sys.scubus_base, sys.slots, Arc::clone(&msi));
        for (slot, card) in self.cards {
            if !backplane.insert(slot, card) {
                tracing::warn!(slot, "card ignored, no such slot");
            }
        }
        let (base, size) = crate::soc::traits::Device::address_range(&backplane);
        records.push(record(DEVICE_SCU_BUS_MASTER, base, size, "SCU-BUS-Master"));
        bus.add_device(Box::new(backplane));

        let shared = ByteMemory::shared_ram(sys.shared_ram_base, sys.shared_ram_size as usize);
        records.push(record(DEVICE_LM32_RAM_USER, sys.shared_ram_base, sys.shared_ram_size, "LM32-RAM-User"));
        bus.add_device(Box::new(shared));

        let window = mem.capacity64 * 8;
        match mem.kind {
            RamKind::Ddr3 => {
                let ddr3 = Ddr3Device::new(sys.ddr3_base, mem.capacity64)?;
                records.push(record(DEVICE_DDR3_TRANSPARENT, sys.ddr3_base, window, "DDR3-Transparent"));
                records.push(record(DEVICE_DDR3_BURST, ddr3.burst_base(), BurstRegs::WINDOW, "DDR3-Burst"));
                bus.add_device(Box::new(ddr3));
            }
            RamKind::Sram => {
                let sram = Sram::new(sys.ddr3_base, mem.capacity64)?;
                records.push(record(DEVICE_DDR3_TRANSPARENT, sys.ddr3_base, window, "SRAM"));
                bus.add_device(Box::new(sram));
            }
        }

        let eca = Eca::new(sys.eca_base, Arc::clone(&msi));
        records.push(record(DEVICE_ECA_QUEUE, sys.eca_base, crate::protocol::slave::eca::WINDOW, "ECA-Queue"));
        bus.add_device(Box::new(eca));

        if self.with_mil {
            let mil = MilController::new(sys.mil_base, &self.mil_ifks);
            records.push(record(DEVICE_MIL, sys.mil_base, crate::soc::devices::mil::MIL_WINDOW, "MIL-Controller"));
            bus.add_device(Box::new(mil));
        }

        info!(devices = records.len(), root = format_args!("{:#x}", sys.directory_root), "soc built");
        bus.add_device(Box::new(ByteMemory::directory_rom(sys.directory_root, &records)));

        Ok(Soc {
            bus: Arc::new(Mutex::new(bus)),
            msi,
        })
    }
}

impl Soc {
    /// Starts building a SoC from configuration.
    pub fn builder(config: &Config) -> SocBuilder {
        SocBuilder {
            config: config.clone(),
            cards: Vec::new(),
            mil_ifks: Vec::new(),
            with_mil: true,
        }
    }

    /// A new transport on this SoC's bus.
    pub fn transport(&self) -> SocTransport {
        SocTransport::new(Arc::clone(&self.bus))
    }

    /// The MSI arrival queue.
    pub fn msi(&self) -> Arc<MsiQueue> {
        Arc::clone(&self.msi)
    }

    /// Runs `f` with exclusive access to the bus.
    pub fn with_bus<R>(&self, f: impl FnOnce(&mut Bus) -> R) -> R {
        f(&mut lock(&self.bus))
    }

    /// Runs `f` on the backplane; `None` if the SoC has none.
    pub fn with_backplane<R>(&self, f: impl FnOnce(&mut Backplane) -> R) -> Option<R> {
        self.with_bus(|bus| bus.backplane_mut().map(f))
    }

    /// Delivers a timing event; returns `false` if the receiver queue is full or absent.
    pub fn inject_event(&self, tag: u32, time: u64) -> bool {
        self.with_bus(|bus| bus.eca_mut().is_some_and(|eca| eca.inject(TimingEvent { tag, time })))
    }

    /// Advances every device by one tick; returns the number of devices that raised an MSI.
    pub fn tick(&self) -> usize {
        self.with_bus(Bus::tick)
    }
}
