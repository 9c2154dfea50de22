use std::sync::Arc;

use scu_core::access::SharedTransport;
use scu_core::config::Config;
use scu_core::sim::RunningSimulator;
use scu_core::soc::devices::SlaveCard;
use scu_core::{Simulator, Soc};
use scu_host::ram::{HostShared, open_shared};
use scu_host::{CommandClient, Connection, HostConfig};
use tempfile::TempDir;

/// Firmware configuration of the simulated device.
pub fn device_config(tick_rate_hz: u32) -> Config {
    let mut config = Config::default();
    config.general.tick_rate_hz = tick_rate_hz;
    config.memory.capacity64 = 1 << 20;
    config
}

/// A simulated SCU plus a host connection to it.
///
/// The simulator is either held here, ticked by the test, or running on its
/// own thread so blocking host calls can complete.
pub struct Device {
    pub config: HostConfig,
    pub conn: Arc<Connection>,
    sim: Option<Simulator>,
    running: Option<RunningSimulator>,
    _locks: TempDir,
}

impl Device {
    /// Boots a device carrying `cards`, ticked by the test.
    pub fn boot(cards: Vec<(u8, SlaveCard)>) -> Self {
        Self::boot_at(0, cards)
    }

    /// Boots a device whose background thread ticks at `tick_rate_hz`.
    pub fn boot_at(tick_rate_hz: u32, cards: Vec<(u8, SlaveCard)>) -> Self {
        let _ = scu_host::logging::init_for_tests();
        let fw = device_config(tick_rate_hz);
        let mut builder = Soc::builder(&fw);
        for (slot, card) in cards {
            builder = builder.card(slot, card);
        }
        let sim = Simulator::new(builder.build().unwrap(), &fw).unwrap();

        let locks = tempfile::tempdir().unwrap();
        let config = HostConfig {
            device: "sim/scu0".to_owned(),
            timeout_ms: 2_000,
            poll_interval_ms: 1,
            stats_interval_ms: 0,
            command_poll_us: 50,
            lock_dir: locks.path().to_path_buf(),
            directory_root: fw.system.directory_root,
            memory: fw.memory.clone(),
            fg: fw.fg.clone(),
            ..HostConfig::default()
        };
        let transport: SharedTransport = Arc::new(sim.host_transport());
        let conn = Connection::attach(&config, transport).unwrap();
        Self {
            config,
            conn,
            sim: Some(sim),
            running: None,
            _locks: locks,
        }
    }

    /// The simulator; panics while it runs on its thread.
    pub fn sim(&mut self) -> &mut Simulator {
        self.sim.as_mut().expect("simulator is running")
    }

    /// Starts ticking on a background thread.
    pub fn start(&mut self) {
        if let Some(sim) = self.sim.take() {
            self.running = Some(sim.spawn());
        }
    }

    /// Stops the background thread and takes the simulator back.
    pub fn halt(&mut self) {
        if let Some(running) = self.running.take() {
            self.sim = Some(running.stop().expect("simulator thread panicked"));
        }
    }

    /// LM32 shared memory through the connection.
    pub fn shared(&self) -> HostShared {
        open_shared(&self.conn, &self.config).unwrap()
    }

    /// Command client through the connection.
    pub fn commands(&self) -> CommandClient<Arc<Connection>> {
        CommandClient::new(self.shared(), &self.config)
    }
}
