use scu_core::access::SharedTransport;
use scu_core::config::Config;
use scu_core::protocol::{Opcode, RawCommand, SharedMemory};
use scu_core::soc::devices::SlaveCard;
use scu_core::{Simulator, Soc};

/// Ticks a command may take before a test gives up.
pub const COMMAND_TICKS: u64 = 200;

/// Configuration used by the tests: free-running ticks and a small RAM.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.general.tick_rate_hz = 0;
    config.memory.capacity64 = 1 << 20;
    config
}

/// Installs a tracing subscriber writing through the test capture.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new("debug"))
        .with_test_writer()
        .try_init();
}

pub struct TestContext {
    pub sim: Simulator,
}

impl TestContext {
    /// Boots the firmware on a SoC carrying `cards`.
    pub fn new(cards: Vec<(u8, SlaveCard)>) -> Self {
        Self::with_config(test_config(), cards)
    }

    pub fn with_config(config: Config, cards: Vec<(u8, SlaveCard)>) -> Self {
        init_tracing();
        let mut builder = Soc::builder(&config);
        for (slot, card) in cards {
            builder = builder.card(slot, card);
        }
        let soc = builder.build().unwrap();
        let sim = Simulator::new(soc, &config).unwrap();
        Self { sim }
    }

    /// Shared memory as the firmware sees it.
    pub fn shared(&self) -> &SharedMemory<SharedTransport> {
        &self.sim.app.context().shared
    }

    /// Runs `ticks` ticks.
    pub fn run(&mut self, ticks: u64) {
        self.sim.run(ticks).unwrap();
    }

    /// Ticks until `done` holds; panics after `max` ticks.
    pub fn run_until(&mut self, max: u64, done: impl FnMut(&Simulator) -> bool) {
        assert!(self.sim.run_until(max, done).unwrap(), "condition not reached in {max} ticks");
    }

    /// Posts a command and ticks until the firmware has taken it.
    pub fn command(&mut self, opcode: Opcode, arg: u32) {
        self.post(RawCommand::new(opcode, arg));
    }

    /// Posts raw command words and ticks until the firmware has taken them.
    pub fn post(&mut self, raw: RawCommand) {
        let (write, _) = self.shared().command_counters().unwrap();
        self.shared().post_command(write, raw).unwrap();
        self.run_until(COMMAND_TICKS, |sim| {
            let shared = &sim.app.context().shared;
            let (_, read) = shared.command_counters().unwrap();
            read == write.wrapping_add(1) && !shared.busy().unwrap()
        });
    }

    /// Raises `flags` on the pending register of `slot`, as the card would.
    pub fn raise(&self, slot: u8, flags: u16) {
        let _ = self.sim.soc.with_backplane(|bp| bp.raise(slot, flags));
    }
}
