//! Configuration system for the SCU core.
//!
//! This module defines all configuration structures used to parameterize the firmware
//! application and the simulated SoC. It provides:
//! 1. **Defaults:** Baseline addresses, capacities and rates.
//! 2. **Structures:** Hierarchical config for general, system, memory, queue and FG settings.
//! 3. **Enums:** RAM device kind and the CPU exception policy.
//!
//! Configuration is supplied as JSON (`Config::from_json`) or taken from `Config::default()`.

use serde::{Deserialize, Deserializer};

use crate::protocol::shared::POLY_ENTRIES;

/// Default configuration constants.
mod defaults {
    /// Scheduler tick rate (10 kHz).
    pub const TICK_RATE_HZ: u32 = 10_000;

    /// Entries of the firmware history ring.
    pub const HISTORY_DEPTH: usize = 64;

    /// Ticks between two polls of the host command queue.
    pub const COMMAND_POLL_TICKS: u32 = 10;

    /// Root address of the self-describing bus directory.
    pub const DIRECTORY_ROOT: u64 = 0x3FFF_E000;

    /// Base address of the backplane master window (slot 0).
    pub const SCUBUS_BASE: u64 = 0x0040_0000;

    /// Base address of the LM32 shared memory.
    pub const SHARED_RAM_BASE: u64 = 0x1000_0000;

    /// Size of the LM32 shared memory in bytes (256 KiB).
    pub const SHARED_RAM_SIZE: u64 = 0x0004_0000;

    /// Base address of the off-chip RAM transparent window.
    pub const DDR3_BASE: u64 = 0x2000_0000;

    /// Base address of the timing receiver event queue.
    pub const ECA_BASE: u64 = 0x3000_0000;

    /// Base address of the extension-bus controller.
    pub const MIL_BASE: u64 = 0x3100_0000;

    /// Number of equipped backplane slots.
    pub const SLOTS: u8 = 12;

    /// Off-chip RAM capacity in 64-bit words (128 MiB).
    pub const RAM_CAPACITY64: u64 = 16 * 1024 * 1024;

    /// Word index of the partition table anchor.
    pub const MMU_ANCHOR: u64 = 0;

    /// Partition tag of the DAQ ring.
    pub const DAQ_RING_TAG: u16 = 0xDA00;

    /// Payload capacity of the DAQ ring in 64-bit words.
    pub const DAQ_RING_CAPACITY: u32 = 64 * 1024;

    /// Capacity of the backplane IRQ queue.
    pub const IRQ_QUEUE_CAPACITY: usize = 32;

    /// Capacity of the timing event queue.
    pub const EVENT_QUEUE_CAPACITY: usize = 16;

    /// Capacity of the alarm queue.
    pub const ALARM_CAPACITY: usize = 8;

    /// Capacity of the extension-bus IRQ queue.
    pub const MIL_QUEUE_CAPACITY: usize = 16;

    /// Size of the FG macro table.
    pub const MAX_MACROS: usize = 256;

    /// Number of FG channel registers.
    pub const FG_CHANNELS: usize = 16;

    /// Polynomial entries per channel buffer.
    pub const FG_BUFFER_SIZE: u32 = 1024;

    /// Timing event tag armed channels start on.
    pub const FG_EVENT_TAG: u32 = 0x0000_0FC0;
}

/// Off-chip RAM device variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum RamKind {
    /// DDR3 with ordered 32-bit halves and a burst fifo window.
    #[default]
    #[serde(alias = "DDR3")]
    Ddr3,
    /// Static RAM with plain 64-bit words.
    #[serde(alias = "SRAM")]
    Sram,
}

/// Reaction to a CPU exception raised by a firmware task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum ExceptionPolicy {
    /// Stop the scheduler; the simulator reports the halt.
    #[default]
    Halt,
    /// Restart the application from its reset state.
    Restart,
}

/// Root configuration structure.
///
/// # Examples
///
/// ```
/// use scu_core::config::{Config, RamKind};
///
/// let config = Config::from_json(r#"{ "memory": { "kind": "Sram", "burst_read": true } }"#).unwrap();
/// assert_eq!(config.memory.kind, RamKind::Sram);
/// assert!(config.memory.burst_read);
/// assert_eq!(config.general.tick_rate_hz, 10_000);
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Scheduler and application settings
    #[serde(default)]
    pub general: GeneralConfig,
    /// Address map of the SoC
    #[serde(default)]
    pub system: SystemConfig,
    /// Off-chip RAM and shared partition settings
    #[serde(default)]
    pub memory: MemoryConfig,
    /// Queue capacities
    #[serde(default)]
    pub queues: QueueConfig,
    /// Function generator settings
    #[serde(default)]
    pub fg: FgConfig,
}

impl Config {
    /// Parses a configuration from JSON; absent fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Scheduler and application settings.
#[derive(Debug, Clone, Deserialize)]
pub struct GeneralConfig {
    /// Scheduler tick rate in Hz
    #[serde(default = "GeneralConfig::default_tick_rate")]
    pub tick_rate_hz: u32,

    /// Reaction to CPU exceptions
    #[serde(default)]
    pub exception_policy: ExceptionPolicy,

    /// Entries kept in the history ring
    #[serde(default = "GeneralConfig::default_history_depth")]
    pub history_depth: usize,

    /// Ticks between command queue polls
    #[serde(default = "GeneralConfig::default_command_poll")]
    pub command_poll_ticks: u32,
}

impl GeneralConfig {
    fn default_tick_rate() -> u32 {
        defaults::TICK_RATE_HZ
    }

    fn default_history_depth() -> usize {
        defaults::HISTORY_DEPTH
    }

    fn default_command_poll() -> u32 {
        defaults::COMMAND_POLL_TICKS
    }
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            tick_rate_hz: defaults::TICK_RATE_HZ,
            exception_policy: ExceptionPolicy::Halt,
            history_depth: defaults::HISTORY_DEPTH,
            command_poll_ticks: defaults::COMMAND_POLL_TICKS,
        }
    }
}

/// Address map of the SoC.
#[derive(Debug, Clone, Deserialize)]
pub struct SystemConfig {
    /// Root of the bus directory
    #[serde(default = "SystemConfig::default_directory_root")]
    pub directory_root: u64,

    /// Backplane master window base
    #[serde(default = "SystemConfig::default_scubus_base")]
    pub scubus_base: u64,

    /// LM32 shared memory base
    #[serde(default = "SystemConfig::default_shared_ram_base")]
    pub shared_ram_base: u64,

    /// LM32 shared memory size in bytes
    #[serde(default = "SystemConfig::default_shared_ram_size")]
    pub shared_ram_size: u64,

    /// Off-chip RAM window base
    #[serde(default = "SystemConfig::default_ddr3_base")]
    pub ddr3_base: u64,

    /// Timing receiver queue base
    #[serde(default = "SystemConfig::default_eca_base")]
    pub eca_base: u64,

    /// Extension-bus controller base
    #[serde(default = "SystemConfig::default_mil_base")]
    pub mil_base: u64,

    /// Number of backplane slots
    #[serde(default = "SystemConfig::default_slots")]
    pub slots: u8,
}

impl SystemConfig {
    fn default_directory_root() -> u64 {
        defaults::DIRECTORY_ROOT
    }

    fn default_scubus_base() -> u64 {
        defaults::SCUBUS_BASE
    }

    fn default_shared_ram_base() -> u64 {
        defaults::SHARED_RAM_BASE
    }

    fn default_shared_ram_size() -> u64 {
        defaults::SHARED_RAM_SIZE
    }

    fn default_ddr3_base() -> u64 {
        defaults::DDR3_BASE
    }

    fn default_eca_base() -> u64 {
        defaults::ECA_BASE
    }

    fn default_mil_base() -> u64 {
        defaults::MIL_BASE
    }

    fn default_slots() -> u8 {
        defaults::SLOTS
    }
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            directory_root: defaults::DIRECTORY_ROOT,
            scubus_base: defaults::SCUBUS_BASE,
            shared_ram_base: defaults::SHARED_RAM_BASE,
            shared_ram_size: defaults::SHARED_RAM_SIZE,
            ddr3_base: defaults::DDR3_BASE,
            eca_base: defaults::ECA_BASE,
            mil_base: defaults::MIL_BASE,
            slots: defaults::SLOTS,
        }
    }
}

/// Off-chip RAM and shared partition settings.
#[derive(Debug, Clone, Deserialize)]
pub struct MemoryConfig {
    /// RAM device kind
    #[serde(default)]
    pub kind: RamKind,

    /// Capacity in 64-bit words
    #[serde(default = "MemoryConfig::default_capacity")]
    pub capacity64: u64,

    /// Word index of the partition table anchor
    #[serde(default = "MemoryConfig::default_anchor")]
    pub mmu_anchor: u64,

    /// Partition tag of the DAQ ring
    #[serde(default = "MemoryConfig::default_ring_tag")]
    pub daq_ring_tag: u16,

    /// DAQ ring payload capacity in 64-bit words
    #[serde(default = "MemoryConfig::default_ring_capacity")]
    pub daq_ring_capacity: u32,

    /// Use the burst fifo window for block reads (opt-in)
    #[serde(default)]
    pub burst_read: bool,
}

impl MemoryConfig {
    fn default_capacity() -> u64 {
        defaults::RAM_CAPACITY64
    }

    fn default_anchor() -> u64 {
        defaults::MMU_ANCHOR
    }

    fn default_ring_tag() -> u16 {
        defaults::DAQ_RING_TAG
    }

    fn default_ring_capacity() -> u32 {
        defaults::DAQ_RING_CAPACITY
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            kind: RamKind::Ddr3,
            capacity64: defaults::RAM_CAPACITY64,
            mmu_anchor: defaults::MMU_ANCHOR,
            daq_ring_tag: defaults::DAQ_RING_TAG,
            daq_ring_capacity: defaults::DAQ_RING_CAPACITY,
            burst_read: false,
        }
    }
}

/// Queue capacities.
#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
    /// Backplane IRQ queue
    #[serde(default = "QueueConfig::default_irq")]
    pub irq_queue: usize,

    /// Timing event queue
    #[serde(default = "QueueConfig::default_event")]
    pub event_queue: usize,

    /// Extension-bus IRQ queue
    #[serde(default = "QueueConfig::default_mil")]
    pub mil_queue: usize,

    /// Alarm queue
    #[serde(default = "QueueConfig::default_alarm")]
    pub alarm_queue: usize,
}

impl QueueConfig {
    fn default_irq() -> usize {
        defaults::IRQ_QUEUE_CAPACITY
    }

    fn default_event() -> usize {
        defaults::EVENT_QUEUE_CAPACITY
    }

    fn default_mil() -> usize {
        defaults::MIL_QUEUE_CAPACITY
    }

    fn default_alarm() -> usize {
        defaults::ALARM_CAPACITY
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            irq_queue: defaults::IRQ_QUEUE_CAPACITY,
            event_queue: defaults::EVENT_QUEUE_CAPACITY,
            mil_queue: defaults::MIL_QUEUE_CAPACITY,
            alarm_queue: defaults::ALARM_CAPACITY,
        }
    }
}

/// Function generator settings.
#[derive(Debug, Clone, Deserialize)]
pub struct FgConfig {
    /// Size of the FG macro table
    #[serde(default = "FgConfig::default_max_macros")]
    pub max_macros: usize,

    /// Number of channel registers
    #[serde(default = "FgConfig::default_channels")]
    pub channels: usize,

    /// Polynomial entries per channel buffer
    #[serde(
        default = "FgConfig::default_buffer_size",
        deserialize_with = "FgConfig::deserialize_buffer_size"
    )]
    pub buffer_size: u32,

    /// Event tag used when a channel register carries tag 0
    #[serde(default = "FgConfig::default_event_tag")]
    pub event_tag: u32,
}

impl FgConfig {
    /// Checks that the channel buffer fits the shared-memory polynomial table.
    ///
    /// # Returns
    ///
    /// A description of the problem if `buffer_size` is 0 or above [`POLY_ENTRIES`].
    pub fn check_buffer_size(buffer_size: u32) -> Result<u32, String> {
        if (1..=POLY_ENTRIES).contains(&buffer_size) {
            Ok(buffer_size)
        } else {
            Err(format!("fg.buffer_size {buffer_size} outside 1..={POLY_ENTRIES}"))
        }
    }

    fn deserialize_buffer_size<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
        Self::check_buffer_size(u32::deserialize(deserializer)?).map_err(serde::de::Error::custom)
    }

    fn default_max_macros() -> usize {
        defaults::MAX_MACROS
    }

    fn default_channels() -> usize {
        defaults::FG_CHANNELS
    }

    fn default_buffer_size() -> u32 {
        defaults::FG_BUFFER_SIZE
    }

    fn default_event_tag() -> u32 {
        defaults::FG_EVENT_TAG
    }
}

impl Default for FgConfig {
    fn default() -> Self {
        Self {
            max_macros: defaults::MAX_MACROS,
            channels: defaults::FG_CHANNELS,
            buffer_size: defaults::FG_BUFFER_SIZE,
            event_tag: defaults::FG_EVENT_TAG,
        }
    }
}
