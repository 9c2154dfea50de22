//! Host configuration.
//!
//! A [`HostConfig`] names the device to talk to and sets the connection, RAM and
//! feedback knobs. It is supplied as JSON (`HostConfig::from_json`, `from_file`)
//! or taken from `HostConfig::default()`. The RAM and FG sections reuse the firmware
//! structures so both sides agree on tags, capacities and buffer sizes.

use std::path::{Path, PathBuf};
use std::time::Duration;

use scu_core::config::{FgConfig, MemoryConfig, SystemConfig};
use serde::Deserialize;

use crate::error::HostError;

/// Default configuration constants.
mod defaults {
    /// Device name of the first wishbone master.
    pub const DEVICE: &str = "dev/wbm0";

    /// Transport timeout in milliseconds.
    pub const TIMEOUT_MS: u64 = 5_000;

    /// Ring poll period in milliseconds.
    pub const POLL_INTERVAL_MS: u64 = 50;

    /// Statistics print period in milliseconds.
    pub const STATS_INTERVAL_MS: u64 = 10_000;

    /// Command completion poll period in microseconds.
    pub const COMMAND_POLL_US: u64 = 200;
}

/// Root host configuration.
///
/// # Examples
///
/// ```
/// use scu_host::HostConfig;
///
/// let config = HostConfig::from_json(r#"{ "device": "tcp/scuxl0042", "burst": true }"#).unwrap();
/// assert_eq!(config.device, "tcp/scuxl0042");
/// assert!(config.burst);
/// assert_eq!(config.timeout_ms, 5_000);
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct HostConfig {
    /// Target device name, e.g. `dev/wbm0` or `tcp/scuxl0042`
    #[serde(default = "HostConfig::default_device")]
    pub device: String,

    /// Transport timeout in milliseconds
    #[serde(default = "HostConfig::default_timeout")]
    pub timeout_ms: u64,

    /// Read the ring through the burst fifo window (opt-in)
    #[serde(default)]
    pub burst: bool,

    /// Ring poll period in milliseconds; keep it below half the block period
    #[serde(default = "HostConfig::default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Statistics print period in milliseconds; 0 disables printing
    #[serde(default = "HostConfig::default_stats_interval")]
    pub stats_interval_ms: u64,

    /// Command completion poll period in microseconds
    #[serde(default = "HostConfig::default_command_poll")]
    pub command_poll_us: u64,

    /// Directory holding the named-mutex lock files
    #[serde(default = "HostConfig::default_lock_dir")]
    pub lock_dir: PathBuf,

    /// Root of the bus directory
    #[serde(default = "HostConfig::default_directory_root")]
    pub directory_root: u64,

    /// Off-chip RAM and ring partition
    #[serde(default)]
    pub memory: MemoryConfig,

    /// FG channel layout
    #[serde(default)]
    pub fg: FgConfig,
}

impl HostConfig {
    /// Parses a configuration from JSON; absent fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Reads and parses a JSON configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, HostError> {
        let text = std::fs::read_to_string(path)?;
        Ok(Self::from_json(&text)?)
    }

    /// Transport timeout.
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Ring poll period.
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Statistics print period, `None` if printing is off.
    pub const fn stats_interval(&self) -> Option<Duration> {
        match self.stats_interval_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }

    /// Command completion poll period.
    pub const fn command_poll(&self) -> Duration {
        Duration::from_micros(self.command_poll_us)
    }

    /// RAM settings with the host burst policy applied.
    pub fn memory(&self) -> MemoryConfig {
        MemoryConfig {
            burst_read: self.burst,
            ..self.memory.clone()
        }
    }

    fn default_device() -> String {
        defaults::DEVICE.to_owned()
    }

    fn default_timeout() -> u64 {
        defaults::TIMEOUT_MS
    }

    fn default_poll_interval() -> u64 {
        defaults::POLL_INTERVAL_MS
    }

    fn default_stats_interval() -> u64 {
        defaults::STATS_INTERVAL_MS
    }

    fn default_command_poll() -> u64 {
        defaults::COMMAND_POLL_US
    }

    fn default_lock_dir() -> PathBuf {
        std::env::temp_dir()
    }

    fn default_directory_root() -> u64 {
        SystemConfig::default().directory_root
    }
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            device: Self::default_device(),
            timeout_ms: defaults::TIMEOUT_MS,
            burst: false,
            poll_interval_ms: defaults::POLL_INTERVAL_MS,
            stats_interval_ms: defaults::STATS_INTERVAL_MS,
            command_poll_us: defaults::COMMAND_POLL_US,
            lock_dir: Self::default_lock_dir(),
            directory_root: Self::default_directory_root(),
            memory: MemoryConfig::default(),
            fg: FgConfig::default(),
        }
    }
}
