//! Connection lifecycle wrapper.
//!
//! A [`Connection`] stands between the host library and the raw serial-bus
//! transport. It performs:
//! 1. **Lifecycle:** The link is opened on first use or by an explicit
//!    [`Connection::connect`] and closed only by the connection that opened it.
//!    A connection attached to a link someone else opened never closes it.
//! 2. **Serialization:** Every cycle holds the device's [`NamedMutex`], so one
//!    cycle at a time reaches the device across all processes.
//! 3. **Measurement:** Every cycle is timed and classified as LM32 or RAM access.
//!
//! [`Connection`] implements [`Transport`], so every layer of the core library
//! (shared memory, RAM drivers, MMU, ring) runs over it unchanged.

use std::fmt;
use std::ops::Range;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant, SystemTime};

use scu_core::access::{self, BusOp, OpKind, SharedTransport, Transport};
use scu_core::common::constants::MAX_CYCLE_OPS;
use scu_core::common::{AccessKind, AddrMode, Format, TransportError};
use tracing::{debug, info, warn};

use crate::config::HostConfig;
use crate::measure::{Measurement, Measurements};
use crate::named_mutex::NamedMutex;

/// Opens the raw link to a named device within a timeout.
pub type Opener = Box<dyn Fn(&str, Duration) -> Result<SharedTransport, TransportError> + Send + Sync>;

struct Link {
    transport: SharedTransport,
    owned: bool,
}

/// Serialized, measured access to one device.
pub struct Connection {
    device: String,
    timeout: Duration,
    opener: Option<Opener>,
    link: RwLock<Option<Link>>,
    mutex: NamedMutex,
    measurements: Measurements,
    ram_windows: RwLock<Vec<Range<u64>>>,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("device", &self.device)
            .field("connected", &self.is_connected())
            .field("mutex", &self.mutex.path())
            .finish_non_exhaustive()
    }
}

impl Connection {
    /// Creates a connection that opens its own link through `opener`.
    ///
    /// Nothing is opened until the first cycle or [`Connection::connect`].
    ///
    /// # Arguments
    ///
    /// * `config` - Device name, timeout and lock directory.
    /// * `opener` - Builds the raw transport for the device name.
    pub fn new(config: &HostConfig, opener: Opener) -> Result<Arc<Self>, TransportError> {
        Self::build(config, Some(opener), None)
    }

    /// Creates a connection over a link opened elsewhere.
    ///
    /// The connection serializes and measures cycles but never closes `transport`.
    pub fn attach(config: &HostConfig, transport: SharedTransport) -> Result<Arc<Self>, TransportError> {
        let link = Link {
            transport,
            owned: false,
        };
        Self::build(config, None, Some(link))
    }

    fn build(config: &HostConfig, opener: Option<Opener>, link: Option<Link>) -> Result<Arc<Self>, TransportError> {
        let mutex = NamedMutex::open(&config.lock_dir, &config.device)
            .map_err(|e| TransportError::Lock(format!("{}: {e}", config.device)))?;
        debug!(device = %config.device, lock = %mutex.path().display(), "connection created");
        Ok(Arc::new(Self {
            device: config.device.clone(),
            timeout: config.timeout(),
            opener,
            link: RwLock::new(link),
            mutex,
            measurements: Measurements::new(),
            ram_windows: RwLock::new(Vec::new()),
        }))
    }

    /// Device name.
    pub fn device(&self) -> &str {
        &self.device
    }

    /// Returns `true` while a link is open.
    pub fn is_connected(&self) -> bool {
        self.link.read().unwrap_or_else(PoisonError::into_inner).is_some()
    }

    /// Opens the link if it is not open yet.
    pub fn connect(&self) -> Result<(), TransportError> {
        let _ = self.transport()?;
        Ok(())
    }

    /// Closes the link if this connection opened it.
    ///
    /// # Returns
    ///
    /// `true` if a link was closed. An attached link stays open.
    pub fn close(&self) -> bool {
        let mut link = self.link.write().unwrap_or_else(PoisonError::into_inner);
        if link.as_ref().is_some_and(|l| l.owned) {
            *link = None;
            info!(device = %self.device, "connection closed");
            true
        } else {
            false
        }
    }

    /// Marks `range` as off-chip RAM so cycles into it are measured as RAM access.
    pub fn add_ram_window(&self, range: Range<u64>) {
        self.ram_windows.write().unwrap_or_else(PoisonError::into_inner).push(range);
    }

    /// Access-time extremes.
    pub const fn measurements(&self) -> &Measurements {
        &self.measurements
    }

    fn transport(&self) -> Result<SharedTransport, TransportError> {
        if let Some(link) = &*self.link.read().unwrap_or_else(PoisonError::into_inner) {
            return Ok(Arc::clone(&link.transport));
        }
        let mut link = self.link.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(link) = &*link {
            return Ok(Arc::clone(&link.transport));
        }
        let opener = self.opener.as_ref().ok_or(TransportError::NotConnected)?;
        let transport = opener(&self.device, self.timeout)?;
        info!(device = %self.device, "connection opened");
        *link = Some(Link {
            transport: Arc::clone(&transport),
            owned: true,
        });
        Ok(transport)
    }

    fn classify(&self, ops: &[BusOp]) -> AccessKind {
        let Some(first) = ops.first() else {
            return AccessKind::Lm32Read;
        };
        let ram = self
            .ram_windows
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|w| w.contains(&first.addr));
        match (ram, first.kind) {
            (true, OpKind::Read) => AccessKind::RamRead,
            (true, OpKind::Write) => AccessKind::RamWrite,
            (false, OpKind::Read) => AccessKind::Lm32Read,
            (false, OpKind::Write) => AccessKind::Lm32Write,
        }
    }

    // ═══════════════════════════════════════════════════════════════════
    // Typed access
    // ═══════════════════════════════════════════════════════════════════

    /// Reads `out.len()` elements starting at `addr`.
    pub fn read(&self, addr: u64, out: &mut [u64], format: Format, mode: AddrMode) -> Result<(), TransportError> {
        access::read(self, addr, out, format, mode)
    }

    /// Writes `data` as elements starting at `addr`.
    pub fn write(&self, addr: u64, data: &[u64], format: Format, mode: AddrMode) -> Result<(), TransportError> {
        access::write(self, addr, data, format, mode)
    }

    /// Writes 64-bit words to the off-chip RAM window, high half first.
    pub fn ddr3_write(&self, addr: u64, data: &[u64], mode: AddrMode) -> Result<(), TransportError> {
        access::ddr3_write(self, addr, data, mode)
    }

    /// Reads 64-bit words from the off-chip RAM window, low half first.
    pub fn ddr3_read(&self, addr: u64, out: &mut [u64], mode: AddrMode) -> Result<(), TransportError> {
        access::ddr3_read(self, addr, out, mode)
    }
}

impl Transport for Connection {
    fn cycle(&self, ops: &mut [BusOp]) -> Result<(), TransportError> {
        let transport = self.transport()?;
        let _guard = self
            .mutex
            .lock()
            .map_err(|e| TransportError::Lock(format!("{}: {e}", self.device)))?;
        let timestamp = SystemTime::now();
        let start = Instant::now();
        transport.cycle(ops)?;
        let duration = start.elapsed();
        if duration > self.timeout {
            warn!(device = %self.device, ?duration, ops = ops.len(), "cycle exceeded the timeout");
        }
        self.measurements.record(Measurement {
            duration,
            timestamp,
            size: ops.len(),
            kind: self.classify(ops),
        });
        Ok(())
    }

    fn max_cycle_ops(&self) -> usize {
        self.link
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map_or(MAX_CYCLE_OPS, |l| l.transport.max_cycle_ops())
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
