//! Self-describing bus directory.
//!
//! The directory is a linked list of 64-byte big-endian records rooted at a fixed
//! address. Each record names one peripheral by `(vendor, device)` and carries its
//! base address and size. Lookups walk the list on every call.

use tracing::debug;

use crate::access::{self, Transport};
use crate::common::constants::ADDRESS_NOT_FOUND;
use crate::common::{AddrMode, Format, TransportError};

/// Size of one directory record in bytes.
pub const RECORD_SIZE: u64 = 64;

/// Upper bound on the records walked; protects against cyclic `next` links.
pub const MAX_RECORDS: usize = 256;

/// Vendor id of all SCU peripherals.
pub const VENDOR_GSI: u64 = 0x0000_0651;

/// Backplane master.
pub const DEVICE_SCU_BUS_MASTER: u32 = 0x9602_EB6F;
/// LM32 shared memory.
pub const DEVICE_LM32_RAM_USER: u32 = 0x5411_1351;
/// Off-chip RAM transparent window.
pub const DEVICE_DDR3_TRANSPARENT: u32 = 0x2015_0828;
/// Off-chip RAM burst fifo window.
pub const DEVICE_DDR3_BURST: u32 = 0x2016_0525;
/// Timing receiver event queue.
pub const DEVICE_ECA_QUEUE: u32 = 0xD5A3_FAEA;
/// Extension-bus controller.
pub const DEVICE_MIL: u32 = 0x35AA_6B96;

/// Length of the name field of a record.
pub const NAME_LEN: usize = 24;

/// A decoded directory record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceRecord {
    /// Vendor id.
    pub vendor: u64,
    /// Device id.
    pub device: u32,
    /// Device version.
    pub version: u32,
    /// Base address on the bus.
    pub base: u64,
    /// Size of the mapped region in bytes.
    pub size: u64,
    /// Absolute address of the next record, 0 at the end.
    pub next: u64,
    /// ASCII name, trailing padding removed.
    pub name: String,
}

impl DeviceRecord {
    /// Encodes the record into its 64-byte wire image.
    pub fn encode(&self) -> [u8; RECORD_SIZE as usize] {
        let mut out = [0u8; RECORD_SIZE as usize];
        out[0x00..0x08].copy_from_slice(&self.vendor.to_be_bytes());
        out[0x08..0x0C].copy_from_slice(&self.device.to_be_bytes());
        out[0x0C..0x10].copy_from_slice(&self.version.to_be_bytes());
        out[0x10..0x18].copy_from_slice(&self.base.to_be_bytes());
        out[0x18..0x20].copy_from_slice(&self.size.to_be_bytes());
        out[0x20..0x28].copy_from_slice(&self.next.to_be_bytes());
        let name = self.name.as_bytes();
        let n = name.len().min(NAME_LEN);
        out[0x28..0x28 + n].copy_from_slice(&name[..n]);
        out
    }

    /// Decodes a record from its wire image.
    pub fn decode(raw: &[u8; RECORD_SIZE as usize]) -> Self {
        let be64 = |o: usize| {
            let mut b = [0u8; 8];
            b.copy_from_slice(&raw[o..o + 8]);
            u64::from_be_bytes(b)
        };
        let be32 = |o: usize| {
            let mut b = [0u8; 4];
            b.copy_from_slice(&raw[o..o + 4]);
            u32::from_be_bytes(b)
        };
        let name_raw = &raw[0x28..0x28 + NAME_LEN];
        let end = name_raw.iter().position(|&c| c == 0).unwrap_or(NAME_LEN);
        Self {
            vendor: be64(0x00),
            device: be32(0x08),
            version: be32(0x0C),
            base: be64(0x10),
            size: be64(0x18),
            next: be64(0x20),
            name: String::from_utf8_lossy(&name_raw[..end]).trim_end().to_owned(),
        }
    }
}

/// Walker over the directory of one target.
#[derive(Debug, Clone)]
pub struct Directory<T> {
    transport: T,
    root: u64,
}

impl<T: Transport> Directory<T> {
    /// Creates a walker rooted at `root`.
    pub const fn new(transport: T, root: u64) -> Self {
        Self { transport, root }
    }

    fn read_record(&self, addr: u64) -> Result<DeviceRecord, TransportError> {
        let mut words = [0u64; (RECORD_SIZE / 4) as usize];
        access::read(&self.transport, addr, &mut words, Format::BE32, AddrMode::Linear)?;
        let mut raw = [0u8; RECORD_SIZE as usize];
        for (chunk, word) in raw.chunks_exact_mut(4).zip(words) {
            chunk.copy_from_slice(&(word as u32).to_be_bytes());
        }
        Ok(DeviceRecord::decode(&raw))
    }

    /// Reads all records in list order.
    pub fn records(&self) -> Result<Vec<DeviceRecord>, TransportError> {
        let mut out = Vec::new();
        let mut addr = self.root;
        while addr != 0 && out.len() < MAX_RECORDS {
            let record = self.read_record(addr)?;
            addr = record.next;
            out.push(record);
        }
        Ok(out)
    }

    /// Returns the `index`-th record matching `(vendor, device)`.
    pub fn find(
        &self,
        vendor: u64,
        device: u32,
        index: usize,
    ) -> Result<Option<DeviceRecord>, TransportError> {
        let found = self
            .records()?
            .into_iter()
            .filter(|r| r.vendor == vendor && r.device == device)
            .nth(index);
        if found.is_none() {
            debug!(vendor, device, index, "device not in bus directory");
        }
        Ok(found)
    }

    /// Returns the base address of the `index`-th match, or [`ADDRESS_NOT_FOUND`].
    pub fn base_address(&self, vendor: u64, device: u32, index: usize) -> Result<u64, TransportError> {
        Ok(self
            .find(vendor, device, index)?
            .map_or(ADDRESS_NOT_FOUND, |r| r.base))
    }
}
