//! Byte-addressed big-endian memories: the LM32 shared RAM and the directory ROM.

use crate::directory::{DeviceRecord, RECORD_SIZE};
use crate::soc::traits::Device;

/// Big-endian byte memory, optionally read-only.
#[derive(Debug)]
pub struct ByteMemory {
    name: &'static str,
    base: u64,
    bytes: Vec<u8>,
    writable: bool,
}

impl ByteMemory {
    /// LM32 shared RAM of `size` bytes at `base`.
    pub fn shared_ram(base: u64, size: usize) -> Self {
        Self {
            name: "LM32_RAM",
            base,
            bytes: vec![0; size],
            writable: true,
        }
    }

    /// Directory ROM at `root` holding `records`, chained in the given order.
    ///
    /// The `next` field of each record is filled in; the last one terminates the chain.
    pub fn directory_rom(root: u64, records: &[DeviceRecord]) -> Self {
        let mut bytes = Vec::with_capacity(records.len().max(1) * RECORD_SIZE as usize);
        for (i, record) in records.iter().enumerate() {
            let mut record = record.clone();
            record.next = if i + 1 < records.len() { root + (i as u64 + 1) * RECORD_SIZE } else { 0 };
            bytes.extend_from_slice(&record.encode());
        }
        if bytes.is_empty() {
            bytes.resize(RECORD_SIZE as usize, 0);
        }
        Self {
            name: "SDB_ROM",
            base: root,
            bytes,
            writable: false,
        }
    }

    fn get<const N: usize>(&self, offset: u64) -> [u8; N] {
        let start = offset as usize;
        self.bytes
            .get(start..start + N)
            .and_then(|s| s.try_into().ok())
            .unwrap_or([0; N])
    }

    fn put(&mut self, offset: u64, data: &[u8]) {
        if !self.writable {
            return;
        }
        let start = offset as usize;
        if let Some(dst) = self.bytes.get_mut(start..start + data.len()) {
            dst.copy_from_slice(data);
        }
    }
}

impl Device for ByteMemory {
    fn name(&self) -> &str {
        self.name
    }

    fn address_range(&self) -> (u64, u64) {
        (self.base, self.bytes.len() as u64)
    }

    fn read_u8(&mut self, offset: u64) -> u8 {
        self.get::<1>(offset)[0]
    }

    fn read_u16(&mut self, offset: u64) -> u16 {
        u16::from_be_bytes(self.get(offset))
    }

    fn read_u32(&mut self, offset: u64) -> u32 {
        u32::from_be_bytes(self.get(offset))
    }

    fn read_u64(&mut self, offset: u64) -> u64 {
        u64::from_be_bytes(self.get(offset))
    }

    fn write_u8(&mut self, offset: u64, val: u8) {
        self.put(offset, &[val]);
    }

    fn write_u16(&mut self, offset: u64, val: u16) {
        self.put(offset, &val.to_be_bytes());
    }

    fn write_u32(&mut self, offset: u64, val: u32) {
        self.put(offset, &val.to_be_bytes());
    }

    fn write_u64(&mut self, offset: u64, val: u64) {
        self.put(offset, &val.to_be_bytes());
    }
}
