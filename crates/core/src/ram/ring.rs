//! Ring buffer admin in a shared-RAM partition.
//!
//! The partition starts with three admin words followed by the ring payload:
//!
//! | word | content                        | writer   |
//! |------|--------------------------------|----------|
//! | 0    | `offset << 32 \| capacity`     | init     |
//! | 1    | `start << 32 \| end`           | producer |
//! | 2    | `was_read << 32`               | consumer |
//!
//! All indices are in 64-bit words; `offset` is the absolute word index of the
//! payload. `end == capacity` marks a full ring. The consumer never writes
//! `start`: it posts the number of consumed words in `was_read`, and the producer
//! folds it into `start` before each step. Every admin word thus has one writer.

use std::sync::atomic::{Ordering, fence};

use tracing::{debug, trace};

use super::mmu::{AllocStatus, Mmu, MmuError};
use super::{RamAccess, RamError};

/// Admin words in front of the payload.
pub const RING_ADMIN_WORDS: u64 = 3;

/// Ring indices.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RingIndexes {
    /// Absolute word index of the payload.
    pub offset: u32,
    /// Payload capacity in words.
    pub capacity: u32,
    /// Read index.
    pub start: u32,
    /// Write index, or `capacity` when full.
    pub end: u32,
}

impl RingIndexes {
    /// Creates an empty ring.
    pub const fn new(offset: u32, capacity: u32) -> Self {
        Self {
            offset,
            capacity,
            start: 0,
            end: 0,
        }
    }

    /// Returns `true` if the full marker is set.
    pub const fn is_full(&self) -> bool {
        self.capacity != 0 && self.end == self.capacity
    }

    /// Returns `true` if nothing is readable.
    pub const fn is_empty(&self) -> bool {
        self.end == self.start
    }

    /// Readable words.
    pub const fn size(&self) -> u32 {
        if self.is_full() {
            self.capacity
        } else if self.end >= self.start {
            self.end - self.start
        } else {
            self.capacity - self.start + self.end
        }
    }

    /// Writable words.
    pub const fn free(&self) -> u32 {
        self.capacity - self.size()
    }

    /// Readable words without wrapping.
    pub const fn upper_read_size(&self) -> u32 {
        if self.is_full() || self.end < self.start {
            self.capacity - self.start
        } else {
            self.end - self.start
        }
    }

    /// Writable words without wrapping.
    pub const fn upper_write_size(&self) -> u32 {
        if self.is_full() {
            0
        } else if self.end >= self.start {
            self.capacity - self.end
        } else {
            self.start - self.end
        }
    }

    /// Absolute word index of the read position.
    pub const fn read_index(&self) -> u64 {
        self.offset as u64 + self.start as u64
    }

    /// Absolute word index of the write position.
    pub const fn write_index(&self) -> u64 {
        if self.is_full() {
            self.offset as u64 + self.start as u64
        } else {
            self.offset as u64 + self.end as u64
        }
    }

    /// Advances the write index by `n` words; sets the full marker when it meets `start`.
    pub const fn add_to_write_index(&mut self, n: u32) {
        if n == 0 || self.capacity == 0 {
            return;
        }
        let end = if self.is_full() { self.start } else { self.end };
        let next = ((end as u64 + n as u64) % self.capacity as u64) as u32;
        self.end = if next == self.start { self.capacity } else { next };
    }

    /// Advances the read index by `n` words, clearing the full marker first.
    pub const fn add_to_read_index(&mut self, n: u32) {
        if n == 0 || self.capacity == 0 {
            return;
        }
        if self.is_full() {
            self.end = self.start;
        }
        self.start = ((self.start as u64 + n as u64) % self.capacity as u64) as u32;
    }

    fn admin_words(&self) -> [u64; 2] {
        [
            u64::from(self.offset) << 32 | u64::from(self.capacity),
            u64::from(self.start) << 32 | u64::from(self.end),
        ]
    }
}

/// Decoded admin block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RingAdmin {
    /// Indices.
    pub indexes: RingIndexes,
    /// Words consumed by the host and not yet folded into `start`.
    pub was_read: u32,
}

impl RingAdmin {
    fn decode(raw: &[u64; RING_ADMIN_WORDS as usize]) -> Self {
        Self {
            indexes: RingIndexes {
                offset: (raw[0] >> 32) as u32,
                capacity: raw[0] as u32,
                start: (raw[1] >> 32) as u32,
                end: raw[1] as u32,
            },
            was_read: (raw[2] >> 32) as u32,
        }
    }
}

/// Ring buffer kept in one partition of a shared RAM.
#[derive(Debug, Clone)]
pub struct SharedRing<R> {
    ram: R,
    admin: u64,
}

impl<R: RamAccess> SharedRing<R> {
    /// Finds or creates the ring partition `tag` with `capacity` payload words.
    ///
    /// A newly created ring is initialized empty. An existing ring keeps its indices.
    pub fn create(mmu: &Mmu<R>, tag: u16, capacity: u32) -> Result<Self, MmuError>
    where
        R: Clone,
    {
        let alloc = mmu.allocate(tag, RING_ADMIN_WORDS + u64::from(capacity), true)?;
        let ring = Self {
            ram: mmu.ram().clone(),
            admin: alloc.start,
        };
        if alloc.status == AllocStatus::Created {
            ring.initialize(capacity)?;
        } else if alloc.length < RING_ADMIN_WORDS {
            return Err(MmuError::Corrupt { index: alloc.start });
        }
        Ok(ring)
    }

    /// Attaches to the existing ring partition `tag`.
    pub fn open(mmu: &Mmu<R>, tag: u16) -> Result<Self, MmuError>
    where
        R: Clone,
    {
        let alloc = mmu.find(tag)?;
        if alloc.length < RING_ADMIN_WORDS {
            return Err(MmuError::Corrupt { index: alloc.start });
        }
        Ok(Self {
            ram: mmu.ram().clone(),
            admin: alloc.start,
        })
    }

    /// Attaches to a ring whose admin block is at word `admin`.
    pub const fn attach(ram: R, admin: u64) -> Self {
        Self { ram, admin }
    }

    /// Word index of the admin block.
    pub const fn admin_index(&self) -> u64 {
        self.admin
    }

    /// Resets the ring to empty with `capacity` payload words.
    pub fn initialize(&self, capacity: u32) -> Result<(), RamError> {
        let offset = self.admin + RING_ADMIN_WORDS;
        let indexes = RingIndexes::new(offset as u32, capacity);
        let [w0, w1] = indexes.admin_words();
        self.ram.write64(self.admin, &[w0, w1, 0])?;
        debug!(offset, capacity, "ring initialized");
        Ok(())
    }

    /// Reads the admin block.
    pub fn admin(&self) -> Result<RingAdmin, RamError> {
        let mut raw = [0u64; RING_ADMIN_WORDS as usize];
        self.ram.read64(self.admin, &mut raw)?;
        Ok(RingAdmin::decode(&raw))
    }

    fn write_indexes(&self, indexes: &RingIndexes) -> Result<(), RamError> {
        self.ram.write64(self.admin + 1, &indexes.admin_words()[1..])
    }

    // ═══════════════════════════════════════════════════════════════════
    // Producer side
    // ═══════════════════════════════════════════════════════════════════

    /// Folds the consumer's acknowledge into `start` and returns the indices.
    pub fn synchronize(&self) -> Result<RingIndexes, RamError> {
        let admin = self.admin()?;
        let mut indexes = admin.indexes;
        if admin.was_read != 0 {
            indexes.add_to_read_index(admin.was_read.min(indexes.size()));
            self.write_indexes(&indexes)?;
            self.ram.write64(self.admin + 2, &[0])?;
            trace!(was_read = admin.was_read, start = indexes.start, "ring synchronized");
        }
        Ok(indexes)
    }

    /// Appends `words` as one unit, wrapping at the end of the payload.
    ///
    /// # Returns
    ///
    /// `false` without touching the ring if fewer than `words.len()` words are free.
    pub fn push(&self, words: &[u64]) -> Result<bool, RamError> {
        let mut indexes = self.synchronize()?;
        let len = words.len() as u32;
        if words.len() > u32::MAX as usize || len > indexes.free() {
            return Ok(false);
        }
        if len == 0 {
            return Ok(true);
        }
        let first = (indexes.upper_write_size() as usize).min(words.len());
        self.ram.write64(indexes.write_index(), &words[..first])?;
        if first < words.len() {
            self.ram.write64(u64::from(indexes.offset), &words[first..])?;
        }
        fence(Ordering::Release);
        indexes.add_to_write_index(len);
        self.write_indexes(&indexes)?;
        Ok(true)
    }

    // ═══════════════════════════════════════════════════════════════════
    // Consumer side
    // ═══════════════════════════════════════════════════════════════════

    /// Returns the indices for a consumer poll.
    ///
    /// `None` while the previous acknowledge has not been folded in by the producer.
    pub fn poll(&self) -> Result<Option<RingIndexes>, RamError> {
        let admin = self.admin()?;
        fence(Ordering::Acquire);
        if admin.was_read != 0 {
            return Ok(None);
        }
        Ok(Some(admin.indexes))
    }

    /// Reads `out.len()` words from the read position of `indexes`, wrapping.
    pub fn read(&self, indexes: &RingIndexes, out: &mut [u64]) -> Result<(), RamError> {
        let n = out.len().min(indexes.size() as usize);
        let first = (indexes.upper_read_size() as usize).min(n);
        self.ram.read64(indexes.read_index(), &mut out[..first])?;
        if first < n {
            self.ram.read64(u64::from(indexes.offset), &mut out[first..n])?;
        }
        Ok(())
    }

    /// Acknowledges `n` consumed words.
    pub fn acknowledge(&self, n: u32) -> Result<(), RamError> {
        self.ram.write64(self.admin + 2, &[u64::from(n) << 32])
    }
}
