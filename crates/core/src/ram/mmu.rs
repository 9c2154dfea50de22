//! Shared-RAM partition table.
//!
//! A singly linked list of tagged, contiguous regions rooted at a fixed anchor
//! word. Firmware and host agree on the location of rings and logs by tag
//! without a dynamic allocator.
//!
//! Every item header occupies [`MMU_ITEMSIZE`] words:
//!
//! | word | content                                  |
//! |------|------------------------------------------|
//! | 0    | `magic << 32 \| tag << 16 \| flags`      |
//! | 1    | `next << 32 \| start` (word indices)     |
//! | 2    | `length` (payload words)                 |
//!
//! The anchor holds a sentinel header with tag 0 and length 0; user items follow
//! contiguously. Items are never freed; [`Mmu::clear`] drops all of them at once.

use thiserror::Error;
use tracing::{debug, info};

use super::{RamAccess, RamError};

/// Magic word of every header.
pub const MMU_MAGIC: u32 = 0x4D4D_5520;

/// Header size in 64-bit words.
pub const MMU_ITEMSIZE: u64 = 3;

/// Tag of the sentinel; not valid for user partitions.
pub const MMU_SENTINEL_TAG: u16 = 0;

/// Upper bound on walked items; a longer chain is reported as corrupt.
pub const MMU_MAX_ITEMS: usize = 1024;

/// Partition table failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MmuError {
    /// The tag is not in the table and creation was not requested.
    #[error("partition not found")]
    NotFound,
    /// The new partition does not fit into the RAM.
    #[error("partition table exhausted")]
    Exhausted,
    /// A header at the given word index is malformed.
    #[error("partition table corrupt at word {index}")]
    Corrupt {
        /// Word index of the bad header.
        index: u64,
    },
    /// Tag 0 is reserved for the sentinel.
    #[error("invalid partition tag")]
    InvalidTag,
    /// RAM access failure.
    #[error(transparent)]
    Ram(#[from] RamError),
}

/// Result kind of a successful allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocStatus {
    /// A new partition was appended.
    Created,
    /// The tag already existed; its region is returned unchanged.
    AlreadyPresent,
}

/// Region returned by [`Mmu::allocate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Allocation {
    /// Whether the partition was created.
    pub status: AllocStatus,
    /// First payload word index.
    pub start: u64,
    /// Payload length in words.
    pub length: u64,
}

/// One item of the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Partition {
    /// Word index of the header.
    pub header: u64,
    /// Partition tag.
    pub tag: u16,
    /// Partition flags.
    pub flags: u16,
    /// First payload word index.
    pub start: u64,
    /// Payload length in words.
    pub length: u64,
    /// Word index of the next header, 0 at the end.
    pub next: u64,
}

impl Partition {
    fn encode(&self) -> [u64; MMU_ITEMSIZE as usize] {
        [
            u64::from(MMU_MAGIC) << 32 | u64::from(self.tag) << 16 | u64::from(self.flags),
            self.next << 32 | (self.start & 0xFFFF_FFFF),
            self.length,
        ]
    }

    fn decode(header: u64, raw: &[u64; MMU_ITEMSIZE as usize]) -> Option<Self> {
        if (raw[0] >> 32) as u32 != MMU_MAGIC {
            return None;
        }
        Some(Self {
            header,
            tag: (raw[0] >> 16) as u16,
            flags: raw[0] as u16,
            start: raw[1] & 0xFFFF_FFFF,
            length: raw[2],
            next: raw[1] >> 32,
        })
    }

    /// Word index one past the payload.
    pub const fn end(&self) -> u64 {
        self.start + self.length
    }
}

/// Partition table over a shared RAM.
///
/// Concurrent creation by several writers is not supported; callers serialize.
#[derive(Debug, Clone)]
pub struct Mmu<R> {
    ram: R,
    anchor: u64,
}

impl<R: RamAccess> Mmu<R> {
    /// Creates a handle for the table anchored at word `anchor`.
    pub const fn new(ram: R, anchor: u64) -> Self {
        Self { ram, anchor }
    }

    /// Word index of the anchor.
    pub const fn anchor(&self) -> u64 {
        self.anchor
    }

    /// Returns the underlying RAM.
    pub const fn ram(&self) -> &R {
        &self.ram
    }

    fn read_item(&self, index: u64) -> Result<Option<Partition>, MmuError> {
        let mut raw = [0u64; MMU_ITEMSIZE as usize];
        self.ram.read64(index, &mut raw)?;
        Ok(Partition::decode(index, &raw))
    }

    fn write_item(&self, item: &Partition) -> Result<(), MmuError> {
        self.ram.write64(item.header, &item.encode())?;
        Ok(())
    }

    /// Returns whether the anchor carries the sentinel.
    pub fn is_present(&self) -> Result<bool, MmuError> {
        Ok(self
            .read_item(self.anchor)?
            .is_some_and(|s| s.tag == MMU_SENTINEL_TAG))
    }

    /// Writes an empty sentinel, dropping all partitions.
    pub fn clear(&self) -> Result<(), MmuError> {
        if self.anchor + MMU_ITEMSIZE > self.ram.capacity64() {
            return Err(MmuError::Exhausted);
        }
        info!(anchor = self.anchor, "partition table cleared");
        self.write_item(&Partition {
            header: self.anchor,
            tag: MMU_SENTINEL_TAG,
            flags: 0,
            start: self.anchor + MMU_ITEMSIZE,
            length: 0,
            next: 0,
        })
    }

    /// Walks the chain and returns every item, sentinel first.
    pub fn chain(&self) -> Result<Vec<Partition>, MmuError> {
        let mut items = Vec::new();
        let mut index = self.anchor;
        loop {
            let item = self
                .read_item(index)?
                .ok_or(MmuError::Corrupt { index })?;
            if items.is_empty() && item.tag != MMU_SENTINEL_TAG {
                return Err(MmuError::Corrupt { index });
            }
            let next = item.next;
            if item.start != index + MMU_ITEMSIZE {
                return Err(MmuError::Corrupt { index });
            }
            items.push(item);
            if next == 0 {
                break;
            }
            if next < item.end() || items.len() >= MMU_MAX_ITEMS {
                return Err(MmuError::Corrupt { index });
            }
            index = next;
        }
        Ok(items)
    }

    /// Lists the user partitions in chain order.
    pub fn partitions(&self) -> Result<Vec<Partition>, MmuError> {
        if !self.is_present()? {
            return Ok(Vec::new());
        }
        let mut chain = self.chain()?;
        let _sentinel = chain.remove(0);
        Ok(chain)
    }

    /// Finds the partition `tag`.
    pub fn find(&self, tag: u16) -> Result<Allocation, MmuError> {
        self.allocate(tag, 0, false)
    }

    /// Allocate-or-find by tag.
    ///
    /// # Arguments
    ///
    /// * `tag` - Partition tag, non-zero.
    /// * `length` - Payload words of a new partition; ignored if the tag exists.
    /// * `create` - Append a new partition if the tag is absent.
    ///
    /// # Returns
    ///
    /// The region of the partition. An existing partition is never resized.
    /// On [`MmuError::Exhausted`] the table is left unmodified.
    pub fn allocate(&self, tag: u16, length: u64, create: bool) -> Result<Allocation, MmuError> {
        if tag == MMU_SENTINEL_TAG {
            return Err(MmuError::InvalidTag);
        }
        if !self.is_present()? {
            if !create {
                return Err(MmuError::NotFound);
            }
            self.clear()?;
        }
        let chain = self.chain()?;
        if let Some(found) = chain.iter().skip(1).find(|p| p.tag == tag) {
            return Ok(Allocation {
                status: AllocStatus::AlreadyPresent,
                start: found.start,
                length: found.length,
            });
        }
        if !create {
            return Err(MmuError::NotFound);
        }
        let Some(mut last) = chain.last().copied() else {
            return Err(MmuError::Corrupt { index: self.anchor });
        };
        let header = last.end();
        let start = header + MMU_ITEMSIZE;
        let end = start.checked_add(length).ok_or(MmuError::Exhausted)?;
        if end > self.ram.capacity64() || end > u64::from(u32::MAX) {
            debug!(tag, length, "partition does not fit");
            return Err(MmuError::Exhausted);
        }
        // New header first; linking it in publishes the item.
        self.write_item(&Partition {
            header,
            tag,
            flags: 0,
            start,
            length,
            next: 0,
        })?;
        last.next = header;
        self.write_item(&last)?;
        info!(tag, start, length, "partition created");
        Ok(Allocation {
            status: AllocStatus::Created,
            start,
            length,
        })
    }
}
