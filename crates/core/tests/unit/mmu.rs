//! # Partition Table Tests
//!
//! Allocate-or-find semantics, exhaustion and chain well-formedness.

use std::collections::HashSet;

use pretty_assertions::assert_eq;
use proptest::prelude::*;
use scu_core::ram::mmu::{MMU_ITEMSIZE, MMU_MAGIC};
use scu_core::ram::{AllocStatus, Allocation, Mmu, MmuError, RamAccess};

use crate::common::mocks::MemRam;

const ANCHOR: u64 = 16;

#[test]
fn test_allocate_is_idempotent_and_never_resizes() {
    let ram = MemRam::new(4096);
    let mmu = Mmu::new(ram, ANCHOR);
    let start = ANCHOR + 2 * MMU_ITEMSIZE;

    let created = mmu.allocate(7, 16, true).unwrap();
    assert_eq!(
        created,
        Allocation {
            status: AllocStatus::Created,
            start,
            length: 16
        }
    );

    let found = mmu.allocate(7, 16, false).unwrap();
    assert_eq!(found.status, AllocStatus::AlreadyPresent);
    assert_eq!((found.start, found.length), (start, 16));

    let again = mmu.allocate(7, 32, true).unwrap();
    assert_eq!(again.status, AllocStatus::AlreadyPresent);
    assert_eq!(again.length, 16);
    assert_eq!(mmu.partitions().unwrap().len(), 1);
}

#[test]
fn test_find_on_empty_ram() {
    let mmu = Mmu::new(MemRam::new(64), 0);
    assert!(!mmu.is_present().unwrap());
    assert_eq!(mmu.find(3), Err(MmuError::NotFound));
    assert!(mmu.partitions().unwrap().is_empty());
}

#[test]
fn test_sentinel_tag_is_rejected() {
    let mmu = Mmu::new(MemRam::new(64), 0);
    assert_eq!(mmu.allocate(0, 4, true), Err(MmuError::InvalidTag));
}

#[test]
fn test_exhausted_allocation_leaves_table_unmodified() {
    let ram = MemRam::new(128);
    let mmu = Mmu::new(ram.clone(), 0);
    let _ = mmu.allocate(1, 40, true).unwrap();
    let before = ram.snapshot();

    assert_eq!(mmu.allocate(2, 100, true), Err(MmuError::Exhausted));
    assert_eq!(ram.snapshot(), before);

    // the remaining space is still usable
    let fits = 128 - (2 * MMU_ITEMSIZE + 40) - MMU_ITEMSIZE;
    let last = mmu.allocate(2, fits, true).unwrap();
    assert_eq!(last.start + last.length, 128);
}

#[test]
fn test_headers_carry_magic_and_links() {
    let ram = MemRam::new(256);
    let mmu = Mmu::new(ram.clone(), 0);
    let a = mmu.allocate(0xA, 8, true).unwrap();
    let b = mmu.allocate(0xB, 4, true).unwrap();
    assert_eq!(b.start, a.start + a.length + MMU_ITEMSIZE);

    let words = ram.snapshot();
    let header_b = b.start - MMU_ITEMSIZE;
    assert_eq!((words[header_b as usize] >> 32) as u32, MMU_MAGIC);
    assert_eq!((words[header_b as usize] >> 16) as u16, 0xB);

    let chain = mmu.chain().unwrap();
    let tags: Vec<u16> = chain.iter().map(|p| p.tag).collect();
    assert_eq!(tags, vec![0, 0xA, 0xB]);
    assert_eq!(chain[2].next, 0);
}

#[test]
fn test_clear_drops_partitions() {
    let mmu = Mmu::new(MemRam::new(256), 0);
    let _ = mmu.allocate(5, 8, true).unwrap();
    mmu.clear().unwrap();
    assert!(mmu.is_present().unwrap());
    assert_eq!(mmu.find(5), Err(MmuError::NotFound));
}

#[test]
fn test_corrupt_link_is_reported() {
    let ram = MemRam::new(256);
    let mmu = Mmu::new(ram.clone(), 0);
    let _ = mmu.allocate(5, 8, true).unwrap();
    // link the sentinel to a header inside itself
    let first_payload = MMU_ITEMSIZE;
    ram.write64(1, &[1 << 32 | first_payload]).unwrap();
    assert!(matches!(mmu.chain(), Err(MmuError::Corrupt { .. })));
}

proptest! {
    #[test]
    fn prop_chain_stays_well_formed(requests in prop::collection::vec((1u16..20, 0u64..200), 1..30)) {
        let capacity = 2048u64;
        let mmu = Mmu::new(MemRam::new(capacity as usize), 0);
        for (tag, len) in requests {
            match mmu.allocate(tag, len, true) {
                Ok(_) | Err(MmuError::Exhausted) => {}
                Err(e) => prop_assert!(false, "unexpected error {e}"),
            }
        }

        let chain = mmu.chain().unwrap();
        let headers: Vec<u64> = chain.iter().map(|p| p.header).collect();
        prop_assert!(headers.windows(2).all(|w| w[0] < w[1]));
        prop_assert_eq!(chain.last().map(|p| p.next), Some(0));

        let tags: HashSet<u16> = chain.iter().skip(1).map(|p| p.tag).collect();
        prop_assert_eq!(tags.len(), chain.len() - 1);

        let used: u64 = chain.iter().map(|p| MMU_ITEMSIZE + p.length).sum();
        prop_assert!(used <= capacity);
    }

    #[test]
    fn prop_create_then_find_agree(tag in 1u16..u16::MAX, len in 0u64..512) {
        let mmu = Mmu::new(MemRam::new(1024), 8);
        let created = mmu.allocate(tag, len, true).unwrap();
        let found = mmu.find(tag).unwrap();
        prop_assert_eq!(found.status, AllocStatus::AlreadyPresent);
        prop_assert_eq!((found.start, found.length), (created.start, created.length));
    }
}
