//! # Register Access Tests
//!
//! Chunking of long accesses, address modes, byte order and the DDR3 half order.

use pretty_assertions::assert_eq;
use rstest::rstest;
use scu_core::access::{self, BusOp, OpKind, TransportExt};
use scu_core::common::{AddrMode, Format, TransportError, Width};

use crate::common::mocks::{MockLink, recording_link};

#[test]
fn test_read_is_split_into_cycles_of_max_ops() {
    let (link, log) = recording_link(4);
    let mut out = [0u64; 10];
    access::read(&link, 0x100, &mut out, Format::BE16, AddrMode::Linear).unwrap();

    let sizes: Vec<usize> = log.cycles().iter().map(Vec::len).collect();
    assert_eq!(sizes, vec![4, 4, 2]);
    let expected: Vec<u64> = (0..10).map(|i| 0x100 + i * 2).collect();
    assert_eq!(out.to_vec(), expected);
}

#[test]
fn test_cycle_length_is_clamped() {
    let (link, log) = recording_link(0);
    let data = [1u64, 2, 3];
    access::write(&link, 0, &data, Format::BE32, AddrMode::Frozen).unwrap();
    assert_eq!(log.cycles().len(), 3);

    let (link, log) = recording_link(10_000);
    let data = vec![0u64; 600];
    access::write(&link, 0, &data, Format::B8, AddrMode::Linear).unwrap();
    let sizes: Vec<usize> = log.cycles().iter().map(Vec::len).collect();
    assert_eq!(sizes, vec![255, 255, 90]);
}

#[rstest]
#[case::linear(AddrMode::Linear, vec![0x40, 0x44, 0x48, 0x4C])]
#[case::frozen(AddrMode::Frozen, vec![0x40, 0x40, 0x40, 0x40])]
#[case::toggle(AddrMode::Toggle64, vec![0x40, 0x44, 0x40, 0x44])]
fn test_address_modes(#[case] mode: AddrMode, #[case] expected: Vec<u64>) {
    let (link, log) = recording_link(255);
    access::write(&link, 0x40, &[1, 2, 3, 4], Format::BE32, mode).unwrap();
    let addrs: Vec<u64> = log.ops().iter().map(|op| op.addr).collect();
    assert_eq!(addrs, expected);
}

#[test]
fn test_little_endian_elements_are_swapped_on_the_bus() {
    let (link, log) = recording_link(255);
    access::write(&link, 0, &[0x1234, 0xAABB_CCDD], Format::LE16, AddrMode::Linear).unwrap();
    let values: Vec<u64> = log.ops().iter().map(|op| op.value).collect();
    // values wider than the element are truncated first
    assert_eq!(values, vec![0x3412, 0xDDCC]);
}

#[test]
fn test_ddr3_write_sends_high_half_first() {
    let (link, log) = recording_link(255);
    access::ddr3_write(&link, 0x2000_0000, &[0x1111_2222_3333_4444, 0x5555_6666_7777_8888], AddrMode::Linear)
        .unwrap();

    let ops = log.ops();
    let expected = vec![
        BusOp::write(0x2000_0000, Width::U32, 0x1111_2222),
        BusOp::write(0x2000_0004, Width::U32, 0x3333_4444),
        BusOp::write(0x2000_0008, Width::U32, 0x5555_6666),
        BusOp::write(0x2000_000C, Width::U32, 0x7777_8888),
    ];
    assert_eq!(ops, expected);
}

#[test]
fn test_ddr3_halves_never_straddle_cycles() {
    let (link, log) = recording_link(5);
    access::ddr3_write(&link, 0, &[1, 2, 3, 4, 5], AddrMode::Linear).unwrap();
    for cycle in log.cycles() {
        assert_eq!(cycle.len() % 2, 0, "cycle split a word: {cycle:?}");
        assert!(cycle.len() <= 5);
    }
    assert_eq!(log.ops().len(), 10);
}

#[rstest]
#[case::frozen(AddrMode::Frozen)]
#[case::toggle64(AddrMode::Toggle64)]
fn test_ddr3_non_linear_modes_keep_the_word_address(#[case] mode: AddrMode) {
    let (link, log) = recording_link(255);
    access::ddr3_write(&link, 0x2000_0040, &[1, 2, 3], mode).unwrap();
    let addrs: Vec<u64> = log.ops().iter().map(|op| op.addr).collect();
    assert_eq!(addrs, [0x2000_0040u64, 0x2000_0044].repeat(3));
}

#[test]
fn test_ddr3_read_latches_low_half_first() {
    let (link, log) = recording_link(255);
    let mut out = [0u64; 1];
    access::ddr3_read(&link, 0x2000_0010, &mut out, AddrMode::Linear).unwrap();

    let ops = log.ops();
    assert_eq!(ops[0].addr, 0x2000_0014);
    assert_eq!(ops[1].addr, 0x2000_0010);
    assert!(ops.iter().all(|op| op.kind == OpKind::Read));
    // the recording link answers with the address
    assert_eq!(out[0], 0x2000_0010_u64 << 32 | 0x2000_0014);
}

#[test]
fn test_transport_error_is_propagated() {
    let mut link = MockLink::new();
    let _ = link.expect_max_cycle_ops().return_const(255usize);
    let _ = link
        .expect_cycle()
        .times(1)
        .returning(|ops| Err(TransportError::BusError { addr: ops[0].addr }));

    let err = link.read_u32(0xDEAD_0000).unwrap_err();
    assert_eq!(err, TransportError::BusError { addr: 0xDEAD_0000 });
}

#[test]
fn test_modify_u16_clears_then_sets() {
    let mut link = MockLink::new();
    let mut seq = mockall::Sequence::new();
    let _ = link
        .expect_cycle()
        .withf(|ops| ops.len() == 1 && ops[0].kind == OpKind::Read)
        .times(1)
        .in_sequence(&mut seq)
        .returning(|ops| {
            ops[0].value = 0b1010_1010;
            Ok(())
        });
    let _ = link
        .expect_cycle()
        .withf(|ops| ops[0].kind == OpKind::Write && ops[0].value == 0b1010_0101)
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_| Ok(()));

    let value = link.modify_u16(0x10, 0b0000_1111, 0b0000_0101).unwrap();
    assert_eq!(value, 0b1010_0101);
}
