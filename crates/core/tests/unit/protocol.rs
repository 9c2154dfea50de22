//! # Wire Format Tests
//!
//! Opcodes and arguments, DAQ block framing and the FG records.

use pretty_assertions::assert_eq;
use rstest::rstest;
use scu_core::common::constants::{DAQ_DESCRIPTOR_WORD_SIZE, DAQ_FIFO_DAQ_WORD_SIZE};
use scu_core::common::{ChannelId, Slot};
use scu_core::protocol::daq_block::{BLOCK_TAG_LONG, BLOCK_TAG_SHORT, DESCRIPTOR_WORDS64, payload_crc};
use scu_core::protocol::{
    BlockError, BlockKind, ChannelReg, DaqArg, DaqBlock, DaqMode, Descriptor, FgState, Opcode, PolynomialParams,
};

#[rstest]
#[case(0x01, Some(Opcode::ResetChannel))]
#[case(0x02, Some(Opcode::EnableChannel))]
#[case(0x05, Some(Opcode::Rescan))]
#[case(0x10, Some(Opcode::DaqContinuousOn))]
#[case(0x16, Some(Opcode::DaqTriggerEnable))]
#[case(0x00, None)]
#[case(0x08, None)]
#[case(0x17, None)]
fn test_opcode_from_raw(#[case] raw: u32, #[case] expected: Option<Opcode>) {
    assert_eq!(Opcode::try_from(raw).ok(), expected);
}

#[test]
fn test_opcode_classes() {
    let channel: Vec<Opcode> = Opcode::ALL.into_iter().filter(|op| op.takes_channel()).collect();
    assert_eq!(
        channel,
        vec![Opcode::ResetChannel, Opcode::EnableChannel, Opcode::DisableChannel]
    );
    assert_eq!(Opcode::ALL.into_iter().filter(|op| op.is_daq()).count(), 7);
    assert_eq!(Opcode::DaqPostMortemOn.to_string(), "DAQ_POST_MORTEM_ON");
}

#[test]
fn test_daq_arg_layout() {
    let channel = ChannelId::new(Slot::new(5).unwrap(), 3).unwrap();
    let arg = DaqArg { channel, value: 0xBEEF };
    assert_eq!(arg.encode(), 0x0503_BEEF);
    assert_eq!(DaqArg::decode(0x0503_BEEF), Some(arg));
}

#[rstest]
#[case::slot_zero(0x0001_0000)]
#[case::slot_thirteen(0x0D01_0000)]
#[case::channel_zero(0x0500_0000)]
#[case::channel_five(0x0505_0000)]
fn test_daq_arg_rejects_bad_address(#[case] raw: u32) {
    assert_eq!(DaqArg::decode(raw), None);
}

#[test]
fn test_continuous_rates() {
    assert_eq!(DaqMode::continuous(2), Some(DaqMode::Continuous10us));
    assert_eq!(DaqMode::continuous(3), None);
    assert_eq!(DaqMode::HiRes.block_kind(), BlockKind::Long);
    assert_eq!(DaqMode::from_selector(0b110), Some(DaqMode::Continuous100us));
}

fn short_block(sequence: u16) -> DaqBlock {
    let payload: Vec<u16> = (0..DAQ_FIFO_DAQ_WORD_SIZE as u16).map(|i| i.wrapping_mul(7)).collect();
    DaqBlock {
        kind: BlockKind::Short,
        descriptor: Descriptor {
            slot: 4,
            channel: 2,
            mode: DaqMode::Continuous1ms.selector(),
            trigger: 0x0012_3456,
            timestamp: 0x0102_0304_0506_0708,
            sequence,
            crc: payload_crc(&payload),
        },
        payload,
    }
}

#[test]
fn test_block_framing() {
    let block = short_block(9);
    let words = block.encode();
    assert_eq!(words.len(), BlockKind::Short.ring_words());
    assert_eq!(words[0] >> 48, u64::from(BLOCK_TAG_SHORT));
    assert_eq!(words[0] & 0xFFFF_FFFF, (125 + DESCRIPTOR_WORDS64) as u64);

    let mut stream = words.clone();
    stream.extend(short_block(10).encode());
    let (first, used) = DaqBlock::decode(&stream).unwrap();
    assert_eq!(first, block);
    assert!(first.crc_ok());
    let (second, _) = DaqBlock::decode(&stream[used..]).unwrap();
    assert_eq!(second.descriptor.sequence, 10);
}

#[test]
fn test_block_decode_errors() {
    let words = short_block(1).encode();
    assert_eq!(
        DaqBlock::decode(&words[..40]),
        Err(BlockError::Truncated { need: words.len(), have: 40 })
    );
    assert_eq!(DaqBlock::decode(&[]), Err(BlockError::Truncated { need: 1, have: 0 }));
    assert_eq!(DaqBlock::decode(&[0xABCD << 48 | 5]), Err(BlockError::UnknownTag(0xABCD)));
    assert_eq!(
        DaqBlock::decode(&[u64::from(BLOCK_TAG_LONG) << 48 | 128]),
        Err(BlockError::BadLength {
            tag: BLOCK_TAG_LONG,
            length: 128
        })
    );
}

#[test]
fn test_corrupted_payload_fails_crc() {
    let mut words = short_block(1).encode();
    words[3] ^= 1;
    let (block, _) = DaqBlock::decode(&words).unwrap();
    assert!(!block.crc_ok());
}

#[test]
fn test_block_from_fifo_drain() {
    let block = short_block(3);
    let mut fifo = block.payload.clone();
    fifo.extend(block.descriptor.to_words());
    assert_eq!(DaqBlock::from_fifo(BlockKind::Short, &fifo), Some(block));
    assert_eq!(DaqBlock::from_fifo(BlockKind::Long, &fifo), None);
    assert_eq!(fifo.len(), DAQ_FIFO_DAQ_WORD_SIZE + DAQ_DESCRIPTOR_WORD_SIZE);
}

#[rstest]
#[case(0, 0, 0)]
#[case(5, 2, 3)]
#[case(1, 1023, 2)]
#[case(1023, 0, 1023)]
fn test_pending_parameter_sets(#[case] write: u32, #[case] read: u32, #[case] pending: u32) {
    let reg = ChannelReg {
        write_index: write,
        read_index: read,
        ..ChannelReg::default()
    };
    assert_eq!(reg.pending(1024), pending);
}

#[test]
fn test_channel_register_defaults() {
    let reg = ChannelReg::default();
    assert_eq!(reg.macro_index, -1);
    assert_eq!(reg.state, FgState::Idle);
    let mut words = reg.to_words();
    words[2] = 9;
    assert_eq!(ChannelReg::from_words(&words).state, FgState::Idle);
}

#[test]
fn test_polynomial_register_bits() {
    let p = PolynomialParams {
        coeff_a: -2,
        coeff_b: 3,
        shift_a: 0x41,
        shift_b: 2,
        coeff_c: -100,
        step: 5,
        freq: 6,
    };
    assert_eq!(p.shift_reg(), 0x01 | 2 << 6);
    assert_eq!(p.control_bits(), 5 << 4 | 6 << 7);
    let back = PolynomialParams::from_words(p.to_words());
    assert_eq!((back.coeff_a, back.coeff_c, back.shift_a), (-2, -100, 0x01));
}
