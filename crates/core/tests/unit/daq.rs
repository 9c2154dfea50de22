//! # DAQ Assembler Tests
//!
//! Blocks from the simulated DAQ cards into the shared ring: emission, descriptor
//! checks, spurious interrupts and producer drops.

use std::sync::atomic::Ordering;

use pretty_assertions::assert_eq;
use scu_core::common::constants::PEND_DAQ_FIFO_FULL;
use scu_core::common::{ChannelId, Slot};
use scu_core::protocol::daq_block::DaqBlock;
use scu_core::protocol::slave::daq::CTRL_HIRES;
use scu_core::protocol::{BlockKind, Counter, DaqArg, DaqMode, Opcode};
use scu_core::soc::devices::SlaveCard;

use crate::common::harness::{TestContext, test_config};

const SLOT: u8 = 5;

fn daq_arg(channel: u8, value: u16) -> u32 {
    let slot = Slot::new(SLOT).unwrap();
    DaqArg {
        channel: ChannelId::new(slot, channel).unwrap(),
        value,
    }
    .encode()
}

/// Reads and acknowledges everything in the ring.
fn drain_ring(ctx: &TestContext) -> Vec<DaqBlock> {
    let daq = ctx.sim.app.context().daq.lock().unwrap();
    let ring = daq.ring().unwrap();
    let Some(idx) = ring.poll().unwrap() else {
        return Vec::new();
    };
    let mut words = vec![0u64; idx.size() as usize];
    ring.read(&idx, &mut words).unwrap();
    ring.acknowledge(idx.size()).unwrap();

    let mut blocks = Vec::new();
    let mut at = 0;
    while at < words.len() {
        let (block, used) = DaqBlock::decode(&words[at..]).unwrap();
        blocks.push(block);
        at += used;
    }
    blocks
}

fn counter(ctx: &TestContext, counter: Counter) -> u32 {
    ctx.shared().counter(counter).unwrap()
}

#[test]
fn test_continuous_blocks_reach_the_ring() {
    let mut ctx = TestContext::new(vec![(SLOT, SlaveCard::daq(1))]);
    ctx.command(Opcode::DaqContinuousOn, daq_arg(1, 2));
    ctx.run(10);

    let blocks = drain_ring(&ctx);
    assert!(blocks.len() >= 10, "only {} blocks", blocks.len());
    for pair in blocks.windows(2) {
        assert_eq!(pair[1].descriptor.sequence, pair[0].descriptor.sequence.wrapping_add(1));
    }
    for block in &blocks {
        assert_eq!(block.kind, BlockKind::Short);
        assert_eq!((block.descriptor.slot, block.descriptor.channel), (SLOT, 1));
        assert_eq!(block.descriptor.mode, DaqMode::Continuous10us.selector());
        assert!(block.crc_ok());
    }
    assert_eq!(counter(&ctx, Counter::DaqBlocks) as usize, blocks.len());
}

#[test]
fn test_descriptor_mismatch_drops_block() {
    let mut ctx = TestContext::new(vec![(SLOT, SlaveCard::daq(1))]);
    ctx.command(Opcode::DaqContinuousOn, daq_arg(3, 2));
    ctx.run(2);
    let before = drain_ring(&ctx);
    let last = before.last().unwrap().descriptor.sequence;

    let _ = ctx.sim.soc.with_backplane(|bp| {
        if let Some(unit) = bp.card_mut(SLOT).and_then(|c| c.daq_unit_mut()) {
            unit.forge_next_origin(3, SLOT, 2);
        }
    });
    ctx.run(5);

    let stats = ctx.sim.app.stats();
    assert_eq!(stats.daq_mismatches.load(Ordering::Relaxed), 1);
    assert_eq!(counter(&ctx, Counter::DaqMismatches), 1);

    // the channel keeps going; the dropped block leaves a gap of one
    let after = drain_ring(&ctx);
    assert_eq!(after.len(), 4);
    assert!(after.iter().all(|b| b.descriptor.channel == 3));
    assert_eq!(after[0].descriptor.sequence, last.wrapping_add(2));
}

#[test]
fn test_fifo_full_without_data_is_discarded() {
    let mut ctx = TestContext::new(vec![(SLOT, SlaveCard::daq(1))]);
    ctx.run(1);
    let _ = ctx.sim.soc.with_backplane(|bp| {
        if let Some(unit) = bp.card_mut(SLOT).and_then(|c| c.daq_unit_mut()) {
            assert!(unit.raise_spurious_fifo_full(2));
        }
        bp.raise(SLOT, PEND_DAQ_FIFO_FULL);
    });
    ctx.run(2);

    assert_eq!(ctx.sim.app.stats().daq_discards.load(Ordering::Relaxed), 1);
    assert_eq!(counter(&ctx, Counter::DaqDiscards), 1);
    assert!(drain_ring(&ctx).is_empty());
    let pending = ctx
        .sim
        .soc
        .with_backplane(|bp| bp.card(SLOT).map(SlaveCard::pending))
        .flatten();
    assert_eq!(pending, Some(0));
}

#[test]
fn test_full_ring_drops_and_leaves_a_gap() {
    let mut config = test_config();
    // room for two short blocks
    config.memory.daq_ring_capacity = 2 * BlockKind::Short.ring_words() as u32 + 10;
    let mut ctx = TestContext::with_config(config, vec![(SLOT, SlaveCard::daq(1))]);
    ctx.command(Opcode::DaqContinuousOn, daq_arg(1, 2));
    ctx.run(6);

    let drops = ctx.sim.app.stats().daq_drops.load(Ordering::Relaxed);
    assert!(drops > 0);
    let kept = drain_ring(&ctx);
    assert_eq!(kept.len(), 2);
    let last = kept[1].descriptor.sequence;
    let drops = ctx.sim.app.stats().daq_drops.load(Ordering::Relaxed);

    ctx.run(1);
    let next = drain_ring(&ctx);
    assert_eq!(next.len(), 1);
    let gap = next[0].descriptor.sequence.wrapping_sub(last) - 1;
    assert_eq!(u64::from(gap), drops);
}

#[test]
fn test_hires_capture_is_one_long_block() {
    let mut ctx = TestContext::new(vec![(SLOT, SlaveCard::daq(1))]);
    ctx.command(Opcode::DaqHiresOn, daq_arg(4, 0));
    ctx.run(12);

    let blocks = drain_ring(&ctx);
    assert_eq!(blocks.len(), 1);
    assert_eq!(blocks[0].kind, BlockKind::Long);
    assert_eq!(blocks[0].descriptor.mode, DaqMode::HiRes.selector());
    assert!(blocks[0].crc_ok());

    let ctrl = ctx
        .sim
        .soc
        .with_backplane(|bp| bp.card(SLOT)?.daq_unit()?.channel(4).map(|c| c.ctrl()))
        .flatten();
    assert_eq!(ctrl.map(|c| c & CTRL_HIRES), Some(0));
}

#[test]
fn test_daq_off_stops_blocks() {
    let mut ctx = TestContext::new(vec![(SLOT, SlaveCard::daq(1))]);
    ctx.command(Opcode::DaqContinuousOn, daq_arg(2, 2));
    ctx.command(Opcode::DaqOff, daq_arg(2, 0));
    let blocks = ctx.sim.app.stats().daq_blocks.load(Ordering::Relaxed);
    assert!(blocks > 0);
    ctx.run(5);
    assert_eq!(ctx.sim.app.stats().daq_blocks.load(Ordering::Relaxed), blocks);
}
