//! # Command Handler Tests
//!
//! The shared-memory command queue: execution order, rejections and the
//! read-counter / `BUSY` handshake the host waits on.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use pretty_assertions::assert_eq;
use scu_core::common::{ChannelId, Slot};
use scu_core::firmware::HistoryKind;
use scu_core::firmware::command::{CommandHandler, Outcome};
use scu_core::protocol::shared::offsets;
use scu_core::protocol::{DaqArg, Opcode, RawCommand};
use scu_core::soc::devices::SlaveCard;

use crate::common::harness::TestContext;

fn handler(ctx: &TestContext) -> CommandHandler {
    CommandHandler::new(Arc::clone(ctx.sim.app.context()), 256)
}

fn rejected(ctx: &TestContext) -> u64 {
    ctx.sim.app.stats().commands_rejected.load(Ordering::Relaxed)
}

fn errors(ctx: &TestContext) -> usize {
    ctx.sim
        .app
        .history()
        .entries()
        .into_iter()
        .filter(|e| matches!(e.kind, HistoryKind::Error(_)))
        .count()
}

#[test]
fn test_unknown_opcode_is_rejected_and_acknowledged() {
    let mut ctx = TestContext::new(vec![(1, SlaveCard::acu(1))]);
    let (write, _) = ctx.shared().command_counters().unwrap();
    let before = errors(&ctx);

    ctx.post(RawCommand { opcode: 0x99, arg: 0 });

    assert_eq!(rejected(&ctx), 1);
    assert_eq!(ctx.shared().command_counters().unwrap(), (write + 1, write + 1));
    assert!(!ctx.shared().busy().unwrap());
    assert_eq!(errors(&ctx), before + 1);
}

#[test]
fn test_channel_out_of_range_is_rejected() {
    let ctx = TestContext::new(vec![(1, SlaveCard::acu(1))]);
    let h = handler(&ctx);
    assert_eq!(
        h.execute(RawCommand::new(Opcode::EnableChannel, 16)).unwrap(),
        Outcome::Rejected
    );
    assert_eq!(
        h.execute(RawCommand::new(Opcode::ResetChannel, 15)).unwrap(),
        Outcome::Done(Opcode::ResetChannel)
    );
}

#[test]
fn test_daq_command_needs_a_daq_card() {
    let ctx = TestContext::new(vec![(1, SlaveCard::acu(1)), (2, SlaveCard::daq(1))]);
    let h = handler(&ctx);
    let arg = |slot| {
        DaqArg {
            channel: ChannelId::new(Slot::new(slot).unwrap(), 1).unwrap(),
            value: 0,
        }
        .encode()
    };

    assert_eq!(h.execute(RawCommand::new(Opcode::DaqOff, arg(1))).unwrap(), Outcome::Rejected);
    assert_eq!(
        h.execute(RawCommand::new(Opcode::DaqOff, arg(2))).unwrap(),
        Outcome::Done(Opcode::DaqOff)
    );
    // slot 0 does not exist
    assert_eq!(h.execute(RawCommand::new(Opcode::DaqOff, 0)).unwrap(), Outcome::Rejected);
}

#[test]
fn test_queued_commands_run_in_order() {
    let ctx = TestContext::new(vec![(1, SlaveCard::acu(1))]);
    let shared = ctx.shared();
    let (write, _) = shared.command_counters().unwrap();
    shared.post_command(write, RawCommand::new(Opcode::DisableChannel, 3)).unwrap();
    shared.post_command(write + 1, RawCommand { opcode: 0, arg: 0 }).unwrap();
    shared.post_command(write + 2, RawCommand::new(Opcode::ResetChannel, 4)).unwrap();

    let outcomes = handler(&ctx).poll().unwrap();
    assert_eq!(
        outcomes,
        vec![
            Outcome::Done(Opcode::DisableChannel),
            Outcome::Rejected,
            Outcome::Done(Opcode::ResetChannel),
        ]
    );
    assert_eq!(shared.command_counters().unwrap(), (write + 3, write + 3));
    assert!(!shared.busy().unwrap());

    let commands: Vec<(Opcode, u32)> = ctx
        .sim
        .app
        .history()
        .entries()
        .into_iter()
        .filter_map(|e| match e.kind {
            HistoryKind::Command { opcode, arg } => Some((opcode, arg)),
            _ => None,
        })
        .collect();
    assert_eq!(commands, vec![(Opcode::DisableChannel, 3), (Opcode::ResetChannel, 4)]);
}

#[test]
fn test_counters_wrap_around() {
    let ctx = TestContext::new(vec![(1, SlaveCard::acu(1))]);
    let shared = ctx.shared();
    shared.write_u32(offsets::CMD_WRITE, u32::MAX).unwrap();
    shared.write_u32(offsets::CMD_READ, u32::MAX).unwrap();
    shared.post_command(u32::MAX, RawCommand::new(Opcode::DisableChannel, 0)).unwrap();

    let outcomes = handler(&ctx).poll().unwrap();
    assert_eq!(outcomes, vec![Outcome::Done(Opcode::DisableChannel)]);
    assert_eq!(shared.command_counters().unwrap(), (0, 0));
}

#[test]
fn test_mil_gap_interval_is_mirrored() {
    let mut ctx = TestContext::new(vec![(1, SlaveCard::acu(1))]);
    ctx.command(Opcode::MilGapInterval, 25);
    assert_eq!(ctx.sim.app.context().mil_gap_interval(), 25);
    assert_eq!(ctx.shared().read_u32(offsets::MIL_GAP_INTERVAL).unwrap(), 25);

    ctx.command(Opcode::MilGapInterval, 0);
    assert_eq!(ctx.shared().read_u32(offsets::MIL_GAP_INTERVAL).unwrap(), 0);
}

#[test]
fn test_clear_handler_state_resets_daq_counters() {
    let mut ctx = TestContext::new(vec![(3, SlaveCard::daq(1))]);
    let arg = DaqArg {
        channel: ChannelId::new(Slot::new(3).unwrap(), 1).unwrap(),
        value: 2,
    }
    .encode();
    ctx.command(Opcode::DaqContinuousOn, arg);
    ctx.run(5);
    ctx.command(Opcode::DaqOff, arg);
    assert!(ctx.sim.app.stats().daq_blocks.load(Ordering::Relaxed) > 0);

    ctx.command(Opcode::ClearHandlerState, 0);

    let stats = ctx.sim.app.stats();
    assert_eq!(stats.daq_blocks.load(Ordering::Relaxed), 0);
    assert_eq!(stats.daq_drops.load(Ordering::Relaxed), 0);
    // the history restarts with the clear itself
    let entries = ctx.sim.app.history().entries();
    assert_eq!(entries.len(), 1);
    assert!(matches!(
        entries[0].kind,
        HistoryKind::Command {
            opcode: Opcode::ClearHandlerState,
            ..
        }
    ));
}
