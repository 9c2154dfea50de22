//! # Firmware Scenario Tests
//!
//! FG channels driven end to end on the simulated SoC: bind, queue parameters,
//! enable, start on a timing event and run to completion.

use std::sync::atomic::Ordering;

use pretty_assertions::assert_eq;
use scu_core::common::{Slot, Socket};
use scu_core::firmware::HistoryKind;
use scu_core::protocol::{ChannelField, FgMacro, FgState, Opcode, PolynomialParams};
use scu_core::soc::devices::SlaveCard;

use crate::common::harness::TestContext;

const EVENT_TAG: u32 = 0xFC0;

fn params(start: i32) -> PolynomialParams {
    PolynomialParams {
        coeff_c: start,
        ..PolynomialParams::default()
    }
}

/// Binds channel `ch` to macro `index`, queues `sets` and enables it.
fn arm(ctx: &mut TestContext, ch: usize, index: u32, tag: u32, sets: &[PolynomialParams]) {
    let shared = ctx.shared();
    shared.write_channel_field(ch, ChannelField::MacroIndex, index).unwrap();
    shared.write_channel_field(ch, ChannelField::Tag, tag).unwrap();
    for (i, p) in sets.iter().enumerate() {
        shared.write_poly(ch, i as u32, p).unwrap();
    }
    shared
        .write_channel_field(ch, ChannelField::WriteIndex, sets.len() as u32)
        .unwrap();
    ctx.command(Opcode::EnableChannel, ch as u32);
}

fn state(ctx: &TestContext, ch: usize) -> FgState {
    ctx.shared().read_channel(ch).unwrap().state
}

fn fg_counts(ctx: &TestContext, slot: u8, device: u8) -> Option<(u32, u32)> {
    ctx.sim
        .soc
        .with_backplane(|bp| bp.card(slot)?.fg(device).map(|fg| (fg.starts(), fg.ramp_count())))
        .flatten()
}

fn transitions(ctx: &TestContext, ch: usize) -> Vec<(FgState, FgState)> {
    ctx.sim
        .app
        .history()
        .entries()
        .into_iter()
        .filter_map(|e| match e.kind {
            HistoryKind::State { channel, from, to } if channel == ch => Some((from, to)),
            _ => None,
        })
        .collect()
}

fn stopped(ctx: &mut TestContext, ch: usize) {
    ctx.run_until(50, |sim| {
        sim.app.context().shared.read_channel(ch).unwrap().state == FgState::Stopped
    });
}

#[test]
fn test_rescan_publishes_macro_table() {
    let ctx = TestContext::new(vec![(1, SlaveCard::acu(3))]);
    let macros = ctx.shared().read_macros().unwrap();
    assert_eq!(
        macros,
        vec![FgMacro {
            socket: Socket::backplane(Slot::new(1).unwrap()),
            device: 0,
            version: 3,
            output_bits: 16,
        }]
    );
}

#[test]
fn test_cold_start_single_fg() {
    let mut ctx = TestContext::new(vec![(1, SlaveCard::acu(3))]);
    arm(&mut ctx, 0, 0, 0, &[params(100)]);
    assert_eq!(state(&ctx, 0), FgState::Armed);

    assert!(ctx.sim.inject_event(EVENT_TAG, 1_000));
    ctx.run_until(50, |sim| {
        sim.app.context().shared.read_channel(0).unwrap().state == FgState::Stopped
    });

    let reg = ctx.shared().read_channel(0).unwrap();
    assert_eq!(reg.ramp_count, 1);
    assert_eq!(reg.sequence, 1);
    assert_eq!(reg.read_index, 1);
    assert_eq!(fg_counts(&ctx, 1, 0), Some((1, 1)));

    let stats = ctx.sim.app.stats();
    assert_eq!(stats.fg_starts.load(Ordering::Relaxed), 1);
    assert_eq!(stats.fg_done.load(Ordering::Relaxed), 1);

    assert_eq!(
        transitions(&ctx, 0),
        vec![
            (FgState::Idle, FgState::Armed),
            (FgState::Armed, FgState::Active),
            (FgState::Active, FgState::Stopped),
        ]
    );
}

#[test]
fn test_reenable_after_ramp_passes_through_idle() {
    let mut ctx = TestContext::new(vec![(1, SlaveCard::acu(3))]);
    arm(&mut ctx, 0, 0, 0, &[params(100)]);
    assert!(ctx.sim.inject_event(EVENT_TAG, 0));
    stopped(&mut ctx, 0);

    let shared = ctx.shared();
    shared.write_poly(0, 1, &params(200)).unwrap();
    shared.write_channel_field(0, ChannelField::WriteIndex, 2).unwrap();
    ctx.command(Opcode::EnableChannel, 0);
    assert_eq!(state(&ctx, 0), FgState::Armed);

    assert!(ctx.sim.inject_event(EVENT_TAG, 0));
    stopped(&mut ctx, 0);
    assert_eq!(ctx.shared().read_channel(0).unwrap().ramp_count, 2);

    use FgState::{Active, Armed, Idle, Stopped};
    assert_eq!(
        transitions(&ctx, 0),
        vec![
            (Idle, Armed),
            (Armed, Active),
            (Active, Stopped),
            (Stopped, Idle),
            (Idle, Armed),
            (Armed, Active),
            (Active, Stopped),
        ]
    );
}

#[test]
fn test_interrupt_wakeups_are_consumed() {
    let mut ctx = TestContext::new(vec![(1, SlaveCard::acu(3))]);
    arm(&mut ctx, 0, 0, 0, &[params(1), params(2)]);
    assert!(ctx.sim.inject_event(EVENT_TAG, 0));
    stopped(&mut ctx, 0);
    ctx.run(3);

    let wakeups = &ctx.sim.app.context().fg_wakeups;
    assert_eq!(wakeups.count(), 0);
    assert_eq!(wakeups.overflows(), 0);
}

#[test]
fn test_several_parameter_sets_are_streamed() {
    let mut ctx = TestContext::new(vec![(1, SlaveCard::acu(3))]);
    let sets: Vec<PolynomialParams> = (0..12).map(|i| params(i * 10)).collect();
    arm(&mut ctx, 0, 0, 0, &sets);
    assert!(ctx.sim.inject_event(EVENT_TAG, 0));
    ctx.run_until(200, |sim| {
        sim.app.context().shared.read_channel(0).unwrap().state == FgState::Stopped
    });

    let reg = ctx.shared().read_channel(0).unwrap();
    assert_eq!(reg.ramp_count, 12);
    assert_eq!(reg.pending(1024), 0);
    assert_eq!(fg_counts(&ctx, 1, 0), Some((1, 12)));
}

#[test]
fn test_start_only_matches_channel_tag() {
    let mut ctx = TestContext::new(vec![(1, SlaveCard::addac(2))]);
    arm(&mut ctx, 0, 0, 0x123, &[params(1)]);
    arm(&mut ctx, 1, 1, 0, &[params(2)]);

    assert!(ctx.sim.inject_event(0x123, 0));
    ctx.run(3);
    assert_ne!(state(&ctx, 0), FgState::Armed);
    assert_eq!(state(&ctx, 1), FgState::Armed);

    assert!(ctx.sim.inject_event(0x999, 0));
    ctx.run(3);
    assert_eq!(state(&ctx, 1), FgState::Armed);
    assert_eq!(ctx.sim.app.stats().events_ignored.load(Ordering::Relaxed), 1);

    assert!(ctx.sim.inject_event(EVENT_TAG, 0));
    ctx.run_until(50, |sim| {
        let shared = &sim.app.context().shared;
        (0..2).all(|ch| shared.read_channel(ch).unwrap().state == FgState::Stopped)
    });
}

#[test]
fn test_enable_needs_binding_and_parameters() {
    let mut ctx = TestContext::new(vec![(1, SlaveCard::acu(3))]);

    // unbound
    ctx.command(Opcode::EnableChannel, 2);
    assert_eq!(state(&ctx, 2), FgState::Idle);

    // bound to a macro that does not exist
    arm(&mut ctx, 3, 7, 0, &[params(1)]);
    assert_eq!(state(&ctx, 3), FgState::Idle);

    // bound, buffer empty
    arm(&mut ctx, 4, 0, 0, &[]);
    assert_eq!(state(&ctx, 4), FgState::Idle);
}

#[test]
fn test_disable_returns_channel_to_idle() {
    let mut ctx = TestContext::new(vec![(1, SlaveCard::acu(3))]);
    arm(&mut ctx, 0, 0, 0, &[params(1), params(2)]);
    assert!(ctx.sim.inject_event(EVENT_TAG, 0));
    ctx.run(2);
    ctx.command(Opcode::DisableChannel, 0);
    assert_eq!(state(&ctx, 0), FgState::Idle);

    let running = ctx
        .sim
        .soc
        .with_backplane(|bp| bp.card(1).and_then(|c| c.fg(0)).map(|fg| fg.is_running()))
        .flatten();
    assert_eq!(running, Some(false));
}

#[test]
fn test_reset_channel_keeps_binding() {
    let mut ctx = TestContext::new(vec![(1, SlaveCard::acu(3))]);
    arm(&mut ctx, 0, 0, 0x55, &[params(1)]);
    ctx.command(Opcode::ResetChannel, 0);

    let reg = ctx.shared().read_channel(0).unwrap();
    assert_eq!(reg.state, FgState::Idle);
    assert_eq!((reg.macro_index, reg.tag), (0, 0x55));
    assert_eq!((reg.write_index, reg.read_index, reg.ramp_count), (0, 0, 0));
}

#[test]
fn test_rescan_picks_up_new_card() {
    let mut ctx = TestContext::new(vec![(1, SlaveCard::acu(3))]);
    let inserted = ctx.sim.soc.with_backplane(|bp| bp.insert(4, SlaveCard::addac(5)));
    assert_eq!(inserted, Some(true));
    ctx.command(Opcode::Rescan, 0);
    let macros = ctx.shared().read_macros().unwrap();
    assert_eq!(macros.len(), 3);
    assert_eq!(macros[2].socket, Socket::backplane(Slot::new(4).unwrap()));
    assert_eq!(macros[2].device, 1);
}
