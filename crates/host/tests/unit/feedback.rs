//! # Feedback Administration Tests
//!
//! DAQ blocks from the simulated cards through the ring to host subscribers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use pretty_assertions::assert_eq;
use scu_core::common::{ChannelId, Slot};
use scu_core::protocol::{DaqArg, Opcode};
use scu_core::soc::devices::SlaveCard;
use scu_host::feedback::Collector;
use scu_host::ram::{HostRam, open_mmu};
use scu_host::FeedbackAdmin;

use crate::common::harness::Device;

const SLOT: u8 = 5;

fn channel(ch: u8) -> ChannelId {
    ChannelId::new(Slot::new(SLOT).unwrap(), ch).unwrap()
}

fn continuous(ch: u8) -> DaqArg {
    DaqArg {
        channel: channel(ch),
        value: 2,
    }
}

fn admin(dev: &Device) -> FeedbackAdmin<HostRam> {
    FeedbackAdmin::new(open_mmu(&dev.conn, &dev.config).unwrap(), &dev.config).unwrap()
}

#[test]
fn test_blocks_reach_the_subscriber() {
    let mut dev = Device::boot_at(1_000, vec![(SLOT, SlaveCard::daq(1))]);
    let mut admin = admin(&dev);
    let collector = Collector::shared();
    assert!(admin.subscribe(channel(1), Box::new(collector.clone())).is_none());
    assert_eq!(admin.subscribed().collect::<Vec<_>>(), vec![channel(1)]);

    dev.start();
    let commands = dev.commands();
    commands.configure_daq(Opcode::DaqContinuousOn, continuous(1)).unwrap();
    commands.configure_daq(Opcode::DaqContinuousOn, continuous(2)).unwrap();

    let deadline = Instant::now() + Duration::from_secs(10);
    while collector.lock().blocks.len() < 20 {
        assert!(Instant::now() < deadline, "no blocks arrived");
        let _ = admin.poll().unwrap();
        thread::sleep(Duration::from_millis(1));
    }
    commands.configure_daq(Opcode::DaqOff, continuous(1)).unwrap();
    commands.configure_daq(Opcode::DaqOff, continuous(2)).unwrap();
    dev.halt();

    let received = collector.lock().clone();
    let sequences = received.sequences();
    assert!(sequences.windows(2).all(|w| w[1] == w[0].wrapping_add(1)), "{sequences:?}");
    assert!(received.blocks.iter().all(|(d, _)| d.slot == SLOT && d.channel == 1));
    let len = received.blocks[0].1.len();
    assert!(len > 0);
    assert!(received.blocks.iter().all(|(_, p)| p.len() == len));

    let stats = admin.stats();
    let ch1 = stats.channel(channel(1)).unwrap();
    assert_eq!(ch1.received, received.blocks.len() as u64);
    assert_eq!((ch1.lost, ch1.crc_errors, ch1.unsubscribed), (0, 0, 0));
    let ch2 = stats.channel(channel(2)).unwrap();
    assert!(ch2.received > 0);
    assert_eq!(ch2.unsubscribed, ch2.received);
    assert_eq!(stats.total_lost(), 0);
    assert_eq!(stats.invalid, 0);
}

#[test]
fn test_poll_waits_for_the_acknowledge_to_be_folded() {
    let mut dev = Device::boot(vec![(SLOT, SlaveCard::daq(1))]);
    let mut admin = admin(&dev);
    let commands = dev.commands();
    let _ = commands.post(Opcode::DaqContinuousOn, continuous(4).encode()).unwrap();
    dev.sim().run(20).unwrap();

    let first = admin.poll().unwrap();
    assert!(!first.skipped);
    assert!(first.blocks > 0);
    assert_eq!(first.delivered, 0);
    assert_eq!(first.words % 129, 0);

    // the firmware has not pushed since the acknowledge
    let second = admin.poll().unwrap();
    assert!(second.skipped);
    assert_eq!(admin.stats().skipped_polls, 1);

    dev.sim().run(1).unwrap();
    let third = admin.poll().unwrap();
    assert!(!third.skipped);
    assert_eq!(third.blocks, 1);

    admin.reset_stats();
    assert_eq!(admin.stats().total_received(), 0);
    assert_eq!(admin.stats().skipped_polls, 0);
}

#[test]
fn test_closure_subscriber_and_unsubscribe() {
    let mut dev = Device::boot(vec![(SLOT, SlaveCard::daq(1))]);
    let mut admin = admin(&dev);
    let (tx, rx) = std::sync::mpsc::channel();
    let _ = admin.subscribe(
        channel(3),
        Box::new(move |d: &scu_core::protocol::Descriptor, _: &[u16]| {
            let _ = tx.send(d.sequence);
        }),
    );
    let _ = dev.commands().post(Opcode::DaqContinuousOn, continuous(3).encode()).unwrap();
    dev.sim().run(20).unwrap();

    let report = admin.poll().unwrap();
    assert_eq!(report.delivered, report.blocks);
    assert_eq!(rx.try_iter().count(), report.blocks as usize);

    assert!(admin.unsubscribe(channel(3)).is_some());
    dev.sim().run(3).unwrap();
    let report = admin.poll().unwrap();
    assert!(report.blocks > 0);
    assert_eq!(report.delivered, 0);
}

#[test]
fn test_run_until_stopped() {
    let mut dev = Device::boot_at(1_000, vec![(SLOT, SlaveCard::daq(1))]);
    let mut admin = admin(&dev);
    dev.start();
    dev.commands()
        .configure_daq(Opcode::DaqContinuousOn, continuous(4))
        .unwrap();

    let stop = AtomicBool::new(false);
    thread::scope(|s| {
        let _ = s.spawn(|| {
            thread::sleep(Duration::from_millis(200));
            stop.store(true, Ordering::Relaxed);
        });
        admin.run(&stop).unwrap();
    });
    dev.halt();
    assert!(admin.stats().total_received() > 0);
}
