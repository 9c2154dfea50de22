//! # Statistics Tests
//!
//! Sequence-gap accounting over arbitrary block streams.

use pretty_assertions::assert_eq;
use proptest::prelude::*;
use scu_core::common::{ChannelId, Slot};
use scu_core::protocol::Descriptor;
use scu_host::feedback::FeedbackStats;

fn id(slot: u8, ch: u8) -> ChannelId {
    ChannelId::new(Slot::new(slot).unwrap(), ch).unwrap()
}

fn block(id: ChannelId, sequence: u16) -> Descriptor {
    Descriptor {
        slot: id.slot.number(),
        channel: id.channel,
        sequence,
        ..Descriptor::default()
    }
}

#[test]
fn test_channels_are_counted_apart() {
    let mut stats = FeedbackStats::new(None);
    let (a, b) = (id(2, 1), id(2, 2));
    let _ = stats.record(a, &block(a, 0), true, true);
    let _ = stats.record(b, &block(b, 40), true, false);
    let _ = stats.record(a, &block(a, 1), true, true);
    let _ = stats.record(b, &block(b, 43), true, false);

    assert_eq!(stats.channel(a).map(|c| (c.received, c.lost)), Some((2, 0)));
    assert_eq!(stats.channel(b).map(|c| (c.received, c.lost, c.unsubscribed)), Some((2, 2, 2)));
    assert_eq!(stats.channels().map(|(id, _)| *id).collect::<Vec<_>>(), vec![a, b]);

    stats.reset();
    assert_eq!(stats.total_received(), 0);
    assert!(stats.channel(a).is_none());
}

proptest! {
    #[test]
    fn prop_lost_is_the_sum_of_gaps(start in any::<u16>(), steps in prop::collection::vec(1u16..50, 1..100)) {
        let ch = id(7, 3);
        let mut stats = FeedbackStats::new(None);
        let mut sequence = start;
        prop_assert_eq!(stats.record(ch, &block(ch, sequence), true, true), 0);
        for &step in &steps {
            sequence = sequence.wrapping_add(step);
            prop_assert_eq!(stats.record(ch, &block(ch, sequence), true, true), u64::from(step - 1));
        }

        let expected: u64 = steps.iter().map(|&s| u64::from(s - 1)).sum();
        let c = stats.channel(ch).unwrap();
        prop_assert_eq!(c.received, steps.len() as u64 + 1);
        prop_assert_eq!(c.lost, expected);
        prop_assert_eq!(c.last_sequence, Some(sequence));
        prop_assert_eq!(stats.total_lost(), expected);
    }
}
