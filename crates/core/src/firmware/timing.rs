//! Timing-event handler.
//!
//! An event from the timing receiver starts every armed channel waiting for its tag.
//! Extension-bus FGs on the controller port are started with one broadcast to the
//! controller. Backplane cards (FG cards and extension-bus adapters) are started by
//! selecting their slots in the master and broadcasting the start register. The
//! controller broadcast always goes out first; on the backplane the selection is
//! always written before the broadcast.

use tracing::{debug, info};

use super::dispatcher::FgDispatcher;
use super::history::HistoryKind;
use crate::access::{BusOp, SharedTransport, Transport, TransportExt};
use crate::common::{SocketKind, TransportError, Width};
use crate::protocol::slave::{self, master, mil};
use crate::stats::bump;

/// An event popped from the timing receiver queue.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EcaEvent {
    /// Event tag.
    pub tag: u32,
    /// Accelerator timestamp.
    pub time: u64,
}

/// What an event start did.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StartReport {
    /// Channels moved to `ACTIVE`.
    pub channels: Vec<usize>,
    /// Backplane slots selected for the broadcast (bit `n - 1` for slot `n`).
    pub slots: u16,
    /// `true` if the extension-bus controller was broadcast to.
    pub mil: bool,
}

/// Starts the armed channels waiting for `event`.
///
/// # Arguments
///
/// * `dispatcher` - The FG dispatcher owning the channel states.
/// * `event` - The timing event.
///
/// # Returns
///
/// The report of what was started; empty if no channel waited for the tag.
pub fn handle_event(dispatcher: &mut FgDispatcher, event: &EcaEvent) -> Result<StartReport, TransportError> {
    let armed = dispatcher.armed_for(event.tag);
    if armed.is_empty() {
        bump(&dispatcher.stats().events_ignored);
        debug!(tag = format_args!("{:#x}", event.tag), "event ignored, nothing armed");
        return Ok(StartReport::default());
    }
    let mut report = StartReport::default();
    for &(channel, socket) in &armed {
        match socket.kind() {
            Some(SocketKind::Backplane(slot) | SocketKind::MilOnBackplane { slot, .. }) => report.slots |= slot.bit(),
            Some(SocketKind::MilDirect { .. }) => report.mil = true,
            None => continue,
        }
        report.channels.push(channel);
    }

    let transport = SharedTransport::clone(dispatcher.transport());
    if report.mil
        && let Some(base) = dispatcher.mil_base()
    {
        transport.write_u16(base + mil::BROADCAST, 1)?;
    }
    if report.slots != 0 {
        let bus = dispatcher.bus_base();
        transport.cycle(&mut [
            BusOp::write(bus + master::SLAVE_SELECT, Width::U16, u64::from(report.slots)),
            BusOp::write(bus + master::BROADCAST_OFFSET, Width::U16, slave::FG_START),
            BusOp::write(bus + master::BROADCAST_DATA, Width::U16, 1),
        ])?;
    }
    dispatcher.mark_started(&report.channels)?;
    bump(&dispatcher.stats().events_matched);
    info!(
        tag = format_args!("{:#x}", event.tag),
        time = event.time,
        started = report.channels.len(),
        slots = format_args!("{:#05x}", report.slots),
        mil = report.mil,
        "ramps started"
    );
    dispatcher.record(HistoryKind::Event {
        tag: event.tag,
        started: report.channels.len(),
    });
    Ok(report)
}

/// Pops the oldest event from the timing receiver queue at `eca_base`.
///
/// # Returns
///
/// `None` if the queue is empty.
pub fn pop_event<T: Transport + ?Sized>(transport: &T, eca_base: u64) -> Result<Option<EcaEvent>, TransportError> {
    use crate::protocol::slave::eca;

    let mut ops = [
        BusOp::read(eca_base + eca::COUNT, Width::U32),
        BusOp::read(eca_base + eca::TAG, Width::U32),
        BusOp::read(eca_base + eca::TIME_HI, Width::U32),
        BusOp::read(eca_base + eca::TIME_LO, Width::U32),
    ];
    transport.cycle(&mut ops)?;
    if ops[0].value == 0 {
        return Ok(None);
    }
    transport.write_u32(eca_base + eca::POP, 1)?;
    Ok(Some(EcaEvent {
        tag: ops[1].value as u32,
        time: ops[2].value << 32 | ops[3].value,
    }))
}
