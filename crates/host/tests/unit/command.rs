//! # Command Client Tests
//!
//! The host side of the command handshake against the simulated firmware.

use pretty_assertions::assert_eq;
use scu_core::common::{ChannelId, Slot};
use scu_core::protocol::shared::offsets;
use scu_core::protocol::{DaqArg, Opcode};
use scu_core::soc::devices::SlaveCard;
use scu_host::{CommandClient, HostConfig, HostError};

use crate::common::harness::Device;

#[test]
fn test_ticket_completes_after_the_firmware_runs() {
    let mut dev = Device::boot(vec![(1, SlaveCard::acu(1))]);
    let commands = dev.commands();

    let ticket = commands.post(Opcode::DisableChannel, 0).unwrap();
    assert!(!commands.is_done(ticket).unwrap());

    dev.sim().run(20).unwrap();
    assert!(commands.is_done(ticket).unwrap());
    let (write, read) = commands.shared().command_counters().unwrap();
    assert_eq!(write, read);
    assert_eq!(read, ticket.counter() + 1);
}

#[test]
fn test_queue_full() {
    let mut dev = Device::boot(vec![(1, SlaveCard::acu(1))]);
    let commands = dev.commands();
    for ch in 0..16 {
        let _ = commands.post(Opcode::DisableChannel, ch).unwrap();
    }
    assert!(matches!(commands.post(Opcode::DisableChannel, 0), Err(HostError::QueueFull)));

    dev.sim().run(20).unwrap();
    assert!(commands.post(Opcode::DisableChannel, 0).is_ok());
}

#[test]
fn test_wait_times_out_without_firmware() {
    let dev = Device::boot(vec![(1, SlaveCard::acu(1))]);
    let config = HostConfig {
        timeout_ms: 20,
        ..dev.config.clone()
    };
    let commands = CommandClient::new(dev.shared(), &config);
    let err = commands.execute(Opcode::DisableChannel, 0).unwrap_err();
    assert!(matches!(err, HostError::Timeout(_)));
}

#[test]
fn test_configure_daq_checks_the_opcode() {
    let dev = Device::boot(vec![(1, SlaveCard::daq(1))]);
    let arg = DaqArg {
        channel: ChannelId::new(Slot::new(1).unwrap(), 1).unwrap(),
        value: 0,
    };
    let err = dev.commands().configure_daq(Opcode::Rescan, arg).unwrap_err();
    assert!(matches!(err, HostError::InvalidArgument(_)));
}

#[test]
fn test_blocking_commands_against_a_running_device() {
    let mut dev = Device::boot(vec![(1, SlaveCard::acu(1))]);
    dev.start();
    let commands = dev.commands();

    commands.set_mil_gap_interval(7).unwrap();
    assert_eq!(commands.shared().read_u32(offsets::MIL_GAP_INTERVAL).unwrap(), 7);
    commands.rescan().unwrap();
    commands.clear_handler_state().unwrap();
    commands.print_history().unwrap();
    // rejected commands complete too
    commands.execute(Opcode::EnableChannel, 99).unwrap();

    dev.halt();
    let stats = dev.sim().app.stats().snapshot();
    assert_eq!(stats.commands, 4);
    assert_eq!(stats.commands_rejected, 1);
}
