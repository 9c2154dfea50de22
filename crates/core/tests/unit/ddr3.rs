//! # DDR3 Tests
//!
//! The simulated DDR3 behind the drivers: transparent round trips, burst reads
//! across fifo refills and the burst poll callback.

use pretty_assertions::assert_eq;
use scu_core::access;
use scu_core::common::AddrMode;
use scu_core::config::Config;
use scu_core::ram::ddr3::BURST_FIFO_SIZE;
use scu_core::ram::{Ddr3, RamAccess, RamDevice, RamError};
use scu_core::soc::SocTransport;
use scu_core::Soc;

use crate::common::harness::test_config;

fn pattern(len: usize) -> Vec<u64> {
    (0..len as u64).map(|i| 0xA5A5_0000_0000_0000 | i << 20 | (i ^ 0x3C)).collect()
}

fn discover(config: &Config) -> (Soc, RamDevice<SocTransport>) {
    let soc = Soc::builder(config).build().unwrap();
    let ram = RamDevice::discover(soc.transport(), config.system.directory_root, &config.memory)
        .unwrap()
        .unwrap();
    (soc, ram)
}

fn ddr3(config: &Config) -> (Soc, Ddr3<SocTransport>) {
    match discover(config) {
        (soc, RamDevice::Ddr3(ram)) => (soc, ram),
        (_, other) => panic!("expected ddr3, found {other:?}"),
    }
}

#[test]
fn test_transparent_write_then_read() {
    let config = test_config();
    let soc = Soc::builder(&config).build().unwrap();
    let link = soc.transport();
    let addr = config.system.ddr3_base + 8 * 40;

    let data = pattern(5);
    access::ddr3_write(&link, addr, &data, AddrMode::Linear).unwrap();
    let mut out = [0u64; 5];
    access::ddr3_read(&link, addr, &mut out, AddrMode::Linear).unwrap();
    assert_eq!(out.to_vec(), data);

    // a frozen address takes every word in turn, the last one stays
    access::ddr3_write(&link, addr, &[1, 2, 0xDEAD_BEEF_0000_0001], AddrMode::Frozen).unwrap();
    let mut one = [0u64; 1];
    access::ddr3_read(&link, addr, &mut one, AddrMode::Linear).unwrap();
    assert_eq!(one[0], 0xDEAD_BEEF_0000_0001);
}

#[test]
fn test_burst_read_spans_fifo_refills() {
    let (_soc, ram) = ddr3(&test_config());
    let data = pattern(600);
    assert!(data.len() > 2 * BURST_FIFO_SIZE);
    ram.write64(100, &data).unwrap();

    let mut out = vec![0u64; data.len()];
    assert_eq!(ram.read_burst(100, &mut out, None).unwrap(), data.len());
    assert_eq!(out, data);
}

#[test]
fn test_negative_poll_aborts_burst() {
    let (_soc, ram) = ddr3(&test_config());
    let mut out = vec![0u64; 16];
    let mut abort = |_polls: usize| -3;
    let err = ram.read_burst(0, &mut out, Some(&mut abort)).unwrap_err();
    assert!(matches!(err, RamError::Aborted(-3)));
}

#[test]
fn test_positive_poll_ends_burst_early() {
    let (_soc, ram) = ddr3(&test_config());
    let data = pattern(300);
    ram.write64(0, &data).unwrap();

    // the fifo starts empty on every chunk; stop at the second one
    let mut calls = 0;
    let mut stop_second = |_polls: usize| {
        calls += 1;
        i32::from(calls >= 2)
    };
    let mut out = vec![0u64; data.len()];
    let n = ram.read_burst(0, &mut out, Some(&mut stop_second)).unwrap();
    assert_eq!(n, BURST_FIFO_SIZE);
    assert_eq!(&out[..n], &data[..n]);
    assert!(out[n..].iter().all(|&w| w == 0));
}

#[test]
fn test_burst_needs_a_burst_window() {
    let config = test_config();
    let soc = Soc::builder(&config).build().unwrap();
    let ram = Ddr3::new(soc.transport(), config.system.ddr3_base, 64);
    let mut out = [0u64; 4];
    assert!(matches!(ram.read_burst(0, &mut out, None), Err(RamError::NoBurstWindow)));
}

#[test]
fn test_configured_burst_read_serves_read64() {
    let mut config = test_config();
    config.memory.burst_read = true;
    let (_soc, ram) = discover(&config);
    assert!(format!("{ram:?}").contains("burst_read: true"));

    let data = pattern(300);
    ram.write64(7, &data).unwrap();
    let mut out = vec![0u64; data.len()];
    ram.read64(7, &mut out).unwrap();
    assert_eq!(out, data);
}
