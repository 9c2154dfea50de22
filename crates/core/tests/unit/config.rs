//! # Configuration Tests
//!
//! Defaults and partial JSON overrides.

use pretty_assertions::assert_eq;
use rstest::rstest;
use scu_core::config::{Config, ExceptionPolicy, RamKind};
use scu_core::{Simulator, Soc};

#[test]
fn test_defaults() {
    let config = Config::default();
    assert_eq!(config.general.tick_rate_hz, 10_000);
    assert_eq!(config.general.command_poll_ticks, 10);
    assert_eq!(config.general.exception_policy, ExceptionPolicy::Halt);
    assert_eq!(config.memory.kind, RamKind::Ddr3);
    assert_eq!(config.memory.daq_ring_tag, 0xDA00);
    assert_eq!(config.fg.channels, 16);
    assert_eq!(config.fg.event_tag, 0xFC0);
    assert_eq!(config.system.slots, 12);
}

#[test]
fn test_empty_json_is_default() {
    let config = Config::from_json("{}").unwrap();
    let default = Config::default();
    assert_eq!(config.general.tick_rate_hz, default.general.tick_rate_hz);
    assert_eq!(config.memory.capacity64, default.memory.capacity64);
    assert_eq!(config.queues.irq_queue, default.queues.irq_queue);
}

#[test]
fn test_partial_override_keeps_siblings() {
    let config = Config::from_json(
        r#"{
            "general": { "exception_policy": "Restart" },
            "fg": { "channels": 4 },
            "queues": { "event_queue": 2 }
        }"#,
    )
    .unwrap();
    assert_eq!(config.general.exception_policy, ExceptionPolicy::Restart);
    assert_eq!(config.general.tick_rate_hz, 10_000);
    assert_eq!(config.fg.channels, 4);
    assert_eq!(config.fg.buffer_size, 1024);
    assert_eq!(config.queues.event_queue, 2);
    assert_eq!(config.queues.alarm_queue, 8);
}

#[rstest]
#[case("Ddr3", RamKind::Ddr3)]
#[case("DDR3", RamKind::Ddr3)]
#[case("Sram", RamKind::Sram)]
#[case("SRAM", RamKind::Sram)]
fn test_ram_kind_names(#[case] name: &str, #[case] kind: RamKind) {
    let config = Config::from_json(&format!(r#"{{ "memory": {{ "kind": "{name}" }} }}"#)).unwrap();
    assert_eq!(config.memory.kind, kind);
}

#[test]
fn test_unknown_variant_is_an_error() {
    assert!(Config::from_json(r#"{ "memory": { "kind": "Flash" } }"#).is_err());
    assert!(Config::from_json("not json").is_err());
}

#[rstest]
#[case(0, false)]
#[case(1, true)]
#[case(1024, true)]
#[case(1025, false)]
#[case(4096, false)]
fn test_buffer_size_must_fit_poly_table(#[case] size: u32, #[case] ok: bool) {
    let parsed = Config::from_json(&format!(r#"{{ "fg": {{ "buffer_size": {size} }} }}"#));
    assert_eq!(parsed.is_ok(), ok, "{parsed:?}");
    if let Ok(config) = parsed {
        assert_eq!(config.fg.buffer_size, size);
    }
}

#[test]
fn test_oversized_buffer_is_refused_at_boot() {
    let mut config = crate::common::harness::test_config();
    config.fg.buffer_size = 2048;
    let soc = Soc::builder(&config).build().unwrap();
    let err = Simulator::new(soc, &config).unwrap_err();
    assert!(err.to_string().contains("buffer_size"), "{err}");
}
