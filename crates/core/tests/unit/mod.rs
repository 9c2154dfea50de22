//! # Unit Tests
//!
//! Tests per core module, from bus access up to the firmware scenarios.

/// Bus access chunking, address modes and DDR3 ordering.
pub mod access;

/// Command queue handling.
pub mod command;

/// Configuration defaults and overrides.
pub mod config;

/// DAQ assembler and ring output.
pub mod daq;

/// DDR3 transparent and burst access.
pub mod ddr3;

/// FG dispatcher and timing scenarios.
pub mod firmware;

/// Partition table.
pub mod mmu;

/// Wire formats.
pub mod protocol;


/// Interrupts, queues and the scheduler.
pub mod rtos;
