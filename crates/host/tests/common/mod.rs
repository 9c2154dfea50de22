//! # Common Test Utilities
//!
//! A simulated device with a host connection attached to it.

/// Device boot and host handles.
pub mod harness;
