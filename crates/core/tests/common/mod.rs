//! Shared test infrastructure.

/// Simulator-backed test context.
pub mod harness;

/// Mock transport and in-memory RAM.
pub mod mocks;
