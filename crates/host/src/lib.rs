//! Host-side library for SCU front-ends.
//!
//! This crate is what a host process links to talk to a device. It provides:
//! 1. **Connection:** A transport wrapper that serializes every cycle through a
//!    process-wide named mutex and records access-time extremes.
//! 2. **RAM and MMU:** The off-chip RAM driver over the connection, transparent by
//!    default and burst-fifo on request.
//! 3. **Commands and FGs:** The command handshake and the FG channel API.
//! 4. **Feedback:** Polling of the DAQ ring, block demultiplexing to subscribers and
//!    per-channel statistics.
//! 5. **Logging:** `tracing` subscriber setup.

/// Host command handshake.
pub mod command;
/// Host configuration.
pub mod config;
/// Connection lifecycle wrapper.
pub mod connection;
/// Host error type.
pub mod error;
/// DAQ feedback administration.
pub mod feedback;
/// FG channel API.
pub mod fg;
/// Tracing subscriber initialization.
pub mod logging;
/// Access-time measurement.
pub mod measure;
/// OS-scoped named mutex.
pub mod named_mutex;
/// Off-chip RAM over the connection.
pub mod ram;

pub use command::CommandClient;
pub use config::HostConfig;
pub use connection::Connection;
pub use error::HostError;
pub use feedback::{FeedbackAdmin, Subscriber};
pub use fg::FgClient;
