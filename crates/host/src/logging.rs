//! Tracing subscriber initialization.

use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "info";

/// Installs a formatting subscriber filtered by `RUST_LOG`, `info` by default.
///
/// # Returns
///
/// `false` if a global subscriber was already installed; the call is then a no-op.
pub fn init() -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).try_init().is_ok()
}

/// Installs a subscriber writing through the test harness capture.
pub fn init_for_tests() -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("debug"))
        .with_test_writer()
        .try_init()
        .is_ok()
}
