//! Logging utilities for planx
//!
//! The builder and memo emit `tracing` events under the `planx::builder` and
//! `planx::memo` targets. These helpers install a subscriber for them.

#[cfg(feature = "logging")]
use tracing_subscriber::{EnvFilter, fmt};

/// Target used by statement compilation events.
pub const BUILDER_TARGET: &str = "planx::builder";

/// Target used by memo events.
pub const MEMO_TARGET: &str = "planx::memo";

/// Initialize logging with default settings
///
/// # Environment Variables
/// - `RUST_LOG` - Log level filter (default: "info")
///
/// # Example
/// ```rust
/// planx_core::logging::init();
/// ```
#[cfg(feature = "logging")]
pub fn init() {
    init_with_level("info")
}

/// Initialize logging with a specific level
///
/// # Example
/// ```rust
/// planx_core::logging::init_with_level("planx::memo=trace");
/// ```
#[cfg(feature = "logging")]
pub fn init_with_level(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_line_number(true)
        .try_init();
}

/// Initialize logging for tests
///
/// Writes through the test harness so output is captured per test.
#[cfg(feature = "logging")]
pub fn init_test() {
    let _ = fmt()
        .with_env_filter(EnvFilter::new("planx=trace"))
        .with_test_writer()
        .try_init();
}

// Stub implementations when logging feature is disabled
#[cfg(not(feature = "logging"))]
pub fn init() {}

#[cfg(not(feature = "logging"))]
pub fn init_with_level(_level: &str) {}

#[cfg(not(feature = "logging"))]
pub fn init_test() {}
