//! Internal logging bootstrap for Hypertree.
//!
//! This module initializes the tracing configuration at startup when the
//! `setup_tracing` feature is enabled. The logging behavior is controlled by
//! the `DEBUG_HYPERTREE` environment variable. If `DEBUG_HYPERTREE` is not set
//! or is set to a falsy value ("0", "false", or empty), logging remains
//! disabled. Otherwise, logging is enabled with a maximum level of DEBUG.

use ctor::ctor;
use tracing::Level;

#[ctor]
fn set_debug_level() {
    // If DEBUG_HYPERTREE is not set or set to a falsy value, disable logging.
    // Otherwise, initialize a debug-level subscriber.
    if std::env::var("DEBUG_HYPERTREE").map_or(true, |v| v == "0" || v == "false" || v.is_empty()) {
        // Logging macros stay silent without a subscriber.
    } else {
        tracing_subscriber::fmt()
            .with_max_level(Level::DEBUG)
            .init();
    }
}
