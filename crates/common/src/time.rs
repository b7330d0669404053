//! Wall-clock helpers

use std::time::{SystemTime, UNIX_EPOCH};

/// Current unix time in milliseconds.
///
/// Clamps to zero if the system clock is set before the epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
