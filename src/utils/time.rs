//! Timestamp helpers.
//!
//! Archive records and game clock fields both measure time as a [`Duration`]
//! since the Unix epoch.

use crate::core::wire::PSOTIME_OFFSET;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Wall-clock time since the Unix epoch. A clock set before 1970 reads as zero.
pub fn now() -> Duration {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
}

/// Raw game clock value for a Unix time
pub fn to_psotime(time: Duration) -> u64 {
    (time.as_millis() as u64).wrapping_add(PSOTIME_OFFSET)
}

/// Unix time for a raw game clock value, `None` below the epoch
pub fn from_psotime(raw: u64) -> Option<Duration> {
    raw.checked_sub(PSOTIME_OFFSET).map(Duration::from_millis)
}
