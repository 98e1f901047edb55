//! Pinned clock for event history tests.
//!
//! Recorded events carry the clock's reading, so tests that compare records
//! or serialized histories pin it to [`FixedClock::session_start`].

use chrono::{DateTime, TimeZone, Utc};
use lockstep_core::clock::Clock;

/// A clock stuck at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedClock(pub DateTime<Utc>);

impl FixedClock {
    /// The instant the shared fixtures start their sessions at,
    /// 2026-01-15 10:00:00 UTC.
    ///
    /// # Panics
    ///
    /// Never in practice; the date is a valid constant.
    #[must_use]
    pub fn session_start() -> Self {
        Self(Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap())
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}
