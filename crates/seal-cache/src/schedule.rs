#![forbid(unsafe_code)]

//! Periodic expiry sweeps driven by the host.
//!
//! Nothing here owns a timer. The host calls `tick()` on each cache from
//! whatever scheduler it has (`setInterval`, a frame loop, a test), and the
//! cache consults its [`SweepSchedule`] to decide whether a sweep is due.

use core::time::Duration;
use std::fmt;

/// Which cache a report refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKind {
    Font,
    GlyphImage,
}

impl fmt::Display for CacheKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Font => f.write_str("font"),
            Self::GlyphImage => f.write_str("glyph-image"),
        }
    }
}

/// Outcome of one expiry sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub cache: CacheKind,
    pub removed: usize,
}

impl SweepReport {
    /// Whether the host should surface an "N stale entries cleaned" notice.
    #[must_use]
    pub fn is_noteworthy(&self) -> bool {
        self.removed > 0
    }
}

/// Fixed-period schedule measured on a monotonic clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepSchedule {
    period: Duration,
    next_due: Duration,
}

impl SweepSchedule {
    /// First sweep becomes due one `period` after `now`.
    #[must_use]
    pub fn new(period: Duration, now: Duration) -> Self {
        Self {
            period,
            next_due: now.saturating_add(period),
        }
    }

    #[must_use]
    pub fn period(&self) -> Duration {
        self.period
    }

    #[must_use]
    pub fn next_due(&self) -> Duration {
        self.next_due
    }

    /// Returns `true` if a sweep is due at `now`, re-arming for `now + period`.
    ///
    /// Missed periods collapse into one sweep; there is no catch-up burst.
    pub fn poll(&mut self, now: Duration) -> bool {
        if now < self.next_due {
            return false;
        }
        self.next_due = now.saturating_add(self.period);
        true
    }
}
