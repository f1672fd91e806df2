//! Wall-clock access
//!
//! Expiry checks use UTC instants; the poll's day boundary is the local
//! calendar date.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, FixedOffset, Local, NaiveDate, Offset, Utc};

/// Source of the current time
pub trait Clock: Send + Sync {
    /// Current instant
    fn now(&self) -> DateTime<Utc>;

    /// Current calendar date in local time
    fn today(&self) -> NaiveDate {
        self.now().with_timezone(&Local).date_naive()
    }
}

/// The machine's real clock
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Hand-driven clock
///
/// Clones share the same underlying instant, so a test can keep one handle
/// and give another to the component under test.
#[derive(Clone, Debug)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
    /// Offset used to derive the "local" date
    offset: FixedOffset,
}

impl ManualClock {
    /// Start at `now`, deriving local dates in UTC
    pub fn new(now: DateTime<Utc>) -> Self {
        Self::with_offset(now, Utc.fix())
    }

    /// Start at `now`, deriving local dates at `offset`
    pub fn with_offset(now: DateTime<Utc>, offset: FixedOffset) -> Self {
        Self {
            now: Arc::new(Mutex::new(now)),
            offset,
        }
    }

    /// Move the clock forward
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }

    /// Jump to an absolute instant
    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn today(&self) -> NaiveDate {
        self.now().with_timezone(&self.offset).date_naive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    #[test]
    fn test_manual_clock_shares_time_between_clones() {
        let clock = ManualClock::new(at(2026, 3, 1, 9, 0));
        let handle = clock.clone();

        handle.advance(Duration::seconds(61));
        assert_eq!(clock.now(), at(2026, 3, 1, 9, 1) + Duration::seconds(1));
    }

    #[test]
    fn test_today_uses_configured_offset() {
        // 22:30 UTC is already the next day at UTC+5:30
        let ist = FixedOffset::east_opt(5 * 3600 + 1800).unwrap();
        let clock = ManualClock::with_offset(at(2026, 3, 1, 22, 30), ist);
        assert_eq!(clock.today(), NaiveDate::from_ymd_opt(2026, 3, 2).unwrap());

        let utc_clock = ManualClock::new(at(2026, 3, 1, 22, 30));
        assert_eq!(utc_clock.today(), NaiveDate::from_ymd_opt(2026, 3, 1).unwrap());
    }
}
