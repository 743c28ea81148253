use chrono::{DateTime, Duration, FixedOffset, NaiveTime, Offset, Utc};

/// A simple clock abstraction for deterministic time in services and tests.
#[derive(Debug, Clone, Copy, Default)]
pub enum Clock {
    #[default]
    Default,
    Fixed(DateTime<Utc>),
}

impl Clock {
    /// Returns a clock that uses the current system time.
    #[must_use]
    pub fn default_clock() -> Self {
        Self::Default
    }

    /// Returns a clock fixed at the given timestamp.
    #[must_use]
    pub fn fixed(at: DateTime<Utc>) -> Self {
        Self::Fixed(at)
    }

    /// Returns the current time according to the clock.
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        match self {
            Clock::Default => Utc::now(),
            Clock::Fixed(t) => *t,
        }
    }

    /// If this is a fixed clock, advance it by the given duration.
    ///
    /// Has no effect on `Clock::Default`.
    pub fn advance(&mut self, delta: Duration) {
        if let Clock::Fixed(t) = self {
            *t += delta;
        }
    }

    /// Returns true if this clock is fixed.
    #[must_use]
    pub fn is_fixed(&self) -> bool {
        matches!(self, Clock::Fixed(_))
    }
}

/// Offset used for calendar-day boundaries when none is configured (UTC+07:00).
pub const DEFAULT_UTC_OFFSET_HOURS: i32 = 7;

/// Builds a fixed offset from whole hours, falling back to UTC when out of range.
#[must_use]
pub fn offset_from_hours(hours: i32) -> FixedOffset {
    hours
        .checked_mul(3600)
        .and_then(FixedOffset::east_opt)
        .unwrap_or_else(|| Utc.fix())
}

//
// ─── DAY WINDOW ────────────────────────────────────────────────────────────────
//

/// Half-open `[start, end)` range covering one local calendar day.
///
/// Daily quests are evaluated against the events that fall inside the window
/// containing the submission time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DayWindow {
    /// Returns the local calendar day (in `offset`) that contains `at`.
    #[must_use]
    pub fn containing(at: DateTime<Utc>, offset: FixedOffset) -> Self {
        let local_date = at.with_timezone(&offset).date_naive();
        let local_midnight = local_date.and_time(NaiveTime::MIN).and_utc();
        let start = local_midnight - Duration::seconds(i64::from(offset.local_minus_utc()));
        Self {
            start,
            end: start + Duration::days(1),
        }
    }
}

/// Deterministic timestamp for tests and examples (2023-11-14T22:13:20Z).
pub const FIXED_TEST_TIMESTAMP: i64 = 1_700_000_000;

/// Returns a deterministic `DateTime<Utc>` for tests and doc examples.
///
/// # Panics
///
/// Panics if the fixed timestamp cannot be represented.
#[must_use]
pub fn fixed_now() -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(FIXED_TEST_TIMESTAMP, 0)
        .expect("fixed timestamp should be valid")
}

/// Returns a `Clock` fixed at the deterministic test timestamp.
#[must_use]
pub fn fixed_clock() -> Clock {
    Clock::fixed(fixed_now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn fixed_clock_advances() {
        let mut clock = fixed_clock();
        clock.advance(Duration::minutes(5));
        assert_eq!(clock.now(), fixed_now() + Duration::minutes(5));
        assert!(clock.is_fixed());
    }

    #[test]
    fn default_clock_ignores_advance() {
        let mut clock = Clock::default_clock();
        clock.advance(Duration::days(1));
        assert!(!clock.is_fixed());
    }

    #[test]
    fn day_window_uses_local_midnight() {
        // 2023-11-14T22:13:20Z is 2023-11-15T05:13:20 in UTC+7.
        let window = DayWindow::containing(fixed_now(), offset_from_hours(7));
        assert_eq!(
            window.start,
            Utc.with_ymd_and_hms(2023, 11, 14, 17, 0, 0).unwrap()
        );
        assert_eq!(window.end, Utc.with_ymd_and_hms(2023, 11, 15, 17, 0, 0).unwrap());
        assert!(window.start <= fixed_now() && fixed_now() < window.end);
    }

    #[test]
    fn day_window_in_utc() {
        let window = DayWindow::containing(fixed_now(), offset_from_hours(0));
        assert_eq!(window.start, Utc.with_ymd_and_hms(2023, 11, 14, 0, 0, 0).unwrap());
    }

    #[test]
    fn out_of_range_offset_falls_back_to_utc() {
        assert_eq!(offset_from_hours(48).local_minus_utc(), 0);
        assert_eq!(offset_from_hours(-5).local_minus_utc(), -5 * 3600);
    }
}
