use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::{AccountId, SubLessonId};

//
// ─── ERRORS ───────────────────────────────────────────────────────────────────
//

/// Reasons a performance event is rejected before it reaches the engine.
#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum EventError {
    #[error("accuracy must be within 0..=100, got {provided}")]
    AccuracyOutOfRange { provided: f64 },
    #[error("wpm must be a finite non-negative number, got {provided}")]
    InvalidWpm { provided: f64 },
    #[error("star count must be within 0..=3, got {provided}")]
    InvalidStars { provided: u8 },
}

//
// ─── STARS ────────────────────────────────────────────────────────────────────
//

/// Lesson rating earned from accuracy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Stars(u8);

impl Stars {
    pub const MAX: u8 = 3;
    pub const NONE: Stars = Stars(0);

    /// # Errors
    ///
    /// Returns `EventError::InvalidStars` if `value > 3`.
    pub fn new(value: u8) -> Result<Self, EventError> {
        if value <= Self::MAX {
            Ok(Self(value))
        } else {
            Err(EventError::InvalidStars { provided: value })
        }
    }

    /// 95% and above earns three stars, 90% two, 85% one.
    #[must_use]
    pub fn from_accuracy(accuracy: f64) -> Self {
        if accuracy >= 95.0 {
            Self(3)
        } else if accuracy >= 90.0 {
            Self(2)
        } else if accuracy >= 85.0 {
            Self(1)
        } else {
            Self(0)
        }
    }

    #[must_use]
    pub fn value(self) -> u8 {
        self.0
    }

    #[must_use]
    pub fn is_perfect(self) -> bool {
        self.0 == Self::MAX
    }
}

impl TryFrom<u8> for Stars {
    type Error = EventError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Stars> for u8 {
    fn from(stars: Stars) -> Self {
        stars.0
    }
}

//
// ─── PERFORMANCE EVENT ────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Lesson {
        sub_lesson_id: SubLessonId,
        stars: Stars,
    },
    SpeedTest {
        mistakes: u32,
    },
}

/// One practice attempt, validated on construction.
#[derive(Debug, Clone, PartialEq)]
pub struct PerformanceEvent {
    account_id: AccountId,
    kind: EventKind,
    wpm: f64,
    accuracy: f64,
    duration_seconds: u32,
    occurred_at: DateTime<Utc>,
}

fn check_metrics(wpm: f64, accuracy: f64) -> Result<(), EventError> {
    if !wpm.is_finite() || wpm < 0.0 {
        return Err(EventError::InvalidWpm { provided: wpm });
    }
    if !(0.0..=100.0).contains(&accuracy) {
        return Err(EventError::AccuracyOutOfRange { provided: accuracy });
    }
    Ok(())
}

impl PerformanceEvent {
    /// Lesson attempt; stars are derived from `accuracy`.
    ///
    /// # Errors
    ///
    /// Returns `EventError` if `wpm` is negative or non-finite, or `accuracy`
    /// lies outside `0..=100`.
    pub fn lesson(
        account_id: AccountId,
        sub_lesson_id: SubLessonId,
        wpm: f64,
        accuracy: f64,
        duration_seconds: u32,
        occurred_at: DateTime<Utc>,
    ) -> Result<Self, EventError> {
        check_metrics(wpm, accuracy)?;
        Ok(Self {
            account_id,
            kind: EventKind::Lesson {
                sub_lesson_id,
                stars: Stars::from_accuracy(accuracy),
            },
            wpm,
            accuracy,
            duration_seconds,
            occurred_at,
        })
    }

    /// Timed speed test.
    ///
    /// # Errors
    ///
    /// Same validation as [`PerformanceEvent::lesson`].
    pub fn speed_test(
        account_id: AccountId,
        wpm: f64,
        accuracy: f64,
        duration_seconds: u32,
        mistakes: u32,
        occurred_at: DateTime<Utc>,
    ) -> Result<Self, EventError> {
        check_metrics(wpm, accuracy)?;
        Ok(Self {
            account_id,
            kind: EventKind::SpeedTest { mistakes },
            wpm,
            accuracy,
            duration_seconds,
            occurred_at,
        })
    }

    /// Rehydrate a stored lesson attempt, keeping its recorded star count.
    ///
    /// # Errors
    ///
    /// Same validation as [`PerformanceEvent::lesson`].
    pub fn lesson_from_persisted(
        account_id: AccountId,
        sub_lesson_id: SubLessonId,
        stars: Stars,
        wpm: f64,
        accuracy: f64,
        duration_seconds: u32,
        occurred_at: DateTime<Utc>,
    ) -> Result<Self, EventError> {
        check_metrics(wpm, accuracy)?;
        Ok(Self {
            account_id,
            kind: EventKind::Lesson {
                sub_lesson_id,
                stars,
            },
            wpm,
            accuracy,
            duration_seconds,
            occurred_at,
        })
    }

    #[must_use]
    pub fn account_id(&self) -> AccountId {
        self.account_id
    }

    #[must_use]
    pub fn kind(&self) -> EventKind {
        self.kind
    }

    #[must_use]
    pub fn is_lesson(&self) -> bool {
        matches!(self.kind, EventKind::Lesson { .. })
    }

    #[must_use]
    pub fn wpm(&self) -> f64 {
        self.wpm
    }

    #[must_use]
    pub fn accuracy(&self) -> f64 {
        self.accuracy
    }

    #[must_use]
    pub fn duration_seconds(&self) -> u32 {
        self.duration_seconds
    }

    /// Duration in fractional minutes.
    #[must_use]
    pub fn duration_minutes(&self) -> f64 {
        f64::from(self.duration_seconds) / 60.0
    }

    #[must_use]
    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    #[test]
    fn stars_follow_accuracy_thresholds() {
        assert_eq!(Stars::from_accuracy(100.0).value(), 3);
        assert_eq!(Stars::from_accuracy(95.0).value(), 3);
        assert_eq!(Stars::from_accuracy(94.9).value(), 2);
        assert_eq!(Stars::from_accuracy(90.0).value(), 2);
        assert_eq!(Stars::from_accuracy(85.0).value(), 1);
        assert_eq!(Stars::from_accuracy(84.99).value(), 0);
    }

    #[test]
    fn stars_reject_out_of_range() {
        assert!(matches!(
            Stars::new(4),
            Err(EventError::InvalidStars { provided: 4 })
        ));
    }

    #[test]
    fn lesson_event_derives_stars() {
        let event = PerformanceEvent::lesson(
            AccountId::new(1),
            SubLessonId::new(3),
            42.0,
            91.0,
            60,
            fixed_now(),
        )
        .unwrap();
        assert_eq!(
            event.kind(),
            EventKind::Lesson {
                sub_lesson_id: SubLessonId::new(3),
                stars: Stars::new(2).unwrap(),
            }
        );
        assert!(event.is_lesson());
    }

    #[test]
    fn event_rejects_bad_metrics() {
        let now = fixed_now();
        let err =
            PerformanceEvent::speed_test(AccountId::new(1), 50.0, 100.5, 60, 0, now).unwrap_err();
        assert!(matches!(err, EventError::AccuracyOutOfRange { .. }));

        let err =
            PerformanceEvent::speed_test(AccountId::new(1), -1.0, 90.0, 60, 0, now).unwrap_err();
        assert!(matches!(err, EventError::InvalidWpm { .. }));

        let err = PerformanceEvent::speed_test(AccountId::new(1), f64::NAN, 90.0, 60, 0, now)
            .unwrap_err();
        assert!(matches!(err, EventError::InvalidWpm { .. }));
    }

    #[test]
    fn duration_minutes_is_fractional() {
        let event = PerformanceEvent::speed_test(AccountId::new(1), 40.0, 90.0, 90, 2, fixed_now())
            .unwrap();
        assert!((event.duration_minutes() - 1.5).abs() < f64::EPSILON);
    }
}
