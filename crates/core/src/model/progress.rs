use chrono::{DateTime, Utc};

use crate::model::event::{EventKind, PerformanceEvent, Stars};
use crate::model::ids::{AccountId, SubLessonId};

//
// ─── LESSON PROGRESS ──────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressStatus {
    Completed,
}

impl ProgressStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ProgressStatus::Completed => "completed",
        }
    }
}

/// Best result an account has recorded for one sub-lesson.
#[derive(Debug, Clone, PartialEq)]
pub struct LessonProgress {
    pub account_id: AccountId,
    pub sub_lesson_id: SubLessonId,
    pub best_wpm: f64,
    pub best_accuracy: f64,
    pub stars: Stars,
    pub duration_seconds: u32,
    pub status: ProgressStatus,
    pub updated_at: DateTime<Utc>,
}

impl LessonProgress {
    /// Progress created by a first clear of the sub-lesson.
    #[must_use]
    pub fn first_clear(
        account_id: AccountId,
        sub_lesson_id: SubLessonId,
        event: &PerformanceEvent,
        stars: Stars,
    ) -> Self {
        Self {
            account_id,
            sub_lesson_id,
            best_wpm: event.wpm(),
            best_accuracy: event.accuracy(),
            stars,
            duration_seconds: event.duration_seconds(),
            status: ProgressStatus::Completed,
            updated_at: event.occurred_at(),
        }
    }

    /// True when the attempt beats the stored best on wpm or stars.
    #[must_use]
    pub fn is_improved_by(&self, wpm: f64, stars: Stars) -> bool {
        wpm > self.best_wpm || stars > self.stars
    }

    /// Merge an improving attempt into the stored best. Bests never regress.
    #[must_use]
    pub fn improved_with(&self, event: &PerformanceEvent, stars: Stars) -> Self {
        Self {
            best_wpm: self.best_wpm.max(event.wpm()),
            best_accuracy: self.best_accuracy.max(event.accuracy()),
            stars: self.stars.max(stars),
            duration_seconds: event.duration_seconds(),
            status: ProgressStatus::Completed,
            updated_at: event.occurred_at(),
            ..self.clone()
        }
    }
}

//
// ─── EVENT RECORD ─────────────────────────────────────────────────────────────
//

/// Append-only history row for a processed event.
#[derive(Debug, Clone, PartialEq)]
pub struct EventRecord {
    pub event: PerformanceEvent,
    pub first_clear: bool,
    pub xp_awarded: u64,
}

impl EventRecord {
    #[must_use]
    pub fn new(event: PerformanceEvent, first_clear: bool, xp_awarded: u64) -> Self {
        Self {
            event,
            first_clear,
            xp_awarded,
        }
    }

    #[must_use]
    pub fn sub_lesson_id(&self) -> Option<SubLessonId> {
        match self.event.kind() {
            EventKind::Lesson { sub_lesson_id, .. } => Some(sub_lesson_id),
            EventKind::SpeedTest { .. } => None,
        }
    }
}
