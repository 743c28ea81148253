use serde::{Deserialize, Serialize};

use crate::model::progress::EventRecord;

/// Label shown when a single event completes more than one quest.
pub const COMBO_QUEST_TEXT: &str = "Quest combo!";

//
// ─── QUEST KIND ───────────────────────────────────────────────────────────────
//

/// Daily objectives. Each one pays out at most once per account per day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestKind {
    /// Cumulative lesson practice time crosses the daily target.
    PracticeTime,
    /// The Nth first-clear lesson of the day.
    FirstClears,
    /// First lesson of the day at or above the accuracy target.
    Accuracy,
}

impl QuestKind {
    #[must_use]
    pub fn text(self) -> &'static str {
        match self {
            QuestKind::PracticeTime => "Practice for 15 minutes today",
            QuestKind::FirstClears => "Clear 3 new lessons today",
            QuestKind::Accuracy => "Finish a lesson with 95% accuracy",
        }
    }
}

/// Quest thresholds, usually taken from `ProgressionRules`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuestTargets {
    pub practice_seconds: u64,
    pub first_clears: u32,
    pub accuracy: f64,
}

//
// ─── DAILY QUEST STATE ────────────────────────────────────────────────────────
//

/// Aggregates over one day of lesson attempts. Derived per request, never stored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DailyQuestState {
    pub lessons_completed: u32,
    pub first_clears: u32,
    pub practice_seconds: u64,
    pub high_accuracy_lessons: u32,
}

impl DailyQuestState {
    /// Aggregate the lesson attempts in `records`. Speed tests are ignored.
    #[must_use]
    pub fn from_history<'a>(
        records: impl IntoIterator<Item = &'a EventRecord>,
        targets: &QuestTargets,
    ) -> Self {
        records
            .into_iter()
            .fold(Self::default(), |state, record| state.with(record, targets))
    }

    /// State after also counting `record`.
    #[must_use]
    pub fn with(self, record: &EventRecord, targets: &QuestTargets) -> Self {
        if !record.event.is_lesson() {
            return self;
        }
        Self {
            lessons_completed: self.lessons_completed.saturating_add(1),
            first_clears: self
                .first_clears
                .saturating_add(u32::from(record.first_clear)),
            practice_seconds: self
                .practice_seconds
                .saturating_add(u64::from(record.event.duration_seconds())),
            high_accuracy_lessons: self.high_accuracy_lessons.saturating_add(u32::from(
                record.event.accuracy() >= targets.accuracy,
            )),
        }
    }
}

/// Quests whose threshold is crossed between `before` and `after`, where
/// `after` is `before` plus `current`.
///
/// The exact-count checks make each quest fire on exactly one event per day.
#[must_use]
pub fn crossed_quests(
    before: &DailyQuestState,
    after: &DailyQuestState,
    current: &EventRecord,
    targets: &QuestTargets,
) -> Vec<QuestKind> {
    let mut fired = Vec::new();
    if !current.event.is_lesson() {
        return fired;
    }

    if before.practice_seconds < targets.practice_seconds
        && after.practice_seconds >= targets.practice_seconds
    {
        fired.push(QuestKind::PracticeTime);
    }
    if current.first_clear && after.first_clears == targets.first_clears {
        fired.push(QuestKind::FirstClears);
    }
    if current.event.accuracy() >= targets.accuracy && after.high_accuracy_lessons == 1 {
        fired.push(QuestKind::Accuracy);
    }
    fired
}

//
// ─── COMPLETION ───────────────────────────────────────────────────────────────
//

/// Display payload for the quests completed by one event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestCompletion {
    pub text: String,
    pub xp: u64,
}

impl QuestCompletion {
    /// Combines fired quests into one label; `None` when nothing fired.
    #[must_use]
    pub fn from_fired(fired: &[QuestKind], reward_each: u64) -> Option<Self> {
        let text = match fired {
            [] => return None,
            [single] => single.text().to_owned(),
            _ => COMBO_QUEST_TEXT.to_owned(),
        };
        let count = u64::try_from(fired.len()).unwrap_or(u64::MAX);
        Some(Self {
            text,
            xp: reward_each.saturating_mul(count),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::event::PerformanceEvent;
    use crate::model::ids::{AccountId, SubLessonId};
    use crate::time::fixed_now;

    const TARGETS: QuestTargets = QuestTargets {
        practice_seconds: 900,
        first_clears: 3,
        accuracy: 95.0,
    };

    fn lesson(accuracy: f64, seconds: u32, first_clear: bool) -> EventRecord {
        let event = PerformanceEvent::lesson(
            AccountId::new(1),
            SubLessonId::new(1),
            40.0,
            accuracy,
            seconds,
            fixed_now(),
        )
        .unwrap();
        EventRecord::new(event, first_clear, 0)
    }

    fn speed_test(seconds: u32) -> EventRecord {
        let event =
            PerformanceEvent::speed_test(AccountId::new(1), 40.0, 99.0, seconds, 0, fixed_now())
                .unwrap();
        EventRecord::new(event, false, 0)
    }

    fn fire(history: &[EventRecord], current: &EventRecord) -> Vec<QuestKind> {
        let before = DailyQuestState::from_history(history, &TARGETS);
        let after = before.with(current, &TARGETS);
        crossed_quests(&before, &after, current, &TARGETS)
    }

    #[test]
    fn aggregates_only_lessons() {
        let history = vec![lesson(96.0, 300, true), speed_test(600), lesson(80.0, 200, false)];
        let state = DailyQuestState::from_history(&history, &TARGETS);
        assert_eq!(state.lessons_completed, 2);
        assert_eq!(state.first_clears, 1);
        assert_eq!(state.practice_seconds, 500);
        assert_eq!(state.high_accuracy_lessons, 1);
    }

    #[test]
    fn practice_quest_fires_once_when_crossing() {
        let mut history = vec![lesson(80.0, 800, false)];
        let crossing = lesson(80.0, 200, false);
        assert_eq!(fire(&history, &crossing), vec![QuestKind::PracticeTime]);

        history.push(crossing);
        assert!(fire(&history, &lesson(80.0, 300, false)).is_empty());
    }

    #[test]
    fn practice_quest_fires_on_exact_target() {
        let history = vec![lesson(80.0, 600, false)];
        assert_eq!(
            fire(&history, &lesson(80.0, 300, false)),
            vec![QuestKind::PracticeTime]
        );
    }

    #[test]
    fn first_clear_quest_needs_third_first_clear() {
        let history = vec![lesson(80.0, 10, true), lesson(80.0, 10, false), lesson(80.0, 10, true)];
        assert_eq!(fire(&history, &lesson(80.0, 10, true)), vec![QuestKind::FirstClears]);
        // Third lesson of the day that is not a first clear does not count.
        assert!(fire(&history[..2], &lesson(80.0, 10, false)).is_empty());
    }

    #[test]
    fn accuracy_quest_only_for_first_high_accuracy_lesson() {
        assert_eq!(fire(&[], &lesson(95.0, 10, false)), vec![QuestKind::Accuracy]);
        let history = vec![lesson(97.0, 10, false)];
        assert!(fire(&history, &lesson(99.0, 10, false)).is_empty());
    }

    #[test]
    fn speed_tests_never_fire_quests() {
        assert!(fire(&[], &speed_test(1200)).is_empty());
    }

    #[test]
    fn completion_uses_combo_label_for_multiple_quests() {
        assert_eq!(QuestCompletion::from_fired(&[], 100), None);

        let single = QuestCompletion::from_fired(&[QuestKind::Accuracy], 100).unwrap();
        assert_eq!(single.text, QuestKind::Accuracy.text());
        assert_eq!(single.xp, 100);

        let combo =
            QuestCompletion::from_fired(&[QuestKind::PracticeTime, QuestKind::Accuracy], 100)
                .unwrap();
        assert_eq!(combo.text, COMBO_QUEST_TEXT);
        assert_eq!(combo.xp, 200);
    }
}
