//! Progression engine: turns one performance event into experience, rank and
//! star changes for an account.
//!
//! Evaluation is pure. Callers load the account, the stored progress for the
//! sub-lesson and the day's earlier events, then persist everything the
//! evaluation returns as one unit.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::quest::crossed_quests;
use crate::model::{
    Account, AccountId, DailyQuestState, EventKind, EventRecord, LessonProgress, PerformanceEvent,
    QuestCompletion, QuestKind, QuestTargets, Stars,
};
use crate::rank::{LESSON_RANKS, SPEED_TEST_RANKS};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum ProgressionError {
    #[error("wpm {provided} exceeds the allowed maximum of {max}")]
    WpmTooHigh { provided: f64, max: f64 },
    #[error("expected a {expected} event")]
    WrongEventKind { expected: &'static str },
    #[error("event for account {event} cannot be applied to account {account}")]
    AccountMismatch { account: AccountId, event: AccountId },
    #[error("stored progress does not match the submitted sub-lesson")]
    ProgressMismatch,
}

//
// ─── RULES ─────────────────────────────────────────────────────────────────────
//

/// Tunable constants of the lesson and quest economy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressionRules {
    pub first_clear_xp: u64,
    pub star_xp: u64,
    pub perfect_star_xp: u64,
    pub improvement_xp: u64,
    pub min_lesson_xp: u64,
    pub quest_xp: u64,
    pub practice_quest_seconds: u64,
    pub first_clear_quest_count: u32,
    pub accuracy_quest_threshold: f64,
    pub max_speed_test_wpm: f64,
}

impl Default for ProgressionRules {
    fn default() -> Self {
        Self {
            first_clear_xp: 20,
            star_xp: 10,
            perfect_star_xp: 40,
            improvement_xp: 15,
            min_lesson_xp: 10,
            quest_xp: 100,
            practice_quest_seconds: 900,
            first_clear_quest_count: 3,
            accuracy_quest_threshold: 95.0,
            max_speed_test_wpm: 300.0,
        }
    }
}

impl ProgressionRules {
    #[must_use]
    pub fn quest_targets(&self) -> QuestTargets {
        QuestTargets {
            practice_seconds: self.practice_quest_seconds,
            first_clears: self.first_clear_quest_count,
            accuracy: self.accuracy_quest_threshold,
        }
    }

    /// Three stars pay a flat bonus; fewer stars pay per star.
    #[must_use]
    pub fn star_bonus(&self, stars: Stars) -> u64 {
        if stars.is_perfect() {
            self.perfect_star_xp
        } else {
            self.star_xp.saturating_mul(u64::from(stars.value()))
        }
    }

    /// XP paid for clearing a sub-lesson for the first time.
    #[must_use]
    pub fn first_clear_award(&self, stars: Stars) -> u64 {
        self.first_clear_xp.saturating_add(self.star_bonus(stars))
    }
}

//
// ─── BREAKDOWN ─────────────────────────────────────────────────────────────────
//

/// Per-source split of the XP awarded for one event. Parts sum to the award.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct XpBreakdown {
    pub base: u64,
    pub quest: u64,
    pub wpm: u64,
    pub grinder: u64,
    pub first_win: u64,
}

impl XpBreakdown {
    #[must_use]
    pub fn total(&self) -> u64 {
        self.base
            .saturating_add(self.quest)
            .saturating_add(self.wpm)
            .saturating_add(self.grinder)
            .saturating_add(self.first_win)
    }
}

//
// ─── LESSON MODE ───────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LessonOutcome {
    /// No earlier clear (or only a zero-star one) for this sub-lesson.
    FirstClear,
    /// Beat the stored best on wpm or stars.
    Improvement,
    /// Equal or worse than the stored best; progress is left untouched.
    NoChange,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LessonEvaluation {
    pub outcome: LessonOutcome,
    pub earned_xp: u64,
    pub breakdown: XpBreakdown,
    pub quests: Vec<QuestKind>,
    pub completed_quest: Option<QuestCompletion>,
    pub star_delta: u32,
    pub account: Account,
    /// Progress row to upsert, if it changed.
    pub progress: Option<LessonProgress>,
    pub record: EventRecord,
}

impl LessonEvaluation {
    #[must_use]
    pub fn is_new_high_score(&self) -> bool {
        self.outcome == LessonOutcome::FirstClear
    }
}

/// Score a lesson attempt.
///
/// `todays_events` are the account's events earlier on the same calendar day;
/// they decide which daily quests this attempt completes.
///
/// # Errors
///
/// Returns `ProgressionError` if the event is not a lesson, belongs to a
/// different account, or `prior` was recorded for another sub-lesson.
pub fn evaluate_lesson(
    rules: &ProgressionRules,
    account: &Account,
    prior: Option<&LessonProgress>,
    event: &PerformanceEvent,
    todays_events: &[EventRecord],
) -> Result<LessonEvaluation, ProgressionError> {
    ensure_same_account(account, event)?;
    let EventKind::Lesson {
        sub_lesson_id,
        stars,
    } = event.kind()
    else {
        return Err(ProgressionError::WrongEventKind { expected: "lesson" });
    };
    if let Some(p) = prior {
        if p.account_id != account.id() || p.sub_lesson_id != sub_lesson_id {
            return Err(ProgressionError::ProgressMismatch);
        }
    }

    let (outcome, progress) = match prior {
        Some(p) if p.stars != Stars::NONE => {
            if p.is_improved_by(event.wpm(), stars) {
                (
                    LessonOutcome::Improvement,
                    Some(p.improved_with(event, stars)),
                )
            } else {
                (LessonOutcome::NoChange, None)
            }
        }
        _ => (
            LessonOutcome::FirstClear,
            Some(LessonProgress::first_clear(
                account.id(),
                sub_lesson_id,
                event,
                stars,
            )),
        ),
    };

    let prior_stars = prior.map_or(Stars::NONE, |p| p.stars);
    let star_delta = if progress.is_some() {
        u32::from(stars.value().saturating_sub(prior_stars.value()))
    } else {
        0
    };

    let mut breakdown = XpBreakdown::default();
    match outcome {
        LessonOutcome::FirstClear => breakdown.first_win = rules.first_clear_award(stars),
        LessonOutcome::Improvement => breakdown.base = rules.improvement_xp,
        LessonOutcome::NoChange => {}
    }

    let mut record = EventRecord::new(event.clone(), outcome == LessonOutcome::FirstClear, 0);
    let targets = rules.quest_targets();
    let before = DailyQuestState::from_history(todays_events, &targets);
    let after = before.with(&record, &targets);
    let quests = crossed_quests(&before, &after, &record, &targets);
    let completed_quest = QuestCompletion::from_fired(&quests, rules.quest_xp);
    breakdown.quest = completed_quest.as_ref().map_or(0, |q| q.xp);

    // Every completed attempt pays at least the floor; the top-up counts as base.
    let subtotal = breakdown.total();
    if subtotal < rules.min_lesson_xp {
        breakdown.base += rules.min_lesson_xp - subtotal;
    }
    let earned_xp = breakdown.total();
    record.xp_awarded = earned_xp;

    Ok(LessonEvaluation {
        outcome,
        earned_xp,
        breakdown,
        quests,
        completed_quest,
        star_delta,
        account: account.with_award(earned_xp, star_delta, &LESSON_RANKS),
        progress,
        record,
    })
}

//
// ─── SPEED TEST MODE ───────────────────────────────────────────────────────────
//

const SPEED_XP_PER_WPM_MINUTE: f64 = 1.0;

#[derive(Debug, Clone, PartialEq)]
pub struct SpeedTestEvaluation {
    pub earned_xp: u64,
    pub breakdown: XpBreakdown,
    pub account: Account,
    pub record: EventRecord,
}

fn accuracy_bonus_per_minute(accuracy: f64) -> f64 {
    if accuracy >= 98.0 {
        10.0
    } else if accuracy >= 95.0 {
        5.0
    } else {
        0.0
    }
}

fn accuracy_multiplier(accuracy: f64) -> f64 {
    if accuracy < 50.0 {
        0.0
    } else if accuracy < 85.0 {
        0.5
    } else {
        1.0
    }
}

fn endurance_bonus(minutes: f64) -> u64 {
    if minutes >= 5.0 {
        50
    } else if minutes >= 3.0 {
        20
    } else {
        0
    }
}

/// Rounds half away from zero; negative and non-finite values become zero.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn round_xp(value: f64) -> u64 {
    if value.is_finite() && value > 0.0 {
        value.round() as u64
    } else {
        0
    }
}

/// Score a timed speed test. Stars are never awarded in this mode.
///
/// # Errors
///
/// Returns `ProgressionError::WpmTooHigh` when the reported speed is above
/// `rules.max_speed_test_wpm`; nothing should be persisted in that case.
pub fn evaluate_speed_test(
    rules: &ProgressionRules,
    account: &Account,
    event: &PerformanceEvent,
) -> Result<SpeedTestEvaluation, ProgressionError> {
    ensure_same_account(account, event)?;
    if event.is_lesson() {
        return Err(ProgressionError::WrongEventKind {
            expected: "speed test",
        });
    }
    if event.wpm() > rules.max_speed_test_wpm {
        return Err(ProgressionError::WpmTooHigh {
            provided: event.wpm(),
            max: rules.max_speed_test_wpm,
        });
    }

    let minutes = event.duration_minutes();
    let speed_xp = (event.wpm() * SPEED_XP_PER_WPM_MINUTE * minutes).round();
    let accuracy_bonus = accuracy_bonus_per_minute(event.accuracy()) * minutes;
    let multiplier = accuracy_multiplier(event.accuracy());

    let raw_xp = round_xp((speed_xp + accuracy_bonus) * multiplier);
    let wpm_part = round_xp(speed_xp * multiplier).min(raw_xp);
    let breakdown = XpBreakdown {
        wpm: wpm_part,
        base: raw_xp - wpm_part,
        grinder: endurance_bonus(minutes),
        ..XpBreakdown::default()
    };
    let earned_xp = breakdown.total();

    Ok(SpeedTestEvaluation {
        earned_xp,
        breakdown,
        account: account.with_award(earned_xp, 0, &SPEED_TEST_RANKS),
        record: EventRecord::new(event.clone(), false, earned_xp),
    })
}

fn ensure_same_account(
    account: &Account,
    event: &PerformanceEvent,
) -> Result<(), ProgressionError> {
    if event.account_id() == account.id() {
        Ok(())
    } else {
        Err(ProgressionError::AccountMismatch {
            account: account.id(),
            event: event.account_id(),
        })
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
