use std::sync::Arc;

use chrono::{DateTime, FixedOffset, Utc};

use storage::repository::{
    AccountRepository, ActivityRepository, LessonProgressRepository, ProgressionCommit,
    ProgressionPersistence, Storage,
};
use typing_core::model::{Account, AccountId, PerformanceEvent};
use typing_core::progression::{ProgressionRules, evaluate_lesson, evaluate_speed_test};
use typing_core::rank::derive_rank_display;
use typing_core::time::{Clock, DEFAULT_UTC_OFFSET_HOURS, DayWindow, offset_from_hours};

use crate::api::{
    LeaderboardEntry, LessonPayload, LessonProgressView, RankSummary, SaveResponse,
    SpeedTestPayload,
};
use crate::error::ServiceError;
use crate::rate_limit::{RateLimitDecision, SubmissionLimiter, SubmissionQuota};

/// Largest page the leaderboard will return.
pub const MAX_LEADERBOARD_LIMIT: u32 = 100;

//
// ─── SERVICE ───────────────────────────────────────────────────────────────────
//

/// Handles practice submissions: loads state, runs the progression engine,
/// and commits the result as one unit.
#[derive(Clone)]
pub struct ProgressionService {
    clock: Clock,
    rules: ProgressionRules,
    day_offset: FixedOffset,
    accounts: Arc<dyn AccountRepository>,
    progress: Arc<dyn LessonProgressRepository>,
    activity: Arc<dyn ActivityRepository>,
    progression: Arc<dyn ProgressionPersistence>,
    limiter: Option<Arc<SubmissionLimiter>>,
    quota: Option<SubmissionQuota>,
}

impl ProgressionService {
    #[must_use]
    pub fn new(clock: Clock, storage: &Storage) -> Self {
        Self {
            clock,
            rules: ProgressionRules::default(),
            day_offset: offset_from_hours(DEFAULT_UTC_OFFSET_HOURS),
            accounts: Arc::clone(&storage.accounts),
            progress: Arc::clone(&storage.progress),
            activity: Arc::clone(&storage.activity),
            progression: Arc::clone(&storage.progression),
            limiter: None,
            quota: None,
        }
    }

    #[must_use]
    pub fn with_rules(mut self, rules: ProgressionRules) -> Self {
        self.rules = rules;
        self
    }

    /// Offset used to decide where a calendar day starts for daily quests.
    #[must_use]
    pub fn with_day_offset(mut self, offset: FixedOffset) -> Self {
        self.day_offset = offset;
        self
    }

    #[must_use]
    pub fn with_limiter(mut self, limiter: Arc<SubmissionLimiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    /// Enforce a submission quota against stored history. Unlike the
    /// in-memory limiter this holds across service instances on one store.
    #[must_use]
    pub fn with_quota(mut self, quota: SubmissionQuota) -> Self {
        self.quota = Some(quota);
        self
    }

    /// Override the clock (usually for deterministic testing).
    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    #[must_use]
    pub fn rules(&self) -> &ProgressionRules {
        &self.rules
    }

    /// Create a fresh account with zero experience.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Conflict` if the id is already taken.
    pub async fn register_account(&self, id: AccountId) -> Result<RankSummary, ServiceError> {
        let account = Account::register(id, self.now());
        self.accounts.create_account(&account).await?;
        tracing::info!(account = %id, "account registered");
        Ok(summary_for(&account))
    }

    /// Score and persist a completed lesson attempt.
    ///
    /// # Errors
    ///
    /// - `Unauthorized` when `identity` is `None`.
    /// - `RateLimited` when the account submitted too often.
    /// - `NotFound` when the account does not exist.
    /// - `InvalidInput` for out-of-range metrics.
    /// - `Conflict` if the account changed concurrently; nothing is written.
    /// - `InternalFailure` when storage is unavailable; nothing is written.
    pub async fn save_lesson(
        &self,
        identity: Option<AccountId>,
        payload: &LessonPayload,
    ) -> Result<SaveResponse, ServiceError> {
        let account_id = identity.ok_or(ServiceError::Unauthorized)?;
        let now = self.now();
        self.check_rate(account_id, now).await?;

        let account = self.accounts.get_account(account_id).await?;
        let event = PerformanceEvent::lesson(
            account_id,
            payload.sub_lesson_id,
            payload.wpm,
            payload.accuracy,
            payload.duration_seconds,
            now,
        )
        .inspect_err(|err| {
            tracing::warn!(account = %account_id, %err, "lesson rejected");
        })?;

        let prior = self
            .progress
            .get_progress(account_id, payload.sub_lesson_id)
            .await?;
        let day = DayWindow::containing(now, self.day_offset);
        let todays_events = self
            .activity
            .events_between(account_id, day.start, day.end)
            .await?;

        let evaluation = evaluate_lesson(
            &self.rules,
            &account,
            prior.as_ref(),
            &event,
            &todays_events,
        )?;

        if !evaluation.quests.is_empty() {
            tracing::info!(
                account = %account_id,
                quests = ?evaluation.quests,
                "daily quests completed"
            );
        }

        self.progression
            .commit(ProgressionCommit::new(
                &account,
                evaluation.account.clone(),
                evaluation.progress.clone(),
                evaluation.record.clone(),
            ))
            .await
            .inspect_err(|err| {
                tracing::error!(account = %account_id, %err, "lesson commit failed");
            })?;

        tracing::info!(
            account = %account_id,
            sub_lesson = %payload.sub_lesson_id,
            outcome = ?evaluation.outcome,
            new_high_score = evaluation.is_new_high_score(),
            earned_xp = evaluation.earned_xp,
            total_xp = evaluation.account.experience(),
            "lesson saved"
        );

        Ok(SaveResponse::new(
            evaluation.earned_xp,
            evaluation.account.experience(),
            evaluation.breakdown,
            evaluation.completed_quest,
        ))
    }

    /// Score and persist a timed speed test.
    ///
    /// # Errors
    ///
    /// Same as [`ProgressionService::save_lesson`]; a speed above the
    /// configured cap is `InvalidInput` and leaves the account untouched.
    pub async fn save_speed_test(
        &self,
        identity: Option<AccountId>,
        payload: &SpeedTestPayload,
    ) -> Result<SaveResponse, ServiceError> {
        let account_id = identity.ok_or(ServiceError::Unauthorized)?;
        let now = self.now();
        self.check_rate(account_id, now).await?;

        let account = self.accounts.get_account(account_id).await?;
        let event = PerformanceEvent::speed_test(
            account_id,
            payload.wpm,
            payload.accuracy,
            payload.duration_seconds,
            payload.mistakes,
            now,
        )?;

        let evaluation = evaluate_speed_test(&self.rules, &account, &event).inspect_err(
            |err| tracing::warn!(account = %account_id, %err, "speed test rejected"),
        )?;

        self.progression
            .commit(ProgressionCommit::new(
                &account,
                evaluation.account.clone(),
                None,
                evaluation.record,
            ))
            .await
            .inspect_err(|err| {
                tracing::error!(account = %account_id, %err, "speed test commit failed");
            })?;

        tracing::info!(
            account = %account_id,
            earned_xp = evaluation.earned_xp,
            total_xp = evaluation.account.experience(),
            "speed test saved"
        );

        Ok(SaveResponse::new(
            evaluation.earned_xp,
            evaluation.account.experience(),
            evaluation.breakdown,
            None,
        ))
    }

    /// Current rank display for one account.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::NotFound` if the account does not exist.
    pub async fn rank_summary(&self, account_id: AccountId) -> Result<RankSummary, ServiceError> {
        let account = self.accounts.get_account(account_id).await?;
        Ok(summary_for(&account))
    }

    /// Per-lesson bests for one account, ordered by sub-lesson.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::NotFound` if the account does not exist.
    pub async fn lesson_progress(
        &self,
        account_id: AccountId,
    ) -> Result<Vec<LessonProgressView>, ServiceError> {
        self.accounts.get_account(account_id).await?;
        let rows = self.progress.progress_for_account(account_id).await?;
        Ok(rows.iter().map(LessonProgressView::from).collect())
    }

    /// Accounts ordered by experience, highest first. `limit` is clamped to
    /// `1..=MAX_LEADERBOARD_LIMIT`.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::InternalFailure` if storage cannot be read.
    pub async fn leaderboard(&self, limit: u32) -> Result<Vec<LeaderboardEntry>, ServiceError> {
        let limit = limit.clamp(1, MAX_LEADERBOARD_LIMIT);
        let accounts = self.accounts.leaderboard(limit).await?;
        Ok(accounts
            .iter()
            .zip(1_u32..)
            .map(|(account, position)| LeaderboardEntry {
                position,
                account_id: account.id(),
                experience: account.experience(),
                rank: derive_rank_display(account.experience()),
            })
            .collect())
    }

    async fn check_rate(
        &self,
        account_id: AccountId,
        now: DateTime<Utc>,
    ) -> Result<(), ServiceError> {
        if let Some(limiter) = self.limiter.as_ref() {
            reject_if_limited(account_id, limiter.try_acquire(account_id, now))?;
        }
        if let Some(quota) = self.quota {
            let recent = self
                .activity
                .submission_times_since(account_id, quota.window_start(now))
                .await?;
            reject_if_limited(account_id, quota.check(&recent, now))?;
        }
        Ok(())
    }
}

fn reject_if_limited(
    account_id: AccountId,
    decision: RateLimitDecision,
) -> Result<(), ServiceError> {
    match decision {
        RateLimitDecision::Allowed { .. } => Ok(()),
        RateLimitDecision::Limited { retry_after } => {
            let retry_after_secs = u64::try_from(retry_after.num_seconds())
                .unwrap_or(0)
                .max(1);
            tracing::warn!(account = %account_id, retry_after_secs, "submission rate limited");
            Err(ServiceError::RateLimited { retry_after_secs })
        }
    }
}

fn summary_for(account: &Account) -> RankSummary {
    RankSummary {
        account_id: account.id(),
        experience: account.experience(),
        star_count: account.star_count(),
        rank: derive_rank_display(account.experience()),
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
