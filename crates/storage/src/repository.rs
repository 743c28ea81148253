use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use typing_core::model::{Account, AccountId, EventRecord, LessonProgress, SubLessonId};

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Everything one evaluated event changes, written as a single unit.
///
/// The account row is only updated if its stored version still equals
/// `expected_version`; otherwise the whole commit is rejected with
/// `StorageError::Conflict` and nothing is written.
#[derive(Debug, Clone)]
pub struct ProgressionCommit {
    pub account: Account,
    pub expected_version: u64,
    pub progress: Option<LessonProgress>,
    pub record: EventRecord,
}

impl ProgressionCommit {
    /// Commit guarded by the version of `previous`, the account as it was loaded.
    #[must_use]
    pub fn new(
        previous: &Account,
        account: Account,
        progress: Option<LessonProgress>,
        record: EventRecord,
    ) -> Self {
        Self {
            account,
            expected_version: previous.version(),
            progress,
            record,
        }
    }
}

/// Repository contract for learner accounts.
#[async_trait]
pub trait AccountRepository: Send + Sync {
    /// Insert a newly registered account.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if the id is taken, or other storage errors.
    async fn create_account(&self, account: &Account) -> Result<(), StorageError>;

    /// Fetch an account by ID.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if missing, or other storage errors.
    async fn get_account(&self, id: AccountId) -> Result<Account, StorageError>;

    /// Accounts ordered by experience, highest first; ties by id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the query fails.
    async fn leaderboard(&self, limit: u32) -> Result<Vec<Account>, StorageError>;
}

#[async_trait]
pub trait LessonProgressRepository: Send + Sync {
    /// Best stored result for one sub-lesson, if any.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the lookup fails.
    async fn get_progress(
        &self,
        account_id: AccountId,
        sub_lesson_id: SubLessonId,
    ) -> Result<Option<LessonProgress>, StorageError>;

    /// All stored progress for an account, ordered by sub-lesson.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the query fails.
    async fn progress_for_account(
        &self,
        account_id: AccountId,
    ) -> Result<Vec<LessonProgress>, StorageError>;
}

#[async_trait]
pub trait ActivityRepository: Send + Sync {
    /// Lesson attempts and speed tests in `[start, end)`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the query fails.
    async fn events_between(
        &self,
        account_id: AccountId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<EventRecord>, StorageError>;

    /// Most recent speed tests first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the query fails.
    async fn speed_tests_for_account(
        &self,
        account_id: AccountId,
        limit: u32,
    ) -> Result<Vec<EventRecord>, StorageError>;

    /// Timestamps of every lesson attempt and speed test strictly after
    /// `since`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the query fails.
    async fn submission_times_since(
        &self,
        account_id: AccountId,
        since: DateTime<Utc>,
    ) -> Result<Vec<DateTime<Utc>>, StorageError>;
}

#[async_trait]
pub trait ProgressionPersistence: Send + Sync {
    /// Atomically update the account, upsert progress and append the event.
    ///
    /// Returns the id of the appended history row.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the account is gone,
    /// `StorageError::Conflict` if it changed since it was loaded, or other
    /// storage errors. Nothing is written on error.
    async fn commit(&self, commit: ProgressionCommit) -> Result<i64, StorageError>;
}

//
// ─── IN-MEMORY ─────────────────────────────────────────────────────────────────
//

#[derive(Default)]
struct MemoryState {
    accounts: HashMap<AccountId, Account>,
    progress: HashMap<(AccountId, SubLessonId), LessonProgress>,
    history: Vec<EventRecord>,
}

/// Simple in-memory repository implementation for testing and prototyping.
///
/// A single lock guards all tables, so a commit is atomic with respect to
/// every other call.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    state: Arc<Mutex<MemoryState>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, MemoryState>, StorageError> {
        self.state
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))
    }
}

#[async_trait]
impl AccountRepository for InMemoryRepository {
    async fn create_account(&self, account: &Account) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        if guard.accounts.contains_key(&account.id()) {
            return Err(StorageError::Conflict);
        }
        guard.accounts.insert(account.id(), account.clone());
        Ok(())
    }

    async fn get_account(&self, id: AccountId) -> Result<Account, StorageError> {
        let guard = self.lock()?;
        guard.accounts.get(&id).cloned().ok_or(StorageError::NotFound)
    }

    async fn leaderboard(&self, limit: u32) -> Result<Vec<Account>, StorageError> {
        let guard = self.lock()?;
        let mut accounts: Vec<Account> = guard.accounts.values().cloned().collect();
        accounts.sort_by(|a, b| {
            b.experience()
                .cmp(&a.experience())
                .then_with(|| a.id().cmp(&b.id()))
        });
        accounts.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        Ok(accounts)
    }
}

#[async_trait]
impl LessonProgressRepository for InMemoryRepository {
    async fn get_progress(
        &self,
        account_id: AccountId,
        sub_lesson_id: SubLessonId,
    ) -> Result<Option<LessonProgress>, StorageError> {
        let guard = self.lock()?;
        Ok(guard.progress.get(&(account_id, sub_lesson_id)).cloned())
    }

    async fn progress_for_account(
        &self,
        account_id: AccountId,
    ) -> Result<Vec<LessonProgress>, StorageError> {
        let guard = self.lock()?;
        let mut rows: Vec<LessonProgress> = guard
            .progress
            .values()
            .filter(|p| p.account_id == account_id)
            .cloned()
            .collect();
        rows.sort_by_key(|p| p.sub_lesson_id);
        Ok(rows)
    }
}

#[async_trait]
impl ActivityRepository for InMemoryRepository {
    async fn events_between(
        &self,
        account_id: AccountId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<EventRecord>, StorageError> {
        let guard = self.lock()?;
        let mut rows: Vec<EventRecord> = guard
            .history
            .iter()
            .filter(|r| {
                let at = r.event.occurred_at();
                r.event.account_id() == account_id && start <= at && at < end
            })
            .cloned()
            .collect();
        rows.sort_by_key(|r| r.event.occurred_at());
        Ok(rows)
    }

    async fn speed_tests_for_account(
        &self,
        account_id: AccountId,
        limit: u32,
    ) -> Result<Vec<EventRecord>, StorageError> {
        let guard = self.lock()?;
        let mut rows: Vec<EventRecord> = guard
            .history
            .iter()
            .filter(|r| r.event.account_id() == account_id && !r.event.is_lesson())
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.event.occurred_at().cmp(&a.event.occurred_at()));
        rows.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        Ok(rows)
    }

    async fn submission_times_since(
        &self,
        account_id: AccountId,
        since: DateTime<Utc>,
    ) -> Result<Vec<DateTime<Utc>>, StorageError> {
        let guard = self.lock()?;
        let mut times: Vec<DateTime<Utc>> = guard
            .history
            .iter()
            .filter(|r| r.event.account_id() == account_id)
            .map(|r| r.event.occurred_at())
            .filter(|at| *at > since)
            .collect();
        times.sort_unstable();
        Ok(times)
    }
}

#[async_trait]
impl ProgressionPersistence for InMemoryRepository {
    async fn commit(&self, commit: ProgressionCommit) -> Result<i64, StorageError> {
        let mut guard = self.lock()?;
        let id = commit.account.id();

        let stored = guard.accounts.get(&id).ok_or(StorageError::NotFound)?;
        if stored.version() != commit.expected_version {
            return Err(StorageError::Conflict);
        }

        let account = Account::from_persisted(
            id,
            commit.account.experience(),
            commit.account.rank_tier(),
            commit.account.star_count(),
            commit.expected_version + 1,
            stored.created_at(),
        );
        guard.accounts.insert(id, account);

        if let Some(progress) = commit.progress {
            guard
                .progress
                .insert((progress.account_id, progress.sub_lesson_id), progress);
        }

        guard.history.push(commit.record);
        i64::try_from(guard.history.len())
            .map_err(|_| StorageError::Serialization("history id overflow".into()))
    }
}

/// Aggregates repositories behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub accounts: Arc<dyn AccountRepository>,
    pub progress: Arc<dyn LessonProgressRepository>,
    pub activity: Arc<dyn ActivityRepository>,
    pub progression: Arc<dyn ProgressionPersistence>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let repo = InMemoryRepository::new();
        Self {
            accounts: Arc::new(repo.clone()),
            progress: Arc::new(repo.clone()),
            activity: Arc::new(repo.clone()),
            progression: Arc::new(repo),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use typing_core::model::{PerformanceEvent, RankTier};
    use typing_core::rank::LESSON_RANKS;
    use typing_core::time::fixed_now;

    fn lesson_record(account: AccountId, sub: u64, offset_minutes: i64) -> EventRecord {
        let event = PerformanceEvent::lesson(
            account,
            SubLessonId::new(sub),
            40.0,
            96.0,
            60,
            fixed_now() + chrono::Duration::minutes(offset_minutes),
        )
        .unwrap();
        EventRecord::new(event, true, 60)
    }

    #[tokio::test]
    async fn commit_bumps_version_and_appends_history() {
        let repo = InMemoryRepository::new();
        let account = Account::register(AccountId::new(1), fixed_now());
        repo.create_account(&account).await.unwrap();

        let record = lesson_record(account.id(), 3, 0);
        let progress = LessonProgress::first_clear(
            account.id(),
            SubLessonId::new(3),
            &record.event,
            typing_core::model::Stars::new(3).unwrap(),
        );
        let updated = account.with_award(60, 3, &LESSON_RANKS);
        repo.commit(ProgressionCommit::new(&account, updated, Some(progress), record))
            .await
            .unwrap();

        let stored = repo.get_account(account.id()).await.unwrap();
        assert_eq!(stored.experience(), 60);
        assert_eq!(stored.star_count(), 3);
        assert_eq!(stored.version(), 1);
        assert!(
            repo.get_progress(account.id(), SubLessonId::new(3))
                .await
                .unwrap()
                .is_some()
        );
        let day = repo
            .events_between(
                account.id(),
                fixed_now() - chrono::Duration::hours(1),
                fixed_now() + chrono::Duration::hours(1),
            )
            .await
            .unwrap();
        assert_eq!(day.len(), 1);
    }

    #[tokio::test]
    async fn stale_commit_is_rejected_without_writes() {
        let repo = InMemoryRepository::new();
        let account = Account::register(AccountId::new(1), fixed_now());
        repo.create_account(&account).await.unwrap();

        let first = ProgressionCommit::new(
            &account,
            account.with_award(20, 0, &LESSON_RANKS),
            None,
            lesson_record(account.id(), 1, 0),
        );
        let racing = ProgressionCommit::new(
            &account,
            account.with_award(60, 3, &LESSON_RANKS),
            None,
            lesson_record(account.id(), 2, 1),
        );
        repo.commit(first).await.unwrap();
        let err = repo.commit(racing).await.unwrap_err();
        assert!(matches!(err, StorageError::Conflict));

        let stored = repo.get_account(account.id()).await.unwrap();
        assert_eq!(stored.experience(), 20);
        let history = repo
            .events_between(
                account.id(),
                fixed_now() - chrono::Duration::hours(1),
                fixed_now() + chrono::Duration::hours(1),
            )
            .await
            .unwrap();
        assert_eq!(history.len(), 1);
    }

    #[tokio::test]
    async fn commit_for_missing_account_is_not_found() {
        let repo = InMemoryRepository::new();
        let ghost = Account::register(AccountId::new(9), fixed_now());
        let err = repo
            .commit(ProgressionCommit::new(
                &ghost,
                ghost.clone(),
                None,
                lesson_record(ghost.id(), 1, 0),
            ))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::NotFound));
    }

    #[tokio::test]
    async fn leaderboard_orders_by_experience() {
        let repo = InMemoryRepository::new();
        for (id, xp) in [(1, 100), (2, 900), (3, 900), (4, 0)] {
            let account =
                Account::from_persisted(AccountId::new(id), xp, RankTier::FIRST, 0, 0, fixed_now());
            repo.create_account(&account).await.unwrap();
        }
        let top: Vec<u64> = repo
            .leaderboard(3)
            .await
            .unwrap()
            .iter()
            .map(|a| a.id().value())
            .collect();
        assert_eq!(top, vec![2, 3, 1]);
    }

    #[tokio::test]
    async fn submission_times_cover_both_modes() {
        let repo = InMemoryRepository::new();
        let account = Account::register(AccountId::new(1), fixed_now());
        repo.create_account(&account).await.unwrap();

        let mut current = account.clone();
        for minutes in [-10, 0] {
            repo.commit(ProgressionCommit::new(
                &current,
                current.with_award(10, 0, &LESSON_RANKS),
                None,
                lesson_record(account.id(), 1, minutes),
            ))
            .await
            .unwrap();
            current = repo.get_account(account.id()).await.unwrap();
        }
        let test = PerformanceEvent::speed_test(
            account.id(),
            40.0,
            97.0,
            60,
            0,
            fixed_now() + chrono::Duration::minutes(1),
        )
        .unwrap();
        repo.commit(ProgressionCommit::new(
            &current,
            current.with_award(45, 0, &LESSON_RANKS),
            None,
            EventRecord::new(test, false, 45),
        ))
        .await
        .unwrap();

        let recent = repo
            .submission_times_since(account.id(), fixed_now() - chrono::Duration::minutes(1))
            .await
            .unwrap();
        assert_eq!(
            recent,
            vec![fixed_now(), fixed_now() + chrono::Duration::minutes(1)]
        );
        let after = repo
            .submission_times_since(account.id(), fixed_now())
            .await
            .unwrap();
        assert_eq!(after, vec![fixed_now() + chrono::Duration::minutes(1)]);
        assert!(
            repo.submission_times_since(AccountId::new(2), fixed_now())
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn duplicate_registration_conflicts() {
        let repo = InMemoryRepository::new();
        let account = Account::register(AccountId::new(1), fixed_now());
        repo.create_account(&account).await.unwrap();
        assert!(matches!(
            repo.create_account(&account).await,
            Err(StorageError::Conflict)
        ));
    }
}
