use chrono::{DateTime, Utc};
use sqlx::{Row, Sqlite, Transaction};
use typing_core::model::{AccountId, EventKind, EventRecord, LessonProgress};

use super::{
    SqliteRepository,
    mapping::{id_i64, map_lesson_attempt_row, map_speed_test_row, ser},
};
use crate::repository::{
    ActivityRepository, ProgressionCommit, ProgressionPersistence, StorageError,
};

fn conn_err(e: sqlx::Error) -> StorageError {
    StorageError::Connection(e.to_string())
}

#[async_trait::async_trait]
impl ActivityRepository for SqliteRepository {
    async fn events_between(
        &self,
        account_id: AccountId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<EventRecord>, StorageError> {
        let account = id_i64("account_id", account_id.value())?;

        let lessons = sqlx::query(
            r"
                SELECT
                    account_id, sub_lesson_id, wpm, accuracy, stars,
                    duration_seconds, first_clear, xp_awarded, created_at
                FROM lesson_attempts
                WHERE account_id = ?1 AND created_at >= ?2 AND created_at < ?3
                ORDER BY created_at ASC, id ASC
            ",
        )
        .bind(account)
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await
        .map_err(conn_err)?;

        let tests = sqlx::query(
            r"
                SELECT
                    account_id, wpm, accuracy, mistakes,
                    duration_seconds, xp_awarded, created_at
                FROM speed_test_results
                WHERE account_id = ?1 AND created_at >= ?2 AND created_at < ?3
                ORDER BY created_at ASC, id ASC
            ",
        )
        .bind(account)
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await
        .map_err(conn_err)?;

        let mut out = Vec::with_capacity(lessons.len() + tests.len());
        for row in &lessons {
            out.push(map_lesson_attempt_row(row)?);
        }
        for row in &tests {
            out.push(map_speed_test_row(row)?);
        }
        // Stable: lessons before tests at identical timestamps.
        out.sort_by_key(|r| r.event.occurred_at());
        Ok(out)
    }

    async fn speed_tests_for_account(
        &self,
        account_id: AccountId,
        limit: u32,
    ) -> Result<Vec<EventRecord>, StorageError> {
        let rows = sqlx::query(
            r"
                SELECT
                    account_id, wpm, accuracy, mistakes,
                    duration_seconds, xp_awarded, created_at
                FROM speed_test_results
                WHERE account_id = ?1
                ORDER BY created_at DESC, id DESC
                LIMIT ?2
            ",
        )
        .bind(id_i64("account_id", account_id.value())?)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(conn_err)?;

        rows.iter().map(map_speed_test_row).collect()
    }

    async fn submission_times_since(
        &self,
        account_id: AccountId,
        since: DateTime<Utc>,
    ) -> Result<Vec<DateTime<Utc>>, StorageError> {
        let rows = sqlx::query(
            r"
                SELECT created_at FROM lesson_attempts
                WHERE account_id = ?1 AND created_at > ?2
                UNION ALL
                SELECT created_at FROM speed_test_results
                WHERE account_id = ?1 AND created_at > ?2
                ORDER BY created_at ASC
            ",
        )
        .bind(id_i64("account_id", account_id.value())?)
        .bind(since)
        .fetch_all(&self.pool)
        .await
        .map_err(conn_err)?;

        rows.iter()
            .map(|row| row.try_get::<DateTime<Utc>, _>("created_at").map_err(ser))
            .collect()
    }
}

async fn upsert_progress(
    tx: &mut Transaction<'_, Sqlite>,
    progress: &LessonProgress,
) -> Result<(), StorageError> {
    sqlx::query(
        r"
            INSERT INTO lesson_progress (
                account_id, sub_lesson_id, best_wpm, best_accuracy,
                stars, duration_seconds, status, updated_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT(account_id, sub_lesson_id) DO UPDATE SET
                best_wpm = excluded.best_wpm,
                best_accuracy = excluded.best_accuracy,
                stars = excluded.stars,
                duration_seconds = excluded.duration_seconds,
                status = excluded.status,
                updated_at = excluded.updated_at
        ",
    )
    .bind(id_i64("account_id", progress.account_id.value())?)
    .bind(id_i64("sub_lesson_id", progress.sub_lesson_id.value())?)
    .bind(progress.best_wpm)
    .bind(progress.best_accuracy)
    .bind(i64::from(progress.stars.value()))
    .bind(i64::from(progress.duration_seconds))
    .bind(progress.status.as_str())
    .bind(progress.updated_at)
    .execute(&mut **tx)
    .await
    .map_err(conn_err)?;
    Ok(())
}

async fn append_record(
    tx: &mut Transaction<'_, Sqlite>,
    record: &EventRecord,
) -> Result<i64, StorageError> {
    let event = &record.event;
    let account = id_i64("account_id", event.account_id().value())?;
    let xp = id_i64("xp_awarded", record.xp_awarded)?;

    let res = match event.kind() {
        EventKind::Lesson {
            sub_lesson_id,
            stars,
        } => sqlx::query(
            r"
                INSERT INTO lesson_attempts (
                    account_id, sub_lesson_id, wpm, accuracy, stars,
                    duration_seconds, first_clear, xp_awarded, created_at
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ",
        )
        .bind(account)
        .bind(id_i64("sub_lesson_id", sub_lesson_id.value())?)
        .bind(event.wpm())
        .bind(event.accuracy())
        .bind(i64::from(stars.value()))
        .bind(i64::from(event.duration_seconds()))
        .bind(record.first_clear)
        .bind(xp)
        .bind(event.occurred_at())
        .execute(&mut **tx)
        .await
        .map_err(conn_err)?,
        EventKind::SpeedTest { mistakes } => sqlx::query(
            r"
                INSERT INTO speed_test_results (
                    account_id, wpm, accuracy, mistakes,
                    duration_seconds, xp_awarded, created_at
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ",
        )
        .bind(account)
        .bind(event.wpm())
        .bind(event.accuracy())
        .bind(i64::from(mistakes))
        .bind(i64::from(event.duration_seconds()))
        .bind(xp)
        .bind(event.occurred_at())
        .execute(&mut **tx)
        .await
        .map_err(conn_err)?,
    };

    Ok(res.last_insert_rowid())
}

#[async_trait::async_trait]
impl ProgressionPersistence for SqliteRepository {
    async fn commit(&self, commit: ProgressionCommit) -> Result<i64, StorageError> {
        let account = &commit.account;
        if commit.record.event.account_id() != account.id() {
            return Err(StorageError::Conflict);
        }
        let account_id = id_i64("account_id", account.id().value())?;
        let expected_version = id_i64("version", commit.expected_version)?;

        let mut tx = self.pool.begin().await.map_err(conn_err)?;

        let updated = sqlx::query(
            r"
                UPDATE accounts
                SET experience = ?1, rank_tier = ?2, star_count = ?3, version = version + 1
                WHERE id = ?4 AND version = ?5
            ",
        )
        .bind(id_i64("experience", account.experience())?)
        .bind(i64::from(account.rank_tier().value()))
        .bind(i64::from(account.star_count()))
        .bind(account_id)
        .bind(expected_version)
        .execute(&mut *tx)
        .await
        .map_err(conn_err)?;

        if updated.rows_affected() == 0 {
            let exists = sqlx::query("SELECT 1 FROM accounts WHERE id = ?1")
                .bind(account_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(conn_err)?;
            // Dropping `tx` rolls back.
            return Err(if exists.is_some() {
                tracing::warn!(account = %account.id(), expected_version, "stale account version");
                StorageError::Conflict
            } else {
                StorageError::NotFound
            });
        }

        if let Some(progress) = commit.progress.as_ref() {
            upsert_progress(&mut tx, progress).await?;
        }
        let history_id = append_record(&mut tx, &commit.record).await?;

        tx.commit().await.map_err(conn_err)?;
        Ok(history_id)
    }
}
