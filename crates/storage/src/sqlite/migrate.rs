use chrono::Utc;
use sqlx::SqlitePool;

use super::SqliteInitError;

/// Runs the versioned schema migrations.
///
/// Version 1 creates accounts, lesson progress, and the two append-only
/// history tables with their per-account time indexes.
#[allow(clippy::too_many_lines)]
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), SqliteInitError> {
    async fn is_applied(pool: &SqlitePool, version: i64) -> Result<bool, sqlx::Error> {
        let row = sqlx::query("SELECT 1 FROM schema_migrations WHERE version = ?1")
            .bind(version)
            .fetch_optional(pool)
            .await?;
        Ok(row.is_some())
    }

    sqlx::query(
        r"
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            );
            ",
    )
    .execute(pool)
    .await?;

    if !is_applied(pool, 1).await? {
        let mut tx = pool.begin().await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS accounts (
                    id INTEGER PRIMARY KEY,
                    experience INTEGER NOT NULL CHECK (experience >= 0),
                    rank_tier INTEGER NOT NULL CHECK (rank_tier BETWEEN 1 AND 3),
                    star_count INTEGER NOT NULL CHECK (star_count >= 0),
                    version INTEGER NOT NULL CHECK (version >= 0),
                    created_at TEXT NOT NULL
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS lesson_progress (
                    account_id INTEGER NOT NULL,
                    sub_lesson_id INTEGER NOT NULL,
                    best_wpm REAL NOT NULL CHECK (best_wpm >= 0),
                    best_accuracy REAL NOT NULL CHECK (best_accuracy BETWEEN 0 AND 100),
                    stars INTEGER NOT NULL CHECK (stars BETWEEN 0 AND 3),
                    duration_seconds INTEGER NOT NULL CHECK (duration_seconds >= 0),
                    status TEXT NOT NULL,
                    updated_at TEXT NOT NULL,
                    PRIMARY KEY (account_id, sub_lesson_id),
                    FOREIGN KEY (account_id) REFERENCES accounts(id) ON DELETE CASCADE
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS lesson_attempts (
                    id INTEGER PRIMARY KEY,
                    account_id INTEGER NOT NULL,
                    sub_lesson_id INTEGER NOT NULL,
                    wpm REAL NOT NULL,
                    accuracy REAL NOT NULL,
                    stars INTEGER NOT NULL CHECK (stars BETWEEN 0 AND 3),
                    duration_seconds INTEGER NOT NULL CHECK (duration_seconds >= 0),
                    first_clear INTEGER NOT NULL CHECK (first_clear IN (0, 1)),
                    xp_awarded INTEGER NOT NULL CHECK (xp_awarded >= 0),
                    created_at TEXT NOT NULL,
                    FOREIGN KEY (account_id) REFERENCES accounts(id) ON DELETE CASCADE
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS speed_test_results (
                    id INTEGER PRIMARY KEY,
                    account_id INTEGER NOT NULL,
                    wpm REAL NOT NULL,
                    accuracy REAL NOT NULL,
                    mistakes INTEGER NOT NULL CHECK (mistakes >= 0),
                    duration_seconds INTEGER NOT NULL CHECK (duration_seconds >= 0),
                    xp_awarded INTEGER NOT NULL CHECK (xp_awarded >= 0),
                    created_at TEXT NOT NULL,
                    FOREIGN KEY (account_id) REFERENCES accounts(id) ON DELETE CASCADE
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE INDEX IF NOT EXISTS idx_accounts_experience
                    ON accounts(experience DESC, id);
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE INDEX IF NOT EXISTS idx_lesson_attempts_account_created
                    ON lesson_attempts(account_id, created_at);
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE INDEX IF NOT EXISTS idx_speed_test_results_account_created
                    ON speed_test_results(account_id, created_at);
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                INSERT INTO schema_migrations (version, applied_at)
                VALUES (?1, ?2)
                ON CONFLICT(version) DO NOTHING
            ",
        )
        .bind(1_i64)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        tracing::info!(version = 1, "applied schema migration");
    }

    Ok(())
}
