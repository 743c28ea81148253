use typing_core::model::{Account, AccountId};

use super::{
    SqliteRepository,
    mapping::{id_i64, map_account_row},
};
use crate::repository::{AccountRepository, StorageError};

#[async_trait::async_trait]
impl AccountRepository for SqliteRepository {
    async fn create_account(&self, account: &Account) -> Result<(), StorageError> {
        let id = id_i64("account_id", account.id().value())?;

        let res = sqlx::query(
            r"
                INSERT INTO accounts (id, experience, rank_tier, star_count, version, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                ON CONFLICT(id) DO NOTHING
            ",
        )
        .bind(id)
        .bind(id_i64("experience", account.experience())?)
        .bind(i64::from(account.rank_tier().value()))
        .bind(i64::from(account.star_count()))
        .bind(id_i64("version", account.version())?)
        .bind(account.created_at())
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        if res.rows_affected() == 0 {
            return Err(StorageError::Conflict);
        }
        Ok(())
    }

    async fn get_account(&self, id: AccountId) -> Result<Account, StorageError> {
        let row = sqlx::query(
            r"
                SELECT id, experience, rank_tier, star_count, version, created_at
                FROM accounts
                WHERE id = ?1
            ",
        )
        .bind(id_i64("account_id", id.value())?)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?
        .ok_or(StorageError::NotFound)?;

        // A row that no longer decodes into a valid account is treated as absent.
        map_account_row(&row).map_err(|err| {
            tracing::warn!(account = %id, %err, "malformed account row");
            StorageError::NotFound
        })
    }

    async fn leaderboard(&self, limit: u32) -> Result<Vec<Account>, StorageError> {
        let rows = sqlx::query(
            r"
                SELECT id, experience, rank_tier, star_count, version, created_at
                FROM accounts
                ORDER BY experience DESC, id ASC
                LIMIT ?1
            ",
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        rows.iter().map(map_account_row).collect()
    }
}
