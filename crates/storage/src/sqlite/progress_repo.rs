use typing_core::model::{AccountId, LessonProgress, SubLessonId};

use super::{
    SqliteRepository,
    mapping::{id_i64, map_progress_row},
};
use crate::repository::{LessonProgressRepository, StorageError};

#[async_trait::async_trait]
impl LessonProgressRepository for SqliteRepository {
    async fn get_progress(
        &self,
        account_id: AccountId,
        sub_lesson_id: SubLessonId,
    ) -> Result<Option<LessonProgress>, StorageError> {
        let row = sqlx::query(
            r"
                SELECT
                    account_id, sub_lesson_id, best_wpm, best_accuracy,
                    stars, duration_seconds, status, updated_at
                FROM lesson_progress
                WHERE account_id = ?1 AND sub_lesson_id = ?2
            ",
        )
        .bind(id_i64("account_id", account_id.value())?)
        .bind(id_i64("sub_lesson_id", sub_lesson_id.value())?)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        row.as_ref().map(map_progress_row).transpose()
    }

    async fn progress_for_account(
        &self,
        account_id: AccountId,
    ) -> Result<Vec<LessonProgress>, StorageError> {
        let rows = sqlx::query(
            r"
                SELECT
                    account_id, sub_lesson_id, best_wpm, best_accuracy,
                    stars, duration_seconds, status, updated_at
                FROM lesson_progress
                WHERE account_id = ?1
                ORDER BY sub_lesson_id ASC
            ",
        )
        .bind(id_i64("account_id", account_id.value())?)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        rows.iter().map(map_progress_row).collect()
    }
}
