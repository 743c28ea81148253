use chrono::{DateTime, Utc};
use sqlx::Row;
use typing_core::model::{
    Account, AccountId, EventRecord, LessonProgress, PerformanceEvent, ProgressStatus, RankTier,
    Stars, SubLessonId,
};

use crate::repository::StorageError;

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(crate) fn id_i64(field: &'static str, v: u64) -> Result<i64, StorageError> {
    i64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} overflow")))
}

fn u64_from_i64(field: &'static str, v: i64) -> Result<u64, StorageError> {
    u64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} sign overflow")))
}

fn u32_from_i64(field: &'static str, v: i64) -> Result<u32, StorageError> {
    u32::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

pub(crate) fn account_id_from_i64(v: i64) -> Result<AccountId, StorageError> {
    Ok(AccountId::new(u64_from_i64("account_id", v)?))
}

pub(crate) fn sub_lesson_id_from_i64(v: i64) -> Result<SubLessonId, StorageError> {
    Ok(SubLessonId::new(u64_from_i64("sub_lesson_id", v)?))
}

fn stars_from_i64(v: i64) -> Result<Stars, StorageError> {
    let raw = u8::try_from(v)
        .map_err(|_| StorageError::Serialization(format!("invalid stars: {v}")))?;
    Stars::new(raw).map_err(ser)
}

pub(crate) fn parse_status(s: &str) -> Result<ProgressStatus, StorageError> {
    match s {
        "completed" => Ok(ProgressStatus::Completed),
        _ => Err(StorageError::Serialization(format!("invalid status: {s}"))),
    }
}

pub(crate) fn map_account_row(row: &sqlx::sqlite::SqliteRow) -> Result<Account, StorageError> {
    let tier_raw: i64 = row.try_get("rank_tier").map_err(ser)?;
    let tier = u8::try_from(tier_raw)
        .map_err(ser)
        .and_then(|t| RankTier::new(t).map_err(ser))?;

    Ok(Account::from_persisted(
        account_id_from_i64(row.try_get::<i64, _>("id").map_err(ser)?)?,
        u64_from_i64("experience", row.try_get::<i64, _>("experience").map_err(ser)?)?,
        tier,
        u32_from_i64("star_count", row.try_get::<i64, _>("star_count").map_err(ser)?)?,
        u64_from_i64("version", row.try_get::<i64, _>("version").map_err(ser)?)?,
        row.try_get("created_at").map_err(ser)?,
    ))
}

pub(crate) fn map_progress_row(
    row: &sqlx::sqlite::SqliteRow,
) -> Result<LessonProgress, StorageError> {
    let status: String = row.try_get("status").map_err(ser)?;
    Ok(LessonProgress {
        account_id: account_id_from_i64(row.try_get::<i64, _>("account_id").map_err(ser)?)?,
        sub_lesson_id: sub_lesson_id_from_i64(
            row.try_get::<i64, _>("sub_lesson_id").map_err(ser)?,
        )?,
        best_wpm: row.try_get("best_wpm").map_err(ser)?,
        best_accuracy: row.try_get("best_accuracy").map_err(ser)?,
        stars: stars_from_i64(row.try_get::<i64, _>("stars").map_err(ser)?)?,
        duration_seconds: u32_from_i64(
            "duration_seconds",
            row.try_get::<i64, _>("duration_seconds").map_err(ser)?,
        )?,
        status: parse_status(status.as_str())?,
        updated_at: row.try_get("updated_at").map_err(ser)?,
    })
}

pub(crate) fn map_lesson_attempt_row(
    row: &sqlx::sqlite::SqliteRow,
) -> Result<EventRecord, StorageError> {
    let created_at: DateTime<Utc> = row.try_get("created_at").map_err(ser)?;
    let event = PerformanceEvent::lesson_from_persisted(
        account_id_from_i64(row.try_get::<i64, _>("account_id").map_err(ser)?)?,
        sub_lesson_id_from_i64(row.try_get::<i64, _>("sub_lesson_id").map_err(ser)?)?,
        stars_from_i64(row.try_get::<i64, _>("stars").map_err(ser)?)?,
        row.try_get("wpm").map_err(ser)?,
        row.try_get("accuracy").map_err(ser)?,
        u32_from_i64(
            "duration_seconds",
            row.try_get::<i64, _>("duration_seconds").map_err(ser)?,
        )?,
        created_at,
    )
    .map_err(ser)?;

    Ok(EventRecord::new(
        event,
        row.try_get::<bool, _>("first_clear").map_err(ser)?,
        u64_from_i64("xp_awarded", row.try_get::<i64, _>("xp_awarded").map_err(ser)?)?,
    ))
}

pub(crate) fn map_speed_test_row(
    row: &sqlx::sqlite::SqliteRow,
) -> Result<EventRecord, StorageError> {
    let created_at: DateTime<Utc> = row.try_get("created_at").map_err(ser)?;
    let event = PerformanceEvent::speed_test(
        account_id_from_i64(row.try_get::<i64, _>("account_id").map_err(ser)?)?,
        row.try_get("wpm").map_err(ser)?,
        row.try_get("accuracy").map_err(ser)?,
        u32_from_i64(
            "duration_seconds",
            row.try_get::<i64, _>("duration_seconds").map_err(ser)?,
        )?,
        u32_from_i64("mistakes", row.try_get::<i64, _>("mistakes").map_err(ser)?)?,
        created_at,
    )
    .map_err(ser)?;

    Ok(EventRecord::new(
        event,
        false,
        u64_from_i64("xp_awarded", row.try_get::<i64, _>("xp_awarded").map_err(ser)?)?,
    ))
}
