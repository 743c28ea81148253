//! Request and response bodies exchanged with the practice client.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use typing_core::model::{AccountId, LessonProgress, QuestCompletion, SubLessonId};
use typing_core::progression::XpBreakdown;
use typing_core::rank::RankDisplay;

use crate::error::ServiceError;

/// Body of a lesson-save request. Stars are derived server-side from accuracy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonPayload {
    pub sub_lesson_id: SubLessonId,
    pub wpm: f64,
    pub accuracy: f64,
    pub duration_seconds: u32,
}

/// Body of a speed-test-save request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeedTestPayload {
    pub wpm: f64,
    pub accuracy: f64,
    pub duration_seconds: u32,
    #[serde(default)]
    pub mistakes: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveResponse {
    pub success: bool,
    #[serde(rename = "earnedXP")]
    pub earned_xp: u64,
    #[serde(rename = "totalXP")]
    pub total_xp: u64,
    pub xp_breakdown: XpBreakdown,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_quest: Option<QuestCompletion>,
}

impl SaveResponse {
    #[must_use]
    pub fn new(
        earned_xp: u64,
        total_xp: u64,
        xp_breakdown: XpBreakdown,
        completed_quest: Option<QuestCompletion>,
    ) -> Self {
        Self {
            success: true,
            earned_xp,
            total_xp,
            xp_breakdown,
            completed_quest,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    pub code: &'static str,
}

impl From<&ServiceError> for ErrorResponse {
    fn from(err: &ServiceError) -> Self {
        Self {
            success: false,
            error: err.to_string(),
            code: err.code(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankSummary {
    pub account_id: AccountId,
    pub experience: u64,
    pub star_count: u32,
    pub rank: RankDisplay,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub position: u32,
    pub account_id: AccountId,
    pub experience: u64,
    pub rank: RankDisplay,
}

/// Best recorded result for one sub-lesson.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonProgressView {
    pub sub_lesson_id: SubLessonId,
    pub best_wpm: f64,
    pub best_accuracy: f64,
    pub stars: u8,
    pub duration_seconds: u32,
    pub status: &'static str,
    pub updated_at: DateTime<Utc>,
}

impl From<&LessonProgress> for LessonProgressView {
    fn from(progress: &LessonProgress) -> Self {
        Self {
            sub_lesson_id: progress.sub_lesson_id,
            best_wpm: progress.best_wpm,
            best_accuracy: progress.best_accuracy,
            stars: progress.stars.value(),
            duration_seconds: progress.duration_seconds,
            status: progress.status.as_str(),
            updated_at: progress.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lesson_payload_reads_camel_case() {
        let payload: LessonPayload = serde_json::from_str(
            r#"{"subLessonId": 12, "wpm": 35.5, "accuracy": 97, "durationSeconds": 180}"#,
        )
        .unwrap();
        assert_eq!(payload.sub_lesson_id, SubLessonId::new(12));
        assert_eq!(payload.duration_seconds, 180);
    }

    #[test]
    fn speed_test_mistakes_default_to_zero() {
        let payload: SpeedTestPayload =
            serde_json::from_str(r#"{"wpm": 60, "accuracy": 99, "durationSeconds": 60}"#).unwrap();
        assert_eq!(payload.mistakes, 0);
    }

    #[test]
    fn save_response_uses_wire_names() {
        let response = SaveResponse::new(
            160,
            1_160,
            XpBreakdown {
                first_win: 60,
                quest: 100,
                ..XpBreakdown::default()
            },
            Some(QuestCompletion {
                text: "Finish a lesson with 95% accuracy".into(),
                xp: 100,
            }),
        );
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["earnedXP"], 160);
        assert_eq!(json["totalXP"], 1_160);
        assert_eq!(json["xpBreakdown"]["firstWin"], 60);
        assert_eq!(json["xpBreakdown"]["grinder"], 0);
        assert_eq!(json["completedQuest"]["xp"], 100);
    }

    #[test]
    fn save_response_omits_missing_quest() {
        let response = SaveResponse::new(10, 10, XpBreakdown::default(), None);
        let json = serde_json::to_value(&response).unwrap();
        assert!(json.get("completedQuest").is_none());
    }

    #[test]
    fn progress_view_flattens_stars_and_status() {
        use typing_core::model::{PerformanceEvent, Stars};
        use typing_core::time::fixed_now;

        let event = PerformanceEvent::lesson(
            AccountId::new(1),
            SubLessonId::new(7),
            41.5,
            96.0,
            150,
            fixed_now(),
        )
        .unwrap();
        let progress = LessonProgress::first_clear(
            AccountId::new(1),
            SubLessonId::new(7),
            &event,
            Stars::new(3).unwrap(),
        );
        let json = serde_json::to_value(LessonProgressView::from(&progress)).unwrap();
        assert_eq!(json["subLessonId"], 7);
        assert_eq!(json["bestWpm"], 41.5);
        assert_eq!(json["stars"], 3);
        assert_eq!(json["status"], "completed");
        assert!(json["updatedAt"].is_string());
    }

    #[test]
    fn error_response_carries_code() {
        let body = ErrorResponse::from(&ServiceError::Unauthorized);
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["code"], "unauthorized");
    }
}
