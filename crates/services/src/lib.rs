#![forbid(unsafe_code)]

pub mod api;
pub mod error;
pub mod progression_service;
pub mod rate_limit;

pub use typing_core::Clock;

pub use api::{
    ErrorResponse, LeaderboardEntry, LessonPayload, LessonProgressView, RankSummary,
    SaveResponse, SpeedTestPayload,
};
pub use error::ServiceError;
pub use progression_service::ProgressionService;
pub use rate_limit::{RateLimitDecision, SubmissionLimiter, SubmissionQuota};
