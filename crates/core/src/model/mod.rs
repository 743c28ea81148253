mod account;
mod event;
mod ids;
mod progress;
pub mod quest;

pub use ids::{AccountId, ParseIdError, SubLessonId};

pub use account::{Account, AccountError, RankTier};
pub use event::{EventError, EventKind, PerformanceEvent, Stars};
pub use progress::{EventRecord, LessonProgress, ProgressStatus};
pub use quest::{DailyQuestState, QuestCompletion, QuestKind, QuestTargets};
