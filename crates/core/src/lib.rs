#![forbid(unsafe_code)]

pub mod model;
pub mod progression;
pub mod rank;
pub mod time;

pub use progression::{ProgressionError, ProgressionRules};
pub use rank::{RankDisplay, RankTable};
pub use time::{Clock, DayWindow};
