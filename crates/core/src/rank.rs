//! Experience-to-rank tables.
//!
//! Every table is an ordered list of tier bands. A band starts at `floor`
//! total experience and awards one rank star per `star_size` experience above
//! that floor, up to [`MAX_RANK_STARS`]. Three tables are in use:
//!
//! - [`LESSON_RANKS`]: tier recomputation after a lesson (6000 XP per tier).
//! - [`SPEED_TEST_RANKS`]: tier recomputation after a speed test (2500 / 8500).
//! - [`DISPLAY_RANKS`]: leaderboard and summary views (2500 / 8500 with
//!   500 / 1200 / 2000 XP per star).

use serde::{Deserialize, Serialize};

use crate::model::RankTier;

/// Stars within a tier never exceed this.
pub const MAX_RANK_STARS: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierBand {
    pub floor: u64,
    pub star_size: u64,
}

/// Tier and within-tier progress for a given experience total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankDisplay {
    pub tier: RankTier,
    pub stars: u32,
    pub current_bar_xp: u64,
    pub max_bar_xp: u64,
}

/// Ordered tier bands; the first band must start at zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RankTable {
    bands: &'static [TierBand],
}

pub const LESSON_RANKS: RankTable = RankTable::new(&[
    TierBand {
        floor: 0,
        star_size: 1_200,
    },
    TierBand {
        floor: 6_000,
        star_size: 1_200,
    },
    TierBand {
        floor: 12_000,
        star_size: 1_200,
    },
]);

pub const SPEED_TEST_RANKS: RankTable = RankTable::new(&[
    TierBand {
        floor: 0,
        star_size: 500,
    },
    TierBand {
        floor: 2_500,
        star_size: 1_200,
    },
    TierBand {
        floor: 8_500,
        star_size: 2_000,
    },
]);

pub const DISPLAY_RANKS: RankTable = SPEED_TEST_RANKS;

impl RankTable {
    #[must_use]
    pub const fn new(bands: &'static [TierBand]) -> Self {
        Self { bands }
    }

    fn band_index(&self, experience: u64) -> usize {
        self.bands
            .iter()
            .rposition(|band| experience >= band.floor)
            .unwrap_or(0)
    }

    #[must_use]
    pub fn tier_for(&self, experience: u64) -> RankTier {
        RankTier::from_band_index(self.band_index(experience))
    }

    /// Tier, stars and progress bar for `experience`. Pure and idempotent.
    ///
    /// Once the star cap is reached the bar is reported full.
    #[must_use]
    pub fn display(&self, experience: u64) -> RankDisplay {
        let index = self.band_index(experience);
        let tier = RankTier::from_band_index(index);
        let Some(band) = self.bands.get(index) else {
            return RankDisplay {
                tier,
                stars: 0,
                current_bar_xp: 0,
                max_bar_xp: 0,
            };
        };

        let star_size = band.star_size.max(1);
        let within = experience.saturating_sub(band.floor);
        let earned = within / star_size;
        if earned >= u64::from(MAX_RANK_STARS) {
            return RankDisplay {
                tier,
                stars: MAX_RANK_STARS,
                current_bar_xp: star_size,
                max_bar_xp: star_size,
            };
        }

        RankDisplay {
            tier,
            // earned < MAX_RANK_STARS here
            stars: u32::try_from(earned).unwrap_or(MAX_RANK_STARS),
            current_bar_xp: within % star_size,
            max_bar_xp: star_size,
        }
    }
}

/// Rank shown on leaderboards and summaries.
#[must_use]
pub fn derive_rank_display(experience: u64) -> RankDisplay {
    DISPLAY_RANKS.display(experience)
}
