use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::AccountId;
use crate::rank::RankTable;

//
// ─── ERRORS ───────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum AccountError {
    #[error("rank tier must be between 1 and {max}, got {provided}")]
    InvalidRankTier { provided: u8, max: u8 },
}

//
// ─── RANK TIER ────────────────────────────────────────────────────────────────
//

/// Coarse proficiency band derived from cumulative experience.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct RankTier(u8);

impl RankTier {
    pub const MAX: u8 = 3;
    pub const FIRST: RankTier = RankTier(1);

    /// # Errors
    ///
    /// Returns `AccountError::InvalidRankTier` when `value` is outside `1..=3`.
    pub fn new(value: u8) -> Result<Self, AccountError> {
        if (1..=Self::MAX).contains(&value) {
            Ok(Self(value))
        } else {
            Err(AccountError::InvalidRankTier {
                provided: value,
                max: Self::MAX,
            })
        }
    }

    /// Builds a tier from a zero-based band index, saturating at the top tier.
    #[must_use]
    pub fn from_band_index(index: usize) -> Self {
        let clamped = index.min(usize::from(Self::MAX - 1));
        // clamped < 3, fits in u8
        Self(u8::try_from(clamped).unwrap_or(0) + 1)
    }

    #[must_use]
    pub fn value(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for RankTier {
    type Error = AccountError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<RankTier> for u8 {
    fn from(tier: RankTier) -> Self {
        tier.0
    }
}

//
// ─── ACCOUNT ──────────────────────────────────────────────────────────────────
//

/// A learner and their accumulated progression state.
///
/// Only the progression engine produces updated accounts; storage rehydrates
/// them through [`Account::from_persisted`]. `version` is bumped by storage on
/// every committed update and is used to reject lost updates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    id: AccountId,
    experience: u64,
    rank_tier: RankTier,
    star_count: u32,
    version: u64,
    created_at: DateTime<Utc>,
}

impl Account {
    /// A freshly registered account: no experience, first tier, no stars.
    #[must_use]
    pub fn register(id: AccountId, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            experience: 0,
            rank_tier: RankTier::FIRST,
            star_count: 0,
            version: 0,
            created_at,
        }
    }

    #[must_use]
    pub fn from_persisted(
        id: AccountId,
        experience: u64,
        rank_tier: RankTier,
        star_count: u32,
        version: u64,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            experience,
            rank_tier,
            star_count,
            version,
            created_at,
        }
    }

    /// Returns a copy with `xp` added, the tier recomputed against `ranks`,
    /// and `star_delta` added to the star count.
    ///
    /// Experience never decreases; additions saturate instead of wrapping.
    #[must_use]
    pub fn with_award(&self, xp: u64, star_delta: u32, ranks: &RankTable) -> Self {
        let experience = self.experience.saturating_add(xp);
        Self {
            experience,
            rank_tier: ranks.tier_for(experience),
            star_count: self.star_count.saturating_add(star_delta),
            ..self.clone()
        }
    }

    #[must_use]
    pub fn id(&self) -> AccountId {
        self.id
    }

    #[must_use]
    pub fn experience(&self) -> u64 {
        self.experience
    }

    #[must_use]
    pub fn rank_tier(&self) -> RankTier {
        self.rank_tier
    }

    #[must_use]
    pub fn star_count(&self) -> u32 {
        self.star_count
    }

    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rank::{LESSON_RANKS, SPEED_TEST_RANKS};
    use crate::time::fixed_now;

    #[test]
    fn registration_starts_empty() {
        let account = Account::register(AccountId::new(1), fixed_now());
        assert_eq!(account.experience(), 0);
        assert_eq!(account.rank_tier(), RankTier::FIRST);
        assert_eq!(account.star_count(), 0);
        assert_eq!(account.version(), 0);
    }

    #[test]
    fn rank_tier_rejects_out_of_range() {
        assert!(RankTier::new(0).is_err());
        assert!(RankTier::new(4).is_err());
        assert_eq!(RankTier::new(3).unwrap().value(), 3);
    }

    #[test]
    fn band_index_saturates() {
        assert_eq!(RankTier::from_band_index(0).value(), 1);
        assert_eq!(RankTier::from_band_index(2).value(), 3);
        assert_eq!(RankTier::from_band_index(9).value(), 3);
    }

    #[test]
    fn award_accumulates_and_recomputes_tier() {
        let account = Account::register(AccountId::new(1), fixed_now());
        let next = account.with_award(6_000, 2, &LESSON_RANKS);
        assert_eq!(next.experience(), 6_000);
        assert_eq!(next.rank_tier().value(), 2);
        assert_eq!(next.star_count(), 2);
        assert_eq!(next.version(), account.version());

        let tested = account.with_award(2_500, 0, &SPEED_TEST_RANKS);
        assert_eq!(tested.rank_tier().value(), 2);
        assert_eq!(tested.star_count(), 0);
    }

    #[test]
    fn rank_tier_deserializes_with_validation() {
        let tier: RankTier = serde_json::from_str("2").unwrap();
        assert_eq!(tier.value(), 2);
        assert!(serde_json::from_str::<RankTier>("7").is_err());
    }
}
