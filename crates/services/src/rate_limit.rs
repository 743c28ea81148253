//! Submission rate limiting.
//!
//! [`SubmissionLimiter`] keeps fixed windows in process memory, owned by
//! whoever builds the service. [`SubmissionQuota`] is a sliding window over
//! the submission times already in the store, so it holds across processes
//! sharing one database. Time always comes from the caller.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Duration, Utc};
use typing_core::model::AccountId;

#[derive(Debug, Clone, Copy)]
struct Window {
    opened_at: DateTime<Utc>,
    count: u32,
}

#[derive(Debug, Default)]
struct LimiterState {
    windows: HashMap<AccountId, Window>,
    last_sweep: Option<DateTime<Utc>>,
}

impl LimiterState {
    fn sweep(&mut self, now: DateTime<Utc>, ttl: Duration) -> usize {
        let before = self.windows.len();
        self.windows.retain(|_, w| now - w.opened_at < ttl);
        self.last_sweep = Some(now);
        before - self.windows.len()
    }
}

/// Result of a limiter check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed { remaining: u32 },
    Limited { retry_after: Duration },
}

#[derive(Debug)]
pub struct SubmissionLimiter {
    max_per_window: u32,
    ttl: Duration,
    state: Mutex<LimiterState>,
}

impl SubmissionLimiter {
    #[must_use]
    pub fn new(max_per_window: u32, ttl: Duration) -> Self {
        Self {
            max_per_window,
            ttl,
            state: Mutex::new(LimiterState::default()),
        }
    }

    #[must_use]
    pub fn per_minute(max_per_window: u32) -> Self {
        Self::new(max_per_window, Duration::minutes(1))
    }

    /// Count one submission for `key` at `now`.
    ///
    /// Expired windows of other accounts are swept at most once per TTL, so
    /// the map stays bounded by the accounts active within roughly two TTLs.
    pub fn try_acquire(&self, key: AccountId, now: DateTime<Utc>) -> RateLimitDecision {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.last_sweep.is_none_or(|at| now - at >= self.ttl) {
            state.sweep(now, self.ttl);
        }

        let window = state.windows.entry(key).or_insert(Window {
            opened_at: now,
            count: 0,
        });

        if now - window.opened_at >= self.ttl {
            *window = Window {
                opened_at: now,
                count: 0,
            };
        }

        if window.count < self.max_per_window {
            window.count += 1;
            RateLimitDecision::Allowed {
                remaining: self.max_per_window - window.count,
            }
        } else {
            RateLimitDecision::Limited {
                retry_after: window.opened_at + self.ttl - now,
            }
        }
    }

    /// Drop windows whose TTL has elapsed. Returns how many were removed.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .sweep(now, self.ttl)
    }

    #[must_use]
    pub fn tracked_keys(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .windows
            .len()
    }
}

//
// ─── STORE-BACKED QUOTA ────────────────────────────────────────────────────────
//

/// At most `max` submissions per account in any trailing `window`, counted
/// from persisted history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmissionQuota {
    max: u32,
    window: Duration,
}

impl SubmissionQuota {
    #[must_use]
    pub fn new(max: u32, window: Duration) -> Self {
        Self { max, window }
    }

    #[must_use]
    pub fn per_minute(max: u32) -> Self {
        Self::new(max, Duration::minutes(1))
    }

    /// Start of the trailing window ending at `now`.
    #[must_use]
    pub fn window_start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - self.window
    }

    /// Decide whether one more submission fits, given the account's
    /// submission times inside the window, oldest first.
    #[must_use]
    pub fn check(&self, recent: &[DateTime<Utc>], now: DateTime<Utc>) -> RateLimitDecision {
        let used = u32::try_from(recent.len()).unwrap_or(u32::MAX);
        if used < self.max {
            return RateLimitDecision::Allowed {
                remaining: self.max - used - 1,
            };
        }
        // The slot frees up once the submission `max` places back ages out.
        let oldest_blocking = recent.len() - self.max as usize;
        let retry_after = recent
            .get(oldest_blocking)
            .map_or(self.window, |at| *at + self.window - now);
        RateLimitDecision::Limited { retry_after }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use typing_core::time::fixed_now;

    #[test]
    fn allows_up_to_limit_then_blocks() {
        let limiter = SubmissionLimiter::per_minute(2);
        let key = AccountId::new(1);
        let now = fixed_now();

        assert_eq!(
            limiter.try_acquire(key, now),
            RateLimitDecision::Allowed { remaining: 1 }
        );
        assert_eq!(
            limiter.try_acquire(key, now + Duration::seconds(10)),
            RateLimitDecision::Allowed { remaining: 0 }
        );
        assert_eq!(
            limiter.try_acquire(key, now + Duration::seconds(20)),
            RateLimitDecision::Limited {
                retry_after: Duration::seconds(40)
            }
        );
    }

    #[test]
    fn window_resets_after_ttl() {
        let limiter = SubmissionLimiter::per_minute(1);
        let key = AccountId::new(1);
        let now = fixed_now();

        assert!(matches!(
            limiter.try_acquire(key, now),
            RateLimitDecision::Allowed { .. }
        ));
        assert!(matches!(
            limiter.try_acquire(key, now + Duration::seconds(59)),
            RateLimitDecision::Limited { .. }
        ));
        assert!(matches!(
            limiter.try_acquire(key, now + Duration::seconds(60)),
            RateLimitDecision::Allowed { .. }
        ));
    }

    #[test]
    fn keys_are_independent() {
        let limiter = SubmissionLimiter::per_minute(1);
        let now = fixed_now();
        assert!(matches!(
            limiter.try_acquire(AccountId::new(1), now),
            RateLimitDecision::Allowed { .. }
        ));
        assert!(matches!(
            limiter.try_acquire(AccountId::new(2), now),
            RateLimitDecision::Allowed { .. }
        ));
    }

    #[test]
    fn acquire_sweeps_stale_accounts_without_manual_purge() {
        let limiter = SubmissionLimiter::per_minute(3);
        let start = fixed_now();
        for n in 0..1_000_u32 {
            let at = start + Duration::minutes(2 * i64::from(n));
            limiter.try_acquire(AccountId::new(u64::from(n)), at);
        }
        assert_eq!(limiter.tracked_keys(), 1);
    }

    #[test]
    fn sweep_keeps_live_windows() {
        let limiter = SubmissionLimiter::per_minute(1);
        let now = fixed_now();
        limiter.try_acquire(AccountId::new(1), now);
        limiter.try_acquire(AccountId::new(2), now + Duration::seconds(50));
        // Sweeps here: account 1 expired, account 2 still inside its window.
        limiter.try_acquire(AccountId::new(3), now + Duration::seconds(70));
        assert_eq!(limiter.tracked_keys(), 2);
        assert!(matches!(
            limiter.try_acquire(AccountId::new(2), now + Duration::seconds(80)),
            RateLimitDecision::Limited { .. }
        ));
    }

    #[test]
    fn quota_counts_trailing_submissions() {
        let quota = SubmissionQuota::per_minute(2);
        let now = fixed_now();
        assert_eq!(
            quota.check(&[], now),
            RateLimitDecision::Allowed { remaining: 1 }
        );
        let one = [now - Duration::seconds(50)];
        assert_eq!(
            quota.check(&one, now),
            RateLimitDecision::Allowed { remaining: 0 }
        );
        let two = [now - Duration::seconds(50), now - Duration::seconds(5)];
        assert_eq!(
            quota.check(&two, now),
            RateLimitDecision::Limited {
                retry_after: Duration::seconds(10)
            }
        );
        assert_eq!(quota.window_start(now), now - Duration::minutes(1));
    }

    #[test]
    fn zero_quota_blocks_everything() {
        let quota = SubmissionQuota::per_minute(0);
        assert_eq!(
            quota.check(&[], fixed_now()),
            RateLimitDecision::Limited {
                retry_after: Duration::minutes(1)
            }
        );
    }

    #[test]
    fn purge_drops_expired_windows() {
        let limiter = SubmissionLimiter::per_minute(5);
        let now = fixed_now();
        limiter.try_acquire(AccountId::new(1), now);
        limiter.try_acquire(AccountId::new(2), now + Duration::seconds(45));
        assert_eq!(limiter.tracked_keys(), 2);

        assert_eq!(limiter.purge_expired(now + Duration::seconds(70)), 1);
        assert_eq!(limiter.tracked_keys(), 1);
    }
}
