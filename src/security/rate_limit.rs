//! Rate limiting.
//!
//! governor token buckets keyed by (user-or-session, kind):
//! - message posts, per minute (ERROR 5001)
//! - channel creations, per hour (ERROR 5002)
//! - directory registrations, per source IP per hour (ERROR 5005)
//!
//! Registered users are limited by user id so reconnecting does not reset
//! the bucket; anonymous sessions fall back to their session id.

use std::net::IpAddr;
use std::num::NonZeroU32;

use dashmap::DashMap;
use governor::{Quota, RateLimiter as GovRateLimiter};
use nonzero_ext::nonzero;
use tracing::debug;

use crate::config::LimitsSection;

type DirectRateLimiter = governor::DefaultDirectRateLimiter;

/// Directory registrations allowed per source IP per hour.
pub const DIRECTORY_REGISTRATIONS_PER_HOUR: NonZeroU32 = nonzero!(30u32);

/// Identity a bucket is keyed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LimiterKey {
    User(u64),
    Session(u64),
}

/// Thread-safe rate limit manager using governor.
pub struct RateLimitManager {
    message_limiters: DashMap<LimiterKey, DirectRateLimiter>,
    channel_create_limiters: DashMap<LimiterKey, DirectRateLimiter>,
    registration_limiters: DashMap<IpAddr, DirectRateLimiter>,
    limits: LimitsSection,
}

impl RateLimitManager {
    pub fn new(limits: LimitsSection) -> Self {
        Self {
            message_limiters: DashMap::new(),
            channel_create_limiters: DashMap::new(),
            registration_limiters: DashMap::new(),
            limits,
        }
    }

    /// Check the per-minute message budget. `true` = allowed.
    pub fn check_message(&self, key: LimiterKey) -> bool {
        let limiter = self.message_limiters.entry(key).or_insert_with(|| {
            let rate = NonZeroU32::new(u32::from(self.limits.max_message_rate))
                .unwrap_or(nonzero!(10u32));
            GovRateLimiter::direct(Quota::per_minute(rate))
        });
        let allowed = limiter.check().is_ok();
        if !allowed {
            debug!(?key, "message rate limit exceeded");
            crate::metrics::RATE_LIMITED.inc();
        }
        allowed
    }

    /// Check the per-hour channel-creation budget. `true` = allowed.
    pub fn check_channel_create(&self, key: LimiterKey) -> bool {
        let limiter = self.channel_create_limiters.entry(key).or_insert_with(|| {
            let rate = NonZeroU32::new(u32::from(self.limits.max_channel_creates))
                .unwrap_or(nonzero!(5u32));
            GovRateLimiter::direct(Quota::per_hour(rate))
        });
        let allowed = limiter.check().is_ok();
        if !allowed {
            debug!(?key, "channel create rate limit exceeded");
            crate::metrics::RATE_LIMITED.inc();
        }
        allowed
    }

    /// Check the per-IP directory registration budget. `true` = allowed.
    pub fn check_directory_registration(&self, ip: IpAddr) -> bool {
        let limiter = self
            .registration_limiters
            .entry(ip)
            .or_insert_with(|| {
                GovRateLimiter::direct(Quota::per_hour(DIRECTORY_REGISTRATIONS_PER_HOUR))
            });
        let allowed = limiter.check().is_ok();
        if !allowed {
            debug!(%ip, "directory registration rate limit exceeded");
            crate::metrics::RATE_LIMITED.inc();
        }
        allowed
    }

    /// Drop a session's buckets on disconnect. User-keyed buckets survive
    /// reconnects on purpose.
    pub fn remove_session(&self, session_id: u64) {
        self.message_limiters.remove(&LimiterKey::Session(session_id));
        self.channel_create_limiters
            .remove(&LimiterKey::Session(session_id));
    }

    /// Bound memory growth; called from the maintenance task.
    pub fn cleanup(&self) {
        const MAX_ENTRIES: usize = 10_000;
        if self.message_limiters.len() > MAX_ENTRIES {
            self.message_limiters.clear();
            debug!("cleared message rate limiters (exceeded {} entries)", MAX_ENTRIES);
        }
        if self.channel_create_limiters.len() > MAX_ENTRIES {
            self.channel_create_limiters.clear();
            debug!("cleared channel-create rate limiters (exceeded {} entries)", MAX_ENTRIES);
        }
        if self.registration_limiters.len() > MAX_ENTRIES {
            self.registration_limiters.clear();
            debug!("cleared registration rate limiters (exceeded {} entries)", MAX_ENTRIES);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits(rate: u16, creates: u16) -> LimitsSection {
        LimitsSection {
            max_message_rate: rate,
            max_channel_creates: creates,
            ..Default::default()
        }
    }

    #[test]
    fn message_budget_enforced() {
        let manager = RateLimitManager::new(limits(2, 5));
        let key = LimiterKey::Session(1);
        assert!(manager.check_message(key));
        assert!(manager.check_message(key));
        assert!(!manager.check_message(key));
    }

    #[test]
    fn channel_create_budget_enforced() {
        let manager = RateLimitManager::new(limits(10, 1));
        let key = LimiterKey::User(7);
        assert!(manager.check_channel_create(key));
        assert!(!manager.check_channel_create(key));
    }

    #[test]
    fn keys_are_independent() {
        let manager = RateLimitManager::new(limits(1, 1));
        assert!(manager.check_message(LimiterKey::Session(1)));
        assert!(!manager.check_message(LimiterKey::Session(1)));
        assert!(manager.check_message(LimiterKey::Session(2)));
        assert!(manager.check_message(LimiterKey::User(1)));
    }

    #[test]
    fn session_removal_resets_bucket() {
        let manager = RateLimitManager::new(limits(1, 1));
        let key = LimiterKey::Session(3);
        assert!(manager.check_message(key));
        assert!(!manager.check_message(key));
        manager.remove_session(3);
        assert!(manager.check_message(key));
    }

    #[test]
    fn directory_registrations_capped() {
        let manager = RateLimitManager::new(limits(10, 10));
        let ip: IpAddr = "198.51.100.4".parse().unwrap();
        for _ in 0..DIRECTORY_REGISTRATIONS_PER_HOUR.get() {
            assert!(manager.check_directory_registration(ip));
        }
        assert!(!manager.check_directory_registration(ip));
    }
}
