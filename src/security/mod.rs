//! Security: ban enforcement, rate limiting, password verification.

pub mod bans;
pub mod password;
pub mod rate_limit;

pub use bans::{BanEnforcer, BanVerdict};
pub use rate_limit::{LimiterKey, RateLimitManager};
