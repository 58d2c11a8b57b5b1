//! Sliding-window rate limiting.
//!
//! The limiter is a hard dependency of the access gates: callers treat a
//! `RateLimitError` as a denial.

mod sliding_window;
mod types;

pub use sliding_window::*;
pub use types::*;

use async_trait::async_trait;

#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Consume one unit of budget for `key`.
    async fn limit(&self, key: &str) -> Result<RateLimitDecision, RateLimitError>;

    /// Forget every recorded hit for `key`.
    async fn reset(&self, key: &str) -> Result<(), RateLimitError>;

    /// Inspect `key` without consuming budget.
    async fn usage(&self, key: &str) -> Result<RateLimitUsage, RateLimitError>;

    /// The budget this limiter enforces.
    fn policy(&self) -> RateLimitPolicy;
}
