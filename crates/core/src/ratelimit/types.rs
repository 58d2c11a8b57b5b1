use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// A request budget: at most `max_requests` within any `window_secs` span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitPolicy {
    pub max_requests: u32,
    pub window_secs: u64,
}

impl RateLimitPolicy {
    pub const STANDARD: Self = Self::new(100, 60);
    pub const STRICT: Self = Self::new(10, 60);
    pub const LENIENT: Self = Self::new(500, 60);
    pub const BURST: Self = Self::new(20, 10);
    pub const DAILY: Self = Self::new(1000, 86_400);

    pub const fn new(max_requests: u32, window_secs: u64) -> Self {
        Self {
            max_requests,
            window_secs,
        }
    }

    /// Look up a named preset.
    pub fn preset(name: &str) -> Option<Self> {
        match name {
            "standard" => Some(Self::STANDARD),
            "strict" => Some(Self::STRICT),
            "lenient" => Some(Self::LENIENT),
            "burst" => Some(Self::BURST),
            "daily" => Some(Self::DAILY),
            _ => None,
        }
    }

    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

/// Outcome of consuming one unit of budget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    /// Epoch milliseconds at which the oldest in-window hit expires.
    pub reset_at_ms: i64,
    /// Whole seconds until a retry can succeed. Only set when denied.
    pub retry_after_secs: Option<u64>,
}

impl RateLimitDecision {
    /// Reset instant in epoch seconds, as sent in `X-RateLimit-Reset`.
    pub fn reset_at_secs(&self) -> i64 {
        self.reset_at_ms.div_euclid(1000)
    }
}

/// Read-only view of a key's current window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RateLimitUsage {
    pub count: u32,
    pub limit: u32,
    pub remaining: u32,
    pub reset_at_ms: i64,
}

#[derive(Debug, Error)]
pub enum RateLimitError {
    #[error("Rate limit store unavailable: {0}")]
    Unavailable(String),
}
