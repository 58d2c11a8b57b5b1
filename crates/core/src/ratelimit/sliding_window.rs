//! In-process sliding-window log limiter.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use tokio::sync::RwLock;
use tokio::time::{Duration, Instant};
use tracing::debug;

use super::{RateLimitDecision, RateLimitError, RateLimitPolicy, RateLimitUsage, RateLimiter};
use crate::metrics::RATE_LIMIT_DECISIONS;

const DEFAULT_PREFIX: &str = "ratelimit";

/// Keeps the timestamp of every admitted hit per key and counts the ones
/// still inside the window. Denied requests are not recorded.
pub struct SlidingWindowLimiter {
    name: String,
    prefix: String,
    policy: RateLimitPolicy,
    windows: RwLock<HashMap<String, VecDeque<Instant>>>,
}

impl SlidingWindowLimiter {
    /// `name` labels metrics and logs, e.g. `api` or `passcode`.
    pub fn new(name: impl Into<String>, policy: RateLimitPolicy) -> Self {
        Self {
            name: name.into(),
            prefix: DEFAULT_PREFIX.to_string(),
            policy,
            windows: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn storage_key(&self, key: &str) -> String {
        format!("{}:{}", self.prefix, key)
    }

    /// Drop keys whose hits have all left the window.
    ///
    /// Returns the number of keys removed.
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let window = self.policy.window();
        let mut windows = self.windows.write().await;
        let before = windows.len();
        windows.retain(|_, hits| {
            prune(hits, now, window);
            !hits.is_empty()
        });
        before - windows.len()
    }

    /// Number of keys currently tracked.
    pub async fn tracked_keys(&self) -> usize {
        self.windows.read().await.len()
    }
}

fn prune(hits: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while let Some(&oldest) = hits.front() {
        if now.duration_since(oldest) >= window {
            hits.pop_front();
        } else {
            break;
        }
    }
}

/// Wall-clock epoch milliseconds of a monotonic instant.
fn epoch_ms(at: Instant, now: Instant) -> i64 {
    let wall_now = chrono::Utc::now().timestamp_millis();
    if at >= now {
        wall_now + at.duration_since(now).as_millis() as i64
    } else {
        wall_now - now.duration_since(at).as_millis() as i64
    }
}

#[async_trait]
impl RateLimiter for SlidingWindowLimiter {
    async fn limit(&self, key: &str) -> Result<RateLimitDecision, RateLimitError> {
        let now = Instant::now();
        let window = self.policy.window();
        let max = self.policy.max_requests;

        let mut windows = self.windows.write().await;
        let hits = windows.entry(self.storage_key(key)).or_default();
        prune(hits, now, window);

        let in_window = hits.len() as u32;
        let decision = if in_window < max {
            hits.push_back(now);
            // The oldest in-window hit (possibly the one just recorded) expires first.
            let oldest = hits.front().copied().unwrap_or(now);
            RateLimitDecision {
                allowed: true,
                limit: max,
                remaining: max - (in_window + 1),
                reset_at_ms: epoch_ms(oldest + window, now),
                retry_after_secs: None,
            }
        } else {
            let oldest = hits.front().copied().unwrap_or(now);
            let expires_at = oldest + window;
            let wait = expires_at.saturating_duration_since(now);
            let retry_after = wait.as_millis().div_ceil(1000).max(1) as u64;
            debug!(
                limiter = %self.name,
                key = %key,
                retry_after_secs = retry_after,
                "Rate limit exceeded"
            );
            RateLimitDecision {
                allowed: false,
                limit: max,
                remaining: 0,
                reset_at_ms: epoch_ms(expires_at, now),
                retry_after_secs: Some(retry_after),
            }
        };

        RATE_LIMIT_DECISIONS
            .with_label_values(&[
                self.name.as_str(),
                if decision.allowed { "allowed" } else { "denied" },
            ])
            .inc();

        Ok(decision)
    }

    async fn reset(&self, key: &str) -> Result<(), RateLimitError> {
        self.windows.write().await.remove(&self.storage_key(key));
        Ok(())
    }

    async fn usage(&self, key: &str) -> Result<RateLimitUsage, RateLimitError> {
        let now = Instant::now();
        let window = self.policy.window();
        let max = self.policy.max_requests;

        let windows = self.windows.read().await;
        let (count, oldest) = match windows.get(&self.storage_key(key)) {
            Some(hits) => {
                let live: Vec<&Instant> = hits
                    .iter()
                    .filter(|t| now.duration_since(**t) < window)
                    .collect();
                (live.len() as u32, live.first().map(|t| **t))
            }
            None => (0, None),
        };

        Ok(RateLimitUsage {
            count,
            limit: max,
            remaining: max.saturating_sub(count),
            reset_at_ms: epoch_ms(oldest.unwrap_or(now) + window, now),
        })
    }

    fn policy(&self) -> RateLimitPolicy {
        self.policy
    }
}
