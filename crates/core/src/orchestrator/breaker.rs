//! Failure-rate circuit breaker guarding the workflow service.
//!
//! The breaker watches call outcomes over a sliding window. Once enough
//! calls have failed it opens and every dispatch fails fast until the
//! cooldown passes. The next call after that is a trial: success closes the
//! breaker, failure opens it again.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{info, warn};

use crate::metrics::CIRCUIT_TRANSITIONS;

/// Fewest calls in the window before the failure ratio is trusted.
const MIN_CALLS_TO_OPEN: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        }
    }
}

/// Point-in-time view of the breaker for status reporting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitSnapshot {
    pub state: CircuitState,
    pub failures_in_window: usize,
    pub calls_in_window: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub open_remaining_secs: Option<u64>,
}

#[derive(Debug, Default)]
struct BreakerState {
    /// (when, succeeded) for calls inside the window.
    outcomes: VecDeque<(Instant, bool)>,
    open_until: Option<Instant>,
    half_open: bool,
}

impl BreakerState {
    fn prune(&mut self, now: Instant, window: Duration) {
        while let Some((at, _)) = self.outcomes.front() {
            if now.duration_since(*at) < window {
                break;
            }
            self.outcomes.pop_front();
        }
    }

    fn failures(&self) -> usize {
        self.outcomes.iter().filter(|(_, ok)| !ok).count()
    }
}

pub struct CircuitBreaker {
    failure_ratio: f64,
    window: Duration,
    cooldown: Duration,
    state: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub fn new(failure_ratio: f64, window: Duration, cooldown: Duration) -> Self {
        Self {
            failure_ratio,
            window,
            cooldown,
            state: Mutex::new(BreakerState::default()),
        }
    }

    /// Ask to make a call. `Err` carries how long the breaker stays open.
    pub fn try_acquire(&self) -> Result<(), Duration> {
        let now = Instant::now();
        let Ok(mut state) = self.state.lock() else {
            return Ok(());
        };

        if let Some(until) = state.open_until {
            if now < until {
                return Err(until - now);
            }
            state.open_until = None;
            state.half_open = true;
            CIRCUIT_TRANSITIONS
                .with_label_values(&[CircuitState::HalfOpen.as_str()])
                .inc();
            info!("Workflow circuit half-open, allowing a trial call");
        }
        Ok(())
    }

    /// Record the outcome of a call made after `try_acquire`.
    pub fn record(&self, success: bool) {
        let now = Instant::now();
        let Ok(mut state) = self.state.lock() else {
            return;
        };

        if state.half_open {
            state.half_open = false;
            state.outcomes.clear();
            if success {
                CIRCUIT_TRANSITIONS
                    .with_label_values(&[CircuitState::Closed.as_str()])
                    .inc();
                info!("Workflow circuit closed");
            } else {
                self.open(&mut state, now);
            }
            return;
        }

        state.outcomes.push_back((now, success));
        state.prune(now, self.window);

        let calls = state.outcomes.len();
        if calls < MIN_CALLS_TO_OPEN || state.open_until.is_some() {
            return;
        }
        let ratio = state.failures() as f64 / calls as f64;
        if ratio >= self.failure_ratio {
            warn!(
                failures = state.failures(),
                calls, "Workflow failure rate over threshold"
            );
            state.outcomes.clear();
            self.open(&mut state, now);
        }
    }

    fn open(&self, state: &mut BreakerState, now: Instant) {
        state.open_until = Some(now + self.cooldown);
        CIRCUIT_TRANSITIONS
            .with_label_values(&[CircuitState::Open.as_str()])
            .inc();
        warn!(
            cooldown_secs = self.cooldown.as_secs(),
            "Workflow circuit opened"
        );
    }

    pub fn snapshot(&self) -> CircuitSnapshot {
        let now = Instant::now();
        let Ok(mut state) = self.state.lock() else {
            return CircuitSnapshot {
                state: CircuitState::Closed,
                failures_in_window: 0,
                calls_in_window: 0,
                open_remaining_secs: None,
            };
        };
        state.prune(now, self.window);

        let (circuit, remaining) = match state.open_until {
            Some(until) if now < until => {
                let left = until - now;
                // Round up so an open breaker never reports zero.
                let secs = left.as_secs() + u64::from(left.subsec_nanos() > 0);
                (CircuitState::Open, Some(secs))
            }
            Some(_) => (CircuitState::HalfOpen, None),
            None if state.half_open => (CircuitState::HalfOpen, None),
            None => (CircuitState::Closed, None),
        };

        CircuitSnapshot {
            state: circuit,
            failures_in_window: state.failures(),
            calls_in_window: state.outcomes.len(),
            open_remaining_secs: remaining,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker() -> CircuitBreaker {
        CircuitBreaker::new(0.5, Duration::from_secs(60), Duration::from_secs(60))
    }

    #[tokio::test(start_paused = true)]
    async fn test_opens_at_failure_ratio() {
        let breaker = breaker();
        for _ in 0..2 {
            breaker.record(true);
        }
        for _ in 0..2 {
            breaker.record(false);
        }
        // Four calls is below the minimum sample
        assert_eq!(breaker.snapshot().state, CircuitState::Closed);
        assert!(breaker.try_acquire().is_ok());

        breaker.record(false);
        let snapshot = breaker.snapshot();
        assert_eq!(snapshot.state, CircuitState::Open);
        assert_eq!(snapshot.open_remaining_secs, Some(60));
        assert!(breaker.try_acquire().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_healthy_traffic_stays_closed() {
        let breaker = breaker();
        for i in 0..20 {
            breaker.record(i % 3 != 0);
        }
        assert_eq!(breaker.snapshot().state, CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_old_failures_leave_the_window() {
        let breaker = breaker();
        for _ in 0..4 {
            breaker.record(false);
        }
        tokio::time::advance(Duration::from_secs(61)).await;
        breaker.record(false);

        let snapshot = breaker.snapshot();
        assert_eq!(snapshot.state, CircuitState::Closed);
        assert_eq!(snapshot.calls_in_window, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_trial_success_closes() {
        let breaker = breaker();
        for _ in 0..5 {
            breaker.record(false);
        }
        assert!(breaker.try_acquire().is_err());

        tokio::time::advance(Duration::from_secs(60)).await;
        assert_eq!(breaker.snapshot().state, CircuitState::HalfOpen);
        assert!(breaker.try_acquire().is_ok());
        breaker.record(true);

        let snapshot = breaker.snapshot();
        assert_eq!(snapshot.state, CircuitState::Closed);
        assert_eq!(snapshot.calls_in_window, 0);
        assert!(breaker.try_acquire().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_trial_failure_reopens() {
        let breaker = breaker();
        for _ in 0..5 {
            breaker.record(false);
        }
        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(breaker.try_acquire().is_ok());
        breaker.record(false);

        assert_eq!(breaker.snapshot().state, CircuitState::Open);
        let wait = breaker.try_acquire().unwrap_err();
        assert_eq!(wait, Duration::from_secs(60));
    }
}
