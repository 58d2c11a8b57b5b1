//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Access gates (rate limiting, passcode attempts, navigation)
//! - Pipeline (requests created, status transitions)
//! - Orchestrator (task dispatch, callbacks, retries)

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, Opts};

// =============================================================================
// Access gates
// =============================================================================

/// Rate limiter decisions by limiter and result.
pub static RATE_LIMIT_DECISIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "reelforge_rate_limit_decisions_total",
            "Rate limiter decisions",
        ),
        &["limiter", "result"], // result: "allowed", "denied"
    )
    .unwrap()
});

/// Passcode submissions by result.
pub static PASSCODE_ATTEMPTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "reelforge_passcode_attempts_total",
            "Passcode verification attempts",
        ),
        &["result"], // "granted", "invalid", "rate_limited", "not_configured"
    )
    .unwrap()
});

/// Navigation gate outcomes.
pub static NAVIGATION_DECISIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "reelforge_navigation_decisions_total",
            "Navigation gate decisions",
        ),
        &["decision"], // "allow", "redirect", "fail_open", "fail_closed"
    )
    .unwrap()
});

// =============================================================================
// Pipeline
// =============================================================================

/// Content requests created by type.
pub static REQUESTS_CREATED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "reelforge_content_requests_created_total",
            "Content requests created",
        ),
        &["request_type"],
    )
    .unwrap()
});

/// Applied status transitions.
pub static STATUS_TRANSITIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "reelforge_status_transitions_total",
            "Content request status transitions",
        ),
        &["from", "to"],
    )
    .unwrap()
});

/// Rejected status transitions.
pub static INVALID_TRANSITIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "reelforge_invalid_transitions_total",
            "Rejected content request status transitions",
        ),
        &["from", "to"],
    )
    .unwrap()
});

// =============================================================================
// Orchestrator
// =============================================================================

/// Task dispatches by role and outcome.
pub static TASKS_DISPATCHED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("reelforge_tasks_dispatched_total", "Task dispatches"),
        &["role", "outcome"], // "completed", "accepted", "failed"
    )
    .unwrap()
});

/// Dispatch call duration in seconds.
pub static DISPATCH_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "reelforge_dispatch_duration_seconds",
            "Duration of task dispatch calls",
        )
        .buckets(vec![0.05, 0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
        &["role"],
    )
    .unwrap()
});

/// Workflow callbacks by status.
pub static CALLBACKS_RECEIVED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "reelforge_callbacks_received_total",
            "Workflow automation callbacks",
        ),
        &["status"], // "success", "error", "ignored"
    )
    .unwrap()
});

/// Webhook attempts that were retried, by cause.
pub static WEBHOOK_RETRIES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "reelforge_webhook_retries_total",
            "Webhook calls retried after a transient failure",
        ),
        &["cause"], // "timeout", "connection", "server_error"
    )
    .unwrap()
});

/// Circuit breaker state changes for the workflow service.
pub static CIRCUIT_TRANSITIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "reelforge_circuit_transitions_total",
            "Workflow service circuit breaker transitions",
        ),
        &["to"], // "open", "half_open", "closed"
    )
    .unwrap()
});

/// Task retries by role.
pub static TASK_RETRIES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("reelforge_task_retries_total", "Task retries"),
        &["role"],
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Access gates
        Box::new(RATE_LIMIT_DECISIONS.clone()),
        Box::new(PASSCODE_ATTEMPTS.clone()),
        Box::new(NAVIGATION_DECISIONS.clone()),
        // Pipeline
        Box::new(REQUESTS_CREATED.clone()),
        Box::new(STATUS_TRANSITIONS.clone()),
        Box::new(INVALID_TRANSITIONS.clone()),
        // Orchestrator
        Box::new(TASKS_DISPATCHED.clone()),
        Box::new(DISPATCH_DURATION.clone()),
        Box::new(CALLBACKS_RECEIVED.clone()),
        Box::new(TASK_RETRIES.clone()),
        Box::new(WEBHOOK_RETRIES.clone()),
        Box::new(CIRCUIT_TRANSITIONS.clone()),
    ]
}
