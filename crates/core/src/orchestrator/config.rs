//! Orchestrator configuration.

use serde::{Deserialize, Serialize};

/// Configuration for the request orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Retries allowed per retryable task before it stays failed.
    #[serde(default = "default_max_task_retries")]
    pub max_task_retries: u32,

    /// Upper bound on handler passes per `process_request` call.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Base URL of the workflow-automation service.
    /// Tasks are posted to `<base>/webhook/<workflow>`.
    #[serde(default = "default_webhook_base_url")]
    pub webhook_base_url: String,

    /// Public base URL of this server, used to build callback URLs.
    #[serde(default = "default_callback_base_url")]
    pub callback_base_url: String,

    /// Sent as `Authorization: Bearer <key>` on every webhook call.
    #[serde(default, skip_serializing)]
    pub webhook_api_key: Option<String>,

    /// Timeout for a single webhook dispatch (seconds).
    #[serde(default = "default_dispatch_timeout")]
    pub dispatch_timeout_secs: u64,

    /// Attempts per dispatch. Client errors (4xx) are never retried.
    #[serde(default = "default_dispatch_max_attempts")]
    pub dispatch_max_attempts: u32,

    /// Delay before the first retry, doubled on every further attempt (ms).
    #[serde(default = "default_dispatch_backoff_ms")]
    pub dispatch_backoff_ms: u64,

    /// Failure share within the window that opens the circuit.
    #[serde(default = "default_breaker_failure_ratio")]
    pub breaker_failure_ratio: f64,

    /// Window over which dispatch outcomes are counted (seconds).
    #[serde(default = "default_breaker_window")]
    pub breaker_window_secs: u64,

    /// How long an open circuit fails fast before a trial call (seconds).
    #[serde(default = "default_breaker_cooldown")]
    pub breaker_cooldown_secs: u64,

    /// How long a repeated idempotency key returns the earlier request
    /// (seconds).
    #[serde(default = "default_idempotency_window")]
    pub idempotency_window_secs: u64,

    /// Complete every task in process instead of calling the webhook.
    #[serde(default)]
    pub mock_mode: bool,

    /// How often stuck in-progress tasks are swept (seconds, 0 = never).
    #[serde(default = "default_timeout_sweep")]
    pub timeout_sweep_secs: u64,
}

fn default_max_task_retries() -> u32 {
    3
}

fn default_max_iterations() -> u32 {
    10
}

fn default_webhook_base_url() -> String {
    "http://localhost:5678".to_string()
}

fn default_callback_base_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_dispatch_timeout() -> u64 {
    30
}

fn default_timeout_sweep() -> u64 {
    60
}

fn default_dispatch_max_attempts() -> u32 {
    3
}

fn default_dispatch_backoff_ms() -> u64 {
    1000
}

fn default_breaker_failure_ratio() -> f64 {
    0.5
}

fn default_breaker_window() -> u64 {
    60
}

fn default_breaker_cooldown() -> u64 {
    60
}

fn default_idempotency_window() -> u64 {
    24 * 60 * 60
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_task_retries: default_max_task_retries(),
            max_iterations: default_max_iterations(),
            webhook_base_url: default_webhook_base_url(),
            callback_base_url: default_callback_base_url(),
            webhook_api_key: None,
            dispatch_timeout_secs: default_dispatch_timeout(),
            dispatch_max_attempts: default_dispatch_max_attempts(),
            dispatch_backoff_ms: default_dispatch_backoff_ms(),
            breaker_failure_ratio: default_breaker_failure_ratio(),
            breaker_window_secs: default_breaker_window(),
            breaker_cooldown_secs: default_breaker_cooldown(),
            idempotency_window_secs: default_idempotency_window(),
            mock_mode: false,
            timeout_sweep_secs: default_timeout_sweep(),
        }
    }
}

impl OrchestratorConfig {
    /// Where the workflow service reports asynchronous results.
    pub fn callback_url(&self) -> String {
        format!(
            "{}/api/v1/callbacks/n8n",
            self.callback_base_url.trim_end_matches('/')
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.max_task_retries, 3);
        assert_eq!(config.max_iterations, 10);
        assert_eq!(config.webhook_base_url, "http://localhost:5678");
        assert_eq!(config.dispatch_timeout_secs, 30);
        assert!(!config.mock_mode);
        assert_eq!(config.timeout_sweep_secs, 60);
        assert_eq!(config.dispatch_max_attempts, 3);
        assert_eq!(config.dispatch_backoff_ms, 1000);
        assert_eq!(config.breaker_failure_ratio, 0.5);
        assert_eq!(config.idempotency_window_secs, 86_400);
        assert!(config.webhook_api_key.is_none());
    }

    #[test]
    fn test_deserialize_minimal() {
        let config: OrchestratorConfig = toml::from_str("mock_mode = true").unwrap();
        assert!(config.mock_mode);
        assert_eq!(config.max_iterations, 10);
        assert_eq!(config.callback_base_url, "http://localhost:8080");
    }

    #[test]
    fn test_deserialize_full() {
        let toml = r#"
            max_task_retries = 5
            max_iterations = 20
            webhook_base_url = "https://n8n.example.com"
            callback_base_url = "https://app.example.com/"
            dispatch_timeout_secs = 10
            timeout_sweep_secs = 0
            webhook_api_key = "n8n-key"
            dispatch_max_attempts = 5
            idempotency_window_secs = 3600
        "#;
        let config: OrchestratorConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.max_task_retries, 5);
        assert_eq!(config.max_iterations, 20);
        assert_eq!(config.dispatch_timeout_secs, 10);
        assert_eq!(config.timeout_sweep_secs, 0);
        assert_eq!(config.webhook_api_key.as_deref(), Some("n8n-key"));
        assert_eq!(config.dispatch_max_attempts, 5);
        assert_eq!(config.idempotency_window_secs, 3600);
        assert_eq!(
            config.callback_url(),
            "https://app.example.com/api/v1/callbacks/n8n"
        );
    }

    #[test]
    fn test_api_key_is_not_serialized() {
        let config = OrchestratorConfig {
            webhook_api_key: Some("n8n-key".to_string()),
            ..Default::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("n8n-key"));
        assert!(!json.contains("webhook_api_key"));
    }
}
