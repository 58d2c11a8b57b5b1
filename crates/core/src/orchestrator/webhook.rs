//! Webhook dispatcher for the workflow-automation service.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, warn};

use super::breaker::{CircuitBreaker, CircuitSnapshot};
use super::config::OrchestratorConfig;
use super::dispatcher::{
    is_async_role, DispatchError, DispatchOutcome, DispatchRequest, TaskDispatcher,
};
use crate::metrics::WEBHOOK_RETRIES;

/// Posts tasks to `<base>/webhook/<workflow>`.
///
/// Synchronous roles answer with their output in the response body. The
/// producer answers immediately and reports through the callback endpoint.
///
/// Timeouts, connection failures and 5xx answers are retried with
/// exponential backoff. All calls share one [`CircuitBreaker`].
pub struct WebhookDispatcher {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    max_attempts: u32,
    backoff: Duration,
    breaker: CircuitBreaker,
}

impl WebhookDispatcher {
    pub fn new(config: &OrchestratorConfig) -> Result<Self, DispatchError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.dispatch_timeout_secs))
            .build()
            .map_err(|e| DispatchError::Connection(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.webhook_base_url.trim_end_matches('/').to_string(),
            api_key: config
                .webhook_api_key
                .clone()
                .filter(|key| !key.is_empty()),
            max_attempts: config.dispatch_max_attempts.max(1),
            backoff: Duration::from_millis(config.dispatch_backoff_ms),
            breaker: CircuitBreaker::new(
                config.breaker_failure_ratio,
                Duration::from_secs(config.breaker_window_secs),
                Duration::from_secs(config.breaker_cooldown_secs),
            ),
        })
    }

    fn url_for(&self, workflow: &str) -> String {
        format!("{}/webhook/{}", self.base_url, workflow)
    }

    /// Delay before attempt `attempt + 1`: base, 2x base, 4x base...
    fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.saturating_sub(1).min(16);
        self.backoff.saturating_mul(factor)
    }

    async fn post_once(&self, url: &str, request: &DispatchRequest) -> Result<Value, DispatchError> {
        let mut builder = self.client.post(url).json(request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(transport_error)?;
        let status = response.status();
        let body = response.text().await.map_err(transport_error)?;

        if !status.is_success() {
            return Err(DispatchError::Status {
                status: status.as_u16(),
                body: body.chars().take(200).collect(),
            });
        }

        if body.trim().is_empty() {
            return Ok(Value::Object(Default::default()));
        }
        serde_json::from_str(&body).map_err(|e| DispatchError::InvalidResponse(e.to_string()))
    }
}

fn transport_error(e: reqwest::Error) -> DispatchError {
    if e.is_timeout() {
        DispatchError::Timeout
    } else {
        DispatchError::Connection(e.to_string())
    }
}

fn retry_cause(err: &DispatchError) -> &'static str {
    match err {
        DispatchError::Timeout => "timeout",
        DispatchError::Connection(_) => "connection",
        _ => "server_error",
    }
}

fn external_job_id(body: &Value) -> Option<String> {
    ["executionId", "execution_id", "jobId"]
        .iter()
        .find_map(|key| body.get(*key))
        .and_then(|v| match v {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
}

#[async_trait]
impl TaskDispatcher for WebhookDispatcher {
    async fn dispatch(&self, request: &DispatchRequest) -> Result<DispatchOutcome, DispatchError> {
        let url = self.url_for(request.workflow);
        let mut attempt = 1;

        let parsed = loop {
            if let Err(wait) = self.breaker.try_acquire() {
                return Err(DispatchError::CircuitOpen {
                    retry_after_secs: wait.as_secs().max(1),
                });
            }

            debug!(url = %url, task_id = %request.task_id, attempt, "Dispatching task");
            let result = self.post_once(&url, request).await;

            // A client error still means the service answered
            let outage = matches!(&result, Err(e) if e.is_retryable());
            self.breaker.record(!outage);

            match result {
                Err(e) if e.is_retryable() && attempt < self.max_attempts => {
                    let delay = self.backoff_for(attempt);
                    WEBHOOK_RETRIES.with_label_values(&[retry_cause(&e)]).inc();
                    warn!(
                        task_id = %request.task_id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Workflow call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                other => break other?,
            }
        };

        if is_async_role(request.agent_role) {
            return Ok(DispatchOutcome::Accepted {
                external_job_id: external_job_id(&parsed),
            });
        }

        Ok(DispatchOutcome::Completed { output: parsed })
    }

    fn circuit(&self) -> Option<CircuitSnapshot> {
        Some(self.breaker.snapshot())
    }
}
