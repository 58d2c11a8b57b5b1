//! Dispatching agent tasks to whatever executes them.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;

use super::breaker::CircuitSnapshot;
use crate::pipeline::{AgentRole, ContentRequest, RequestTask};

/// Errors from the transport used to hand a task off.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("dispatch timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("workflow returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid workflow response: {0}")]
    InvalidResponse(String),

    #[error("workflow service circuit open, retry in {retry_after_secs}s")]
    CircuitOpen { retry_after_secs: u64 },
}

impl DispatchError {
    /// Machine-readable code stored on the failed task.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Timeout => "DISPATCH_TIMEOUT",
            Self::Connection(_) => "DISPATCH_CONNECTION",
            Self::Status { .. } => "DISPATCH_HTTP_ERROR",
            Self::InvalidResponse(_) => "DISPATCH_INVALID_RESPONSE",
            Self::CircuitOpen { .. } => "DISPATCH_CIRCUIT_OPEN",
        }
    }

    /// Transient failures worth another attempt. Client errors are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout | Self::Connection(_) => true,
            Self::Status { status, .. } => *status >= 500,
            Self::InvalidResponse(_) | Self::CircuitOpen { .. } => false,
        }
    }
}

/// What the executor did with a task.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    /// Finished synchronously with this output.
    Completed { output: Value },
    /// Accepted for asynchronous execution; a callback will follow.
    Accepted { external_job_id: Option<String> },
    /// Rejected by the executor.
    Failed { code: String, message: String },
}

/// Body sent to the executor for one task.
#[derive(Debug, Clone, Serialize)]
pub struct DispatchRequest {
    pub request_id: String,
    pub task_id: String,
    pub agent_role: AgentRole,
    pub workflow: &'static str,
    pub input_data: Value,
    pub callback_url: String,
}

impl DispatchRequest {
    pub fn new(task: &RequestTask, input_data: Value, callback_url: String) -> Self {
        Self {
            request_id: task.request_id.clone(),
            task_id: task.id.clone(),
            agent_role: task.agent_role,
            workflow: workflow_for(task.agent_role),
            input_data,
            callback_url,
        }
    }
}

/// Workflow path that runs a role.
pub fn workflow_for(role: AgentRole) -> &'static str {
    match role {
        AgentRole::Executive => "executive",
        AgentRole::TaskPlanner => "task-planner",
        AgentRole::Strategist => "strategist",
        AgentRole::Copywriter => "copywriter",
        AgentRole::Producer => "production/dispatch",
        AgentRole::Qa => "campaign/verify",
    }
}

/// Roles whose work finishes out of band and reports back via callback.
pub fn is_async_role(role: AgentRole) -> bool {
    role == AgentRole::Producer
}

/// Executes agent tasks.
#[async_trait]
pub trait TaskDispatcher: Send + Sync {
    async fn dispatch(&self, request: &DispatchRequest) -> Result<DispatchOutcome, DispatchError>;

    /// Health of the remote executor, when there is one.
    fn circuit(&self) -> Option<CircuitSnapshot> {
        None
    }
}

/// Completes every task in process with synthetic output.
///
/// Used when no workflow service is available.
#[derive(Debug, Default, Clone)]
pub struct InProcessDispatcher;

impl InProcessDispatcher {
    pub fn new() -> Self {
        Self
    }

    fn output_for(request: &DispatchRequest) -> Value {
        match request.agent_role {
            AgentRole::Executive => json!({ "approved": true, "notes": "Brief accepted" }),
            AgentRole::TaskPlanner => json!({ "plan": ["strategy", "script", "production", "qa"] }),
            AgentRole::Strategist => json!({ "strategy": { "hook": "Open on the product in use" } }),
            AgentRole::Copywriter => json!({ "script": "Meet the product that does it all." }),
            AgentRole::Producer => json!({
                "output_url": format!("mock://assets/{}/{}", request.request_id, request.task_id),
                "provider": "in_process",
            }),
            AgentRole::Qa => json!({ "passed": true, "score": 1.0 }),
        }
    }
}

#[async_trait]
impl TaskDispatcher for InProcessDispatcher {
    async fn dispatch(&self, request: &DispatchRequest) -> Result<DispatchOutcome, DispatchError> {
        Ok(DispatchOutcome::Completed {
            output: Self::output_for(request),
        })
    }
}

/// Input sent for a task, refreshed with results produced since it was built.
pub fn dispatch_input(request: &ContentRequest, task: &RequestTask, tasks: &[RequestTask]) -> Value {
    let mut input = task.input_data.clone();
    if task.agent_role == AgentRole::Qa {
        let output_url = request.output_url.clone().or_else(|| {
            tasks
                .iter()
                .find(|t| t.agent_role == AgentRole::Producer)
                .and_then(|t| t.output_url.clone())
        });
        if let Some(obj) = input.as_object_mut() {
            obj.insert("output_url".to_string(), json!(output_url));
        }
    }
    input
}
