//! Types for the request orchestrator.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::breaker::CircuitSnapshot;
use crate::pipeline::{PipelineError, RequestStatus, TaskStatus, TransitionError};

/// Errors that can occur during orchestration.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("request not found: {0}")]
    RequestNotFound(String),

    #[error("task not found: {0}")]
    TaskNotFound(String),

    /// The status machine rejected a move.
    #[error("{0}")]
    InvalidTransition(#[from] TransitionError),

    /// The operation does not apply to the request or task as it stands.
    #[error("{0}")]
    InvalidState(String),

    #[error("task {task_id} has exhausted its retries ({max_retries})")]
    RetriesExhausted { task_id: String, max_retries: u32 },

    #[error("callback task {task_id} does not belong to request {request_id}")]
    CallbackMismatch { request_id: String, task_id: String },

    #[error("pipeline store error: {0}")]
    Store(#[from] PipelineError),
}

impl OrchestratorError {
    /// The request or task changed between read and write.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Store(PipelineError::Conflict { .. }))
    }
}

/// How a `process_request` call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum ProcessOutcome {
    /// Another call is already driving this request.
    AlreadyRunning,
    /// The request reached published or cancelled.
    Terminal { status: RequestStatus },
    /// A task is in flight and will report back.
    AwaitingCallback { status: RequestStatus },
    /// Nothing is runnable (failed task, or human input needed).
    Idle { status: RequestStatus },
    /// The iteration cap was hit.
    IterationLimit { status: RequestStatus },
}

impl ProcessOutcome {
    pub fn status(&self) -> Option<RequestStatus> {
        match self {
            Self::AlreadyRunning => None,
            Self::Terminal { status }
            | Self::AwaitingCallback { status }
            | Self::Idle { status }
            | Self::IterationLimit { status } => Some(*status),
        }
    }
}

/// Result payload reported by the workflow service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallbackPayload {
    pub request_id: String,
    pub task_id: String,
    #[serde(default)]
    pub execution_id: Option<String>,
    #[serde(default)]
    pub workflow_id: Option<String>,
    pub status: CallbackStatus,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<CallbackError>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallbackStatus {
    Success,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallbackError {
    pub code: String,
    pub message: String,
}

/// What happened to a callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallbackAck {
    /// False when the task was no longer in progress.
    pub applied: bool,
    pub task_status: TaskStatus,
}

/// Current status of the orchestrator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrchestratorStatus {
    pub running: bool,
    pub mock_mode: bool,
    /// Requests currently inside `process_request`.
    pub processing: usize,
    pub timeouts_swept: u64,
    /// Workflow service breaker; absent for in-process dispatch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub circuit: Option<CircuitSnapshot>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_callback_payload_wire_format() {
        let payload: CallbackPayload = serde_json::from_value(serde_json::json!({
            "requestId": "req-1",
            "taskId": "task-1",
            "executionId": "exec-9",
            "status": "error",
            "error": { "code": "PROVIDER_DOWN", "message": "upstream 503" }
        }))
        .unwrap();
        assert_eq!(payload.request_id, "req-1");
        assert_eq!(payload.status, CallbackStatus::Error);
        assert_eq!(payload.error.unwrap().code, "PROVIDER_DOWN");
        assert!(payload.result.is_none());
    }

    #[test]
    fn test_outcome_serialization() {
        let json = serde_json::to_value(ProcessOutcome::AwaitingCallback {
            status: RequestStatus::Production,
        })
        .unwrap();
        assert_eq!(json["outcome"], "awaiting_callback");
        assert_eq!(json["status"], "production");
        assert_eq!(ProcessOutcome::AlreadyRunning.status(), None);
    }

    #[test]
    fn test_error_display() {
        let err = OrchestratorError::RetriesExhausted {
            task_id: "t-1".to_string(),
            max_retries: 3,
        };
        assert_eq!(err.to_string(), "task t-1 has exhausted its retries (3)");
        assert_eq!(
            OrchestratorError::RequestNotFound("r-1".to_string()).to_string(),
            "request not found: r-1"
        );
    }
}
