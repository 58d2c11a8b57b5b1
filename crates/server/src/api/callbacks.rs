//! Results reported back by the workflow-automation service.

use axum::{extract::State, Json};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

use reelforge_core::{CallbackPayload, TaskStatus};

use super::error::ApiError;
use super::extract::ApiJson;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct CallbackResponse {
    pub success: bool,
    pub applied: bool,
    pub task_status: TaskStatus,
}

/// Apply a task result and resume the request.
///
/// Results for tasks that are no longer in progress are acknowledged with
/// `applied: false`.
pub async fn n8n_callback(
    State(state): State<Arc<AppState>>,
    ApiJson(payload): ApiJson<CallbackPayload>,
) -> Result<Json<CallbackResponse>, ApiError> {
    let orchestrator = state.orchestrator();
    let ack = orchestrator.handle_callback(&payload)?;

    if ack.applied {
        info!(
            request_id = %payload.request_id,
            task_id = %payload.task_id,
            execution_id = ?payload.execution_id,
            status = %ack.task_status,
            "Callback applied"
        );
        orchestrator.spawn_process(payload.request_id.clone());
    } else {
        debug!(
            request_id = %payload.request_id,
            task_id = %payload.task_id,
            "Callback for settled task ignored"
        );
    }

    Ok(Json(CallbackResponse {
        success: true,
        applied: ack.applied,
        task_status: ack.task_status,
    }))
}
