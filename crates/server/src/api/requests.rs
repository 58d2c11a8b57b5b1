//! Content request API handlers.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, warn};

use reelforge_core::pipeline::{
    compute_progress, estimate, estimate_request, idempotency_key, status_machine, task_factory,
    CostEstimate, EstimateParams, ProgressInfo, RequestEvent, StatusSummary,
};
use reelforge_core::{
    ContentRequest, CreateRequestInput, RequestFilter, RequestStatus, RequestTask,
    UpdateRequestInput,
};

use super::error::ApiError;
use super::extract::{parse_enum, ApiJson, ApiQuery};
use super::middleware::AuthUser;
use crate::state::AppState;

/// Header carrying the unlock key on retries.
pub const UNLOCK_KEY_HEADER: &str = "x-unlock-key";

const DEFAULT_LIMIT: i64 = 20;
const MAX_LIMIT: i64 = 100;

/// Events embedded in a request detail response.
const DETAIL_EVENT_LIMIT: i64 = 50;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Query parameters for listing requests
#[derive(Debug, Default, Deserialize)]
pub struct ListRequestsParams {
    pub status: Option<String>,
    pub campaign_id: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct ListRequestsResponse {
    pub requests: Vec<ContentRequest>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

/// Where the orchestrator stands with a request.
#[derive(Debug, Serialize)]
pub struct OrchestratorState {
    pub stage: &'static str,
    pub status_label: &'static str,
    pub completion_percentage: u8,
    pub all_tasks_complete: bool,
    pub current_task: Option<RequestTask>,
    pub next_task: Option<RequestTask>,
    pub task_counts: StatusSummary,
}

impl OrchestratorState {
    fn new(status: RequestStatus, tasks: &[RequestTask]) -> Self {
        Self {
            stage: status_machine::stage(status).description(),
            status_label: status_machine::status_label(status),
            completion_percentage: task_factory::completion_percentage(tasks),
            all_tasks_complete: task_factory::all_complete(tasks),
            current_task: task_factory::current_task(tasks).cloned(),
            next_task: task_factory::next_runnable(tasks).cloned(),
            task_counts: task_factory::status_summary(tasks),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RequestDetailResponse {
    #[serde(flatten)]
    pub request: ContentRequest,
    pub tasks: Vec<RequestTask>,
    pub events: Vec<RequestEvent>,
    pub orchestrator_state: OrchestratorState,
}

#[derive(Debug, Serialize)]
pub struct DeleteRequestResponse {
    pub deleted: bool,
    pub id: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListEventsParams {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    /// `asc` or `desc` (default).
    pub order: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ListEventsResponse {
    pub events: Vec<RequestEvent>,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, Serialize)]
pub struct RetryResponse {
    pub request_id: String,
    pub retried_tasks: Vec<RequestTask>,
    pub cap_lifted: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct CancelRequestBody {
    pub reason: Option<String>,
}

fn clamp_limit(limit: Option<i64>) -> i64 {
    limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
}

/// Load a request owned by the caller, or 404.
fn owned_request(state: &AppState, owner_id: &str, id: &str) -> Result<ContentRequest, ApiError> {
    state
        .pipeline_store()
        .get_request(owner_id, id)?
        .ok_or_else(|| ApiError::NotFound(format!("Request not found: {id}")))
}

// ============================================================================
// Handlers
// ============================================================================

/// Create a content request and start processing it.
///
/// The idempotency key is derived from the caller and the raw body; a
/// repeated submission returns the existing request with 200.
pub async fn create_request(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    ApiJson(raw): ApiJson<Value>,
) -> Result<(StatusCode, Json<ContentRequest>), ApiError> {
    let input: CreateRequestInput = serde_json::from_value(raw.clone())
        .map_err(|e| ApiError::validation("body", &e.to_string()))?;
    input.validate().map_err(ApiError::Validation)?;

    if state.brand_store().get_brand(&user.0, &input.brand_id)?.is_none() {
        return Err(ApiError::NotFound(format!(
            "Brand not found: {}",
            input.brand_id
        )));
    }
    if let Some(campaign_id) = &input.campaign_id {
        if state.campaign_store().get(&user.0, campaign_id)?.is_none() {
            return Err(ApiError::NotFound(format!(
                "Campaign not found: {campaign_id}"
            )));
        }
    }

    let settings = input.settings.clone().unwrap_or_default();
    let quote = estimate_request(
        input.request_type,
        input.requirements.duration,
        settings.tier.unwrap_or_default(),
        settings.auto_script.unwrap_or(true),
    );

    let mut new = input.into_new(&user.0);
    new.estimated_cost = Some(quote.cost);
    new.estimated_time_seconds = Some(quote.time_seconds);
    new.metadata = json!({ "cost_breakdown": quote.breakdown });
    new.idempotency_key = Some(idempotency_key(&user.0, &raw));

    let orchestrator = state.orchestrator();
    let (request, created) = orchestrator.submit_request(new)?;
    if !created {
        return Ok((StatusCode::OK, Json(request)));
    }

    orchestrator.spawn_process(request.id.clone());
    Ok((StatusCode::CREATED, Json(request)))
}

pub async fn list_requests(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    ApiQuery(params): ApiQuery<ListRequestsParams>,
) -> Result<Json<ListRequestsResponse>, ApiError> {
    let limit = clamp_limit(params.limit);
    let offset = params.offset.unwrap_or(0).max(0);

    let mut filter = RequestFilter::for_owner(&user.0)
        .with_limit(limit)
        .with_offset(offset);
    if let Some(raw) = params.status.as_deref() {
        filter = filter.with_status(parse_enum::<RequestStatus>("status", raw)?);
    }
    if let Some(campaign_id) = params.campaign_id {
        filter = filter.with_campaign(campaign_id);
    }

    let store = state.pipeline_store();
    let requests = store.list_requests(&filter)?;
    let total = store.count_requests(&filter)?;

    Ok(Json(ListRequestsResponse {
        requests,
        total,
        limit,
        offset,
    }))
}

/// A request with its tasks, latest events and orchestrator summary.
pub async fn get_request(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<RequestDetailResponse>, ApiError> {
    let request = owned_request(&state, &user.0, &id)?;
    let store = state.pipeline_store();
    let tasks = store.list_tasks(&id)?;
    let events = store.list_events(&id, DETAIL_EVENT_LIMIT, 0, true)?;

    Ok(Json(RequestDetailResponse {
        orchestrator_state: OrchestratorState::new(request.status, &tasks),
        request,
        tasks,
        events,
    }))
}

/// Rename a request or cancel it.
pub async fn update_request(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
    ApiJson(input): ApiJson<UpdateRequestInput>,
) -> Result<Json<ContentRequest>, ApiError> {
    input.validate().map_err(ApiError::Validation)?;

    let request = owned_request(&state, &user.0, &id)?;
    if request.status.is_terminal() {
        return Err(ApiError::BadRequest(format!(
            "Cannot modify request in terminal status: {}",
            request.status
        )));
    }

    let mut updated = request;
    if let Some(title) = &input.title {
        updated = state
            .pipeline_store()
            .update_title(&user.0, &id, title.trim())?;
    }
    if input.status == Some(RequestStatus::Cancelled) {
        updated = state
            .orchestrator()
            .cancel_request(&id, None, &user.actor())?;
    }

    Ok(Json(updated))
}

/// Delete a request that never got going or was cancelled.
pub async fn delete_request(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<DeleteRequestResponse>, ApiError> {
    let request = owned_request(&state, &user.0, &id)?;
    if !matches!(
        request.status,
        RequestStatus::Intake | RequestStatus::Cancelled
    ) {
        return Err(ApiError::BadRequest(format!(
            "Only intake or cancelled requests can be deleted (current: {})",
            request.status
        )));
    }

    state.pipeline_store().delete_request(&user.0, &id)?;
    info!(request_id = %id, "Request deleted");
    Ok(Json(DeleteRequestResponse { deleted: true, id }))
}

pub async fn get_request_progress(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<ProgressInfo>, ApiError> {
    owned_request(&state, &user.0, &id)?;
    let tasks = state.pipeline_store().list_tasks(&id)?;
    Ok(Json(compute_progress(&tasks, Utc::now())))
}

pub async fn list_request_events(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
    ApiQuery(params): ApiQuery<ListEventsParams>,
) -> Result<Json<ListEventsResponse>, ApiError> {
    owned_request(&state, &user.0, &id)?;

    let newest_first = match params.order.as_deref() {
        None | Some("desc") => true,
        Some("asc") => false,
        Some(other) => {
            return Err(ApiError::validation(
                "order",
                &format!("must be asc or desc, got {other}"),
            ))
        }
    };
    let limit = clamp_limit(params.limit);
    let offset = params.offset.unwrap_or(0).max(0);

    let events = state
        .pipeline_store()
        .list_events(&id, limit, offset, newest_first)?;
    Ok(Json(ListEventsResponse {
        events,
        limit,
        offset,
    }))
}

/// Reset failed tasks and resume processing.
///
/// A valid `X-Unlock-Key` header also retries tasks at their retry cap.
pub async fn retry_request(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<RetryResponse>, ApiError> {
    owned_request(&state, &user.0, &id)?;

    let cap_lifted = match headers.get(UNLOCK_KEY_HEADER) {
        None => false,
        Some(value) => {
            let key = value.to_str().unwrap_or_default();
            if !state.unlock_key().validate(key) {
                warn!(request_id = %id, user_id = %user.0, "Retry with invalid unlock key");
                return Err(ApiError::Forbidden("Invalid unlock key".to_string()));
            }
            true
        }
    };

    let orchestrator = state.orchestrator();
    let retried_tasks = orchestrator.retry_request(&id, &user.actor(), cap_lifted)?;
    orchestrator.spawn_process(id.clone());

    Ok(Json(RetryResponse {
        request_id: id,
        retried_tasks,
        cap_lifted,
    }))
}

/// Cancel a request. The body, if any, may carry a `reason`.
pub async fn cancel_request(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<ContentRequest>, ApiError> {
    let body: CancelRequestBody = if body.is_empty() {
        CancelRequestBody::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| ApiError::validation("body", &e.to_string()))?
    };

    owned_request(&state, &user.0, &id)?;
    let request = state
        .orchestrator()
        .cancel_request(&id, body.reason.as_deref(), &user.actor())?;
    Ok(Json(request))
}

/// Quote cost and turnaround without creating anything.
pub async fn estimate_cost(ApiJson(params): ApiJson<EstimateParams>) -> Json<CostEstimate> {
    Json(estimate(&params))
}
