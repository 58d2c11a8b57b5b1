//! Campaign API handlers.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use reelforge_core::{
    campaign_progress, Campaign, CampaignFilter, CampaignPatch, CampaignProgress, CampaignStatus,
    CreateCampaignInput, DashboardStats, RequestFilter,
};

use super::error::ApiError;
use super::extract::{parse_enum, ApiJson, ApiQuery};
use super::middleware::AuthUser;
use crate::state::AppState;

/// Upper bound on requests folded into a campaign progress rollup.
const PROGRESS_REQUEST_LIMIT: i64 = 1000;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Query parameters for listing campaigns
#[derive(Debug, Default, Deserialize)]
pub struct ListCampaignsParams {
    pub status: Option<String>,
    pub brand_id: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct ListCampaignsResponse {
    pub campaigns: Vec<Campaign>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

// ============================================================================
// Handlers
// ============================================================================

pub async fn list_campaigns(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    ApiQuery(params): ApiQuery<ListCampaignsParams>,
) -> Result<Json<ListCampaignsResponse>, ApiError> {
    let mut filter = CampaignFilter::new(&user.0);
    if let Some(raw) = params.status.as_deref() {
        filter = filter.with_status(parse_enum::<CampaignStatus>("status", raw)?);
    }
    if let Some(brand_id) = params.brand_id {
        filter = filter.with_brand(brand_id);
    }
    if let Some(limit) = params.limit {
        filter = filter.with_limit(limit);
    }
    if let Some(offset) = params.offset {
        filter = filter.with_offset(offset);
    }

    let store = state.campaign_store();
    let campaigns = store.list(&filter)?;
    let total = store.count(&filter)?;

    Ok(Json(ListCampaignsResponse {
        campaigns,
        total,
        limit: filter.limit,
        offset: filter.offset,
    }))
}

/// Create a campaign under one of the caller's brands.
pub async fn create_campaign(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    ApiJson(input): ApiJson<CreateCampaignInput>,
) -> Result<(StatusCode, Json<Campaign>), ApiError> {
    input.validate().map_err(ApiError::Validation)?;

    if state.brand_store().get_brand(&user.0, &input.brand_id)?.is_none() {
        return Err(ApiError::NotFound(format!(
            "Brand not found: {}",
            input.brand_id
        )));
    }

    let campaign = state.campaign_store().create(input.into_new(&user.0))?;
    info!(
        campaign_id = %campaign.id,
        brand_id = %campaign.brand_id,
        "Campaign created"
    );
    Ok((StatusCode::CREATED, Json(campaign)))
}

pub async fn get_campaign(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Campaign>, ApiError> {
    state
        .campaign_store()
        .get(&user.0, &id)?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Campaign not found: {id}")))
}

pub async fn update_campaign(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
    ApiJson(patch): ApiJson<CampaignPatch>,
) -> Result<Json<Campaign>, ApiError> {
    let campaign = state.campaign_store().update(&user.0, &id, patch)?;
    Ok(Json(campaign))
}

/// Soft delete: the campaign is hidden from the dashboard but can be restored.
pub async fn delete_campaign(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Campaign>, ApiError> {
    let campaign = state.campaign_store().delete(&user.0, &id)?;
    info!(campaign_id = %id, "Campaign marked for deletion");
    Ok(Json(campaign))
}

pub async fn restore_campaign(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Campaign>, ApiError> {
    let campaign = state.campaign_store().restore(&user.0, &id)?;
    info!(campaign_id = %id, "Campaign restored");
    Ok(Json(campaign))
}

pub async fn get_campaign_progress(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<CampaignProgress>, ApiError> {
    if state.campaign_store().get(&user.0, &id)?.is_none() {
        return Err(ApiError::NotFound(format!("Campaign not found: {id}")));
    }

    let filter = RequestFilter::for_owner(&user.0)
        .with_campaign(&id)
        .with_limit(PROGRESS_REQUEST_LIMIT);
    let requests = state.pipeline_store().list_requests(&filter)?;

    Ok(Json(campaign_progress(&id, &requests)))
}

pub async fn dashboard_stats(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Result<Json<DashboardStats>, ApiError> {
    let campaigns = state.campaign_store().list_all(&user.0)?;
    let requests_by_status = state.pipeline_store().count_by_status(&user.0)?;
    Ok(Json(DashboardStats::compute(&campaigns, requests_by_status)))
}
