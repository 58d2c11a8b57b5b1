//! Brand and knowledge base API handlers.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use reelforge_core::{Brand, CreateBrandInput, CreateKnowledgeBaseInput, KnowledgeBase};

use super::error::ApiError;
use super::extract::{ApiJson, ApiQuery};
use super::middleware::AuthUser;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct ListBrandsResponse {
    pub brands: Vec<Brand>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListKnowledgeBasesParams {
    pub brand_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ListKnowledgeBasesResponse {
    pub knowledge_bases: Vec<KnowledgeBase>,
}

pub async fn list_brands(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Result<Json<ListBrandsResponse>, ApiError> {
    let brands = state.brand_store().list_brands(&user.0)?;
    Ok(Json(ListBrandsResponse { brands }))
}

pub async fn create_brand(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    ApiJson(input): ApiJson<CreateBrandInput>,
) -> Result<(StatusCode, Json<Brand>), ApiError> {
    input.validate().map_err(ApiError::Validation)?;
    let brand = state.brand_store().create_brand(&user.0, input)?;
    info!(brand_id = %brand.id, "Brand created");
    Ok((StatusCode::CREATED, Json(brand)))
}

pub async fn get_brand(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Brand>, ApiError> {
    state
        .brand_store()
        .get_brand(&user.0, &id)?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Brand not found: {id}")))
}

pub async fn list_knowledge_bases(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    ApiQuery(params): ApiQuery<ListKnowledgeBasesParams>,
) -> Result<Json<ListKnowledgeBasesResponse>, ApiError> {
    let knowledge_bases = state
        .brand_store()
        .list_knowledge_bases(&user.0, params.brand_id.as_deref())?;
    Ok(Json(ListKnowledgeBasesResponse { knowledge_bases }))
}

/// Attach a knowledge base to one of the caller's brands.
pub async fn create_knowledge_base(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    ApiJson(input): ApiJson<CreateKnowledgeBaseInput>,
) -> Result<(StatusCode, Json<KnowledgeBase>), ApiError> {
    input.validate().map_err(ApiError::Validation)?;
    let kb = state.brand_store().create_knowledge_base(&user.0, input)?;
    info!(knowledge_base_id = %kb.id, brand_id = %kb.brand_id, "Knowledge base created");
    Ok((StatusCode::CREATED, Json(kb)))
}

pub async fn get_knowledge_base(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<KnowledgeBase>, ApiError> {
    state
        .brand_store()
        .get_knowledge_base(&user.0, &id)?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Knowledge base not found: {id}")))
}
