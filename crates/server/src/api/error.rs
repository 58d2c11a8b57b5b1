//! API error type and its JSON rendering.
//!
//! Every `/api/v1` handler fails with [`ApiError`]. The body is always
//! `{ "error": { "code", "message", "fields"? } }`; datastore and internal
//! failures are logged here and replaced by a generic message.

use axum::{
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::error;

use reelforge_core::{
    BrandError, CampaignError, FieldError, OrchestratorError, PipelineError, RateLimitDecision,
};

#[derive(Debug)]
pub enum ApiError {
    Validation(Vec<FieldError>),
    BadRequest(String),
    Unauthorized(String),
    Forbidden(String),
    NotFound(String),
    Conflict(String),
    RateLimited(RateLimitDecision),
    ServiceUnavailable(String),
    Database(String),
    Internal(String),
}

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    error: ErrorDetail<'a>,
}

#[derive(Debug, Serialize)]
struct ErrorDetail<'a> {
    code: &'static str,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    fields: Option<&'a [FieldError]>,
}

impl ApiError {
    pub fn validation(field: &str, message: &str) -> Self {
        Self::Validation(vec![FieldError::new(field, message)])
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            Self::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Database(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Conflict(_) => "CONFLICT",
            Self::RateLimited(_) => "RATE_LIMITED",
            Self::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
            Self::Database(_) => "DB_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

/// `X-RateLimit-*` and `Retry-After` headers for a limiter decision.
pub fn rate_limit_headers(decision: &RateLimitDecision) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert("x-ratelimit-limit", HeaderValue::from(decision.limit));
    headers.insert("x-ratelimit-remaining", HeaderValue::from(decision.remaining));
    headers.insert("x-ratelimit-reset", HeaderValue::from(decision.reset_at_secs()));
    if let Some(retry_after) = decision.retry_after_secs {
        headers.insert("retry-after", HeaderValue::from(retry_after));
    }
    headers
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();

        let (message, fields): (String, Option<&[FieldError]>) = match &self {
            Self::Validation(fields) => ("Validation failed".to_string(), Some(fields.as_slice())),
            Self::BadRequest(m)
            | Self::Unauthorized(m)
            | Self::Forbidden(m)
            | Self::NotFound(m)
            | Self::Conflict(m)
            | Self::ServiceUnavailable(m) => (m.clone(), None),
            Self::RateLimited(_) => ("Too many requests. Please try again later.".to_string(), None),
            Self::Database(detail) => {
                error!("Database error: {}", detail);
                ("Database operation failed".to_string(), None)
            }
            Self::Internal(detail) => {
                error!("Internal error: {}", detail);
                ("Internal server error".to_string(), None)
            }
        };

        let body = Json(ErrorBody {
            error: ErrorDetail {
                code,
                message: &message,
                fields,
            },
        });

        match &self {
            Self::RateLimited(decision) => {
                (status, rate_limit_headers(decision), body).into_response()
            }
            _ => (status, body).into_response(),
        }
    }
}

impl From<CampaignError> for ApiError {
    fn from(e: CampaignError) -> Self {
        match e {
            CampaignError::NotFound(_) => Self::NotFound(e.to_string()),
            CampaignError::Immutable { .. } => Self::Forbidden(e.to_string()),
            CampaignError::NotRestorable { .. } => Self::Conflict(e.to_string()),
            CampaignError::Validation(fields) => Self::Validation(fields),
            CampaignError::Database(detail) => Self::Database(detail),
        }
    }
}

impl From<BrandError> for ApiError {
    fn from(e: BrandError) -> Self {
        match e {
            BrandError::BrandNotFound(_) | BrandError::KnowledgeBaseNotFound(_) => {
                Self::NotFound(e.to_string())
            }
            BrandError::Database(detail) => Self::Database(detail),
        }
    }
}

impl From<PipelineError> for ApiError {
    fn from(e: PipelineError) -> Self {
        match e {
            PipelineError::RequestNotFound(_) | PipelineError::TaskNotFound(_) => {
                Self::NotFound(e.to_string())
            }
            PipelineError::Conflict { .. } => Self::Conflict(e.to_string()),
            PipelineError::Database(detail) => Self::Database(detail),
        }
    }
}

impl From<OrchestratorError> for ApiError {
    fn from(e: OrchestratorError) -> Self {
        match e {
            OrchestratorError::RequestNotFound(_) | OrchestratorError::TaskNotFound(_) => {
                Self::NotFound(e.to_string())
            }
            OrchestratorError::InvalidTransition(_) | OrchestratorError::InvalidState(_) => {
                Self::BadRequest(e.to_string())
            }
            OrchestratorError::RetriesExhausted { .. } => Self::Conflict(e.to_string()),
            OrchestratorError::CallbackMismatch { .. } => Self::BadRequest(e.to_string()),
            OrchestratorError::Store(inner) => inner.into(),
        }
    }
}
