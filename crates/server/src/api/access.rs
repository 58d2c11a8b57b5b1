//! Passcode, session and unlock endpoints.

use axum::{
    extract::State,
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use reelforge_core::{PasscodeError, SessionIntrospector, SessionState};

use super::error::{rate_limit_headers, ApiError};
use super::extract::ApiJson;
use super::middleware::{AuthUser, ClientRequest};
use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct PasscodeBody {
    pub passcode: String,
}

#[derive(Debug, Serialize)]
pub struct PasscodeSuccess {
    pub success: bool,
}

/// Plain error body used by the passcode endpoint.
#[derive(Debug, Serialize)]
pub struct PasscodeFailure {
    pub error: String,
}

#[derive(Debug, Deserialize)]
pub struct UnlockBody {
    pub key: String,
}

#[derive(Debug, Serialize)]
pub struct UnlockResponse {
    pub unlocked: bool,
}

// ============================================================================
// Handlers
// ============================================================================

/// Check a passcode submission and issue the verification cookie.
pub async fn verify_passcode(
    State(state): State<Arc<AppState>>,
    ClientRequest(client): ClientRequest,
    ApiJson(body): ApiJson<PasscodeBody>,
) -> Response {
    match state
        .passcode_gate()
        .verify(client.source_ip, &body.passcode)
        .await
    {
        Ok(grant) => {
            let mut response = Json(PasscodeSuccess { success: true }).into_response();
            match HeaderValue::from_str(&grant.cookie_header()) {
                Ok(cookie) => {
                    response.headers_mut().insert(header::SET_COOKIE, cookie);
                    response
                }
                Err(e) => failure(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()),
            }
        }
        Err(PasscodeError::RateLimited(decision)) => {
            let body = Json(PasscodeFailure {
                error: PasscodeError::RateLimited(decision.clone()).to_string(),
            });
            (StatusCode::TOO_MANY_REQUESTS, rate_limit_headers(&decision), body).into_response()
        }
        Err(e @ PasscodeError::Invalid) => failure(StatusCode::UNAUTHORIZED, &e.to_string()),
        Err(e @ PasscodeError::NotConfigured) => {
            failure(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string())
        }
        Err(PasscodeError::LimiterUnavailable(detail)) => {
            warn!(client_ip = %client.source_ip, "Passcode limiter unavailable: {}", detail);
            failure(
                StatusCode::SERVICE_UNAVAILABLE,
                "Service temporarily unavailable",
            )
        }
    }
}

fn failure(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(PasscodeFailure {
            error: message.to_string(),
        }),
    )
        .into_response()
}

/// Session state of the caller as seen by this server.
///
/// Always resolved in process so that an HTTP introspector pointed at this
/// endpoint cannot loop.
pub async fn get_session(
    State(state): State<Arc<AppState>>,
    ClientRequest(client): ClientRequest,
) -> Result<Json<SessionState>, ApiError> {
    state
        .local_session()
        .introspect(&client)
        .await
        .map(Json)
        .map_err(|e| ApiError::ServiceUnavailable(e.to_string()))
}

/// Check an unlock key.
pub async fn unlock(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    ApiJson(body): ApiJson<UnlockBody>,
) -> Json<UnlockResponse> {
    let unlocked = state.unlock_key().validate(&body.key);
    if unlocked {
        info!(user_id = %user.0, "Unlock key accepted");
    } else {
        warn!(user_id = %user.0, "Unlock key rejected");
    }
    Json(UnlockResponse { unlocked })
}
