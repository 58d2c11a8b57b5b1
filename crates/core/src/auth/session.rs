//! Session introspection: who is signed in, and have they passed the passcode gate.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::{AuthError, AuthRequest, Authenticator, SessionIntrospector, PASSCODE_COOKIE};

/// What the session endpoint reports about the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    pub authenticated: bool,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub user_email: Option<String>,
    #[serde(rename = "passcodeVerified", default)]
    pub passcode_verified: bool,
}

/// Access levels, ordered. Only login and passcode submission move a
/// caller up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessLevel {
    Anonymous,
    AuthenticatedUnverified,
    FullyVerified,
}

impl SessionState {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn access_level(&self) -> AccessLevel {
        match (self.authenticated, self.passcode_verified) {
            (false, _) => AccessLevel::Anonymous,
            (true, false) => AccessLevel::AuthenticatedUnverified,
            (true, true) => AccessLevel::FullyVerified,
        }
    }
}

/// Whether the request carries an accepted passcode cookie.
pub fn has_passcode_cookie(request: &AuthRequest) -> bool {
    request.cookie(PASSCODE_COOKIE) == Some("true")
}

/// Resolves sessions in process through the configured authenticator.
pub struct LocalSessionIntrospector {
    authenticator: Arc<dyn Authenticator>,
}

impl LocalSessionIntrospector {
    pub fn new(authenticator: Arc<dyn Authenticator>) -> Self {
        Self { authenticator }
    }
}

#[async_trait]
impl SessionIntrospector for LocalSessionIntrospector {
    async fn introspect(&self, request: &AuthRequest) -> Result<SessionState, AuthError> {
        let passcode_verified = has_passcode_cookie(request);
        match self.authenticator.authenticate(request).await {
            Ok(identity) => Ok(SessionState {
                authenticated: true,
                user_id: Some(identity.user_id),
                user_email: identity.email,
                passcode_verified,
            }),
            Err(AuthError::NotAuthenticated) | Err(AuthError::InvalidCredentials(_)) => {
                Ok(SessionState {
                    passcode_verified,
                    ..SessionState::anonymous()
                })
            }
            Err(e) => Err(e),
        }
    }
}

/// Asks the session endpoint over HTTP, forwarding the caller's credentials.
pub struct HttpSessionIntrospector {
    client: reqwest::Client,
    url: String,
}

impl HttpSessionIntrospector {
    pub fn new(url: String, timeout: Duration) -> Result<Self, AuthError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AuthError::ConfigurationError(format!("HTTP client: {e}")))?;
        Ok(Self { client, url })
    }
}

#[async_trait]
impl SessionIntrospector for HttpSessionIntrospector {
    async fn introspect(&self, request: &AuthRequest) -> Result<SessionState, AuthError> {
        let mut call = self.client.get(&self.url);
        for name in ["cookie", "authorization", "x-session-token"] {
            if let Some(value) = request.headers.get(name) {
                call = call.header(name, value);
            }
        }

        let response = call
            .send()
            .await
            .map_err(|e| AuthError::SessionUnavailable(format!("session endpoint: {e}")))?;

        if !response.status().is_success() {
            return Err(AuthError::SessionUnavailable(format!(
                "session endpoint returned {}",
                response.status()
            )));
        }

        let state: SessionState = response
            .json()
            .await
            .map_err(|e| AuthError::SessionUnavailable(format!("session payload: {e}")))?;
        debug!(authenticated = state.authenticated, "Session introspected over HTTP");
        Ok(state)
    }
}
