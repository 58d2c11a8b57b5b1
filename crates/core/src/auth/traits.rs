//! The two seams behind the access gates: who is calling, and what the
//! session endpoint knows about them.

use async_trait::async_trait;
use thiserror::Error;

use super::session::SessionState;
use super::types::{AuthRequest, Identity};

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Authentication required")]
    NotAuthenticated,

    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    /// The session endpoint could not answer.
    #[error("Session lookup unavailable: {0}")]
    SessionUnavailable(String),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),
}

/// Resolves the caller of an API request.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self, request: &AuthRequest) -> Result<Identity, AuthError>;

    /// Name of this authentication method, as written in `[auth] method`.
    fn method_name(&self) -> &'static str;
}

#[async_trait]
pub trait SessionIntrospector: Send + Sync {
    /// Resolve the session for an incoming navigation.
    ///
    /// `Err` means the answer is unknown, not that the caller is anonymous.
    async fn introspect(&self, request: &AuthRequest) -> Result<SessionState, AuthError>;
}
