//! Static session-token authentication.

use async_trait::async_trait;
use std::collections::HashMap;

use super::{constant_time_eq, AuthError, AuthRequest, Authenticator, Identity};
use crate::config::UserCredential;

/// Name of the cookie carrying the session token.
pub const SESSION_COOKIE: &str = "session_token";

/// Authenticator that matches a session token against configured users.
///
/// Accepts the token in either:
/// - `Authorization: Bearer <token>` header
/// - `X-Session-Token: <token>` header
/// - `session_token` cookie
pub struct TokenAuthenticator {
    users: Vec<UserCredential>,
}

impl TokenAuthenticator {
    pub fn new(users: Vec<UserCredential>) -> Self {
        Self { users }
    }

    fn extract_token<'a>(&self, request: &'a AuthRequest) -> Option<&'a str> {
        if let Some(header) = request.headers.get("authorization") {
            let token = header
                .strip_prefix("Bearer ")
                .or_else(|| header.strip_prefix("bearer "));
            if let Some(token) = token {
                return Some(token.trim());
            }
        }

        if let Some(token) = request.headers.get("x-session-token") {
            return Some(token.trim());
        }

        request.cookie(SESSION_COOKIE)
    }

    /// Compare against every user so timing does not reveal which one matched.
    fn find_user(&self, token: &str) -> Option<&UserCredential> {
        let mut found = None;
        for user in &self.users {
            if constant_time_eq(token.as_bytes(), user.token.as_bytes()) && found.is_none() {
                found = Some(user);
            }
        }
        found
    }
}

#[async_trait]
impl Authenticator for TokenAuthenticator {
    async fn authenticate(&self, request: &AuthRequest) -> Result<Identity, AuthError> {
        let token = self
            .extract_token(request)
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::NotAuthenticated)?;

        let user = self
            .find_user(token)
            .ok_or_else(|| AuthError::InvalidCredentials("Invalid session token".to_string()))?;

        let mut claims = HashMap::new();
        if let Some(email) = &user.email {
            claims.insert("email".to_string(), serde_json::json!(email));
        }

        Ok(Identity {
            user_id: user.user_id.clone(),
            method: "token".to_string(),
            email: user.email.clone(),
            claims,
        })
    }

    fn method_name(&self) -> &'static str {
        "token"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn users() -> Vec<UserCredential> {
        vec![
            UserCredential {
                user_id: "u-ana".to_string(),
                email: Some("ana@example.com".to_string()),
                token: "tok-ana".to_string(),
            },
            UserCredential {
                user_id: "u-bo".to_string(),
                email: None,
                token: "tok-bo".to_string(),
            },
        ]
    }

    fn request(headers: &[(&str, &str)]) -> AuthRequest {
        AuthRequest {
            headers: headers
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            source_ip: "127.0.0.1".parse().unwrap(),
        }
    }

    #[tokio::test]
    async fn test_bearer_token() {
        let auth = TokenAuthenticator::new(users());
        let identity = auth
            .authenticate(&request(&[("authorization", "Bearer tok-ana")]))
            .await
            .unwrap();
        assert_eq!(identity.user_id, "u-ana");
        assert_eq!(identity.method, "token");
        assert_eq!(identity.email.as_deref(), Some("ana@example.com"));
        assert_eq!(identity.claims.get("email"), Some(&serde_json::json!("ana@example.com")));
    }

    #[tokio::test]
    async fn test_session_token_header() {
        let auth = TokenAuthenticator::new(users());
        let identity = auth
            .authenticate(&request(&[("x-session-token", "tok-bo")]))
            .await
            .unwrap();
        assert_eq!(identity.user_id, "u-bo");
        assert!(identity.email.is_none());
    }

    #[tokio::test]
    async fn test_session_cookie() {
        let auth = TokenAuthenticator::new(users());
        let identity = auth
            .authenticate(&request(&[("cookie", "theme=dark; session_token=tok-bo")]))
            .await
            .unwrap();
        assert_eq!(identity.user_id, "u-bo");
    }

    #[tokio::test]
    async fn test_missing_token() {
        let auth = TokenAuthenticator::new(users());
        let result = auth.authenticate(&request(&[])).await;
        assert!(matches!(result, Err(AuthError::NotAuthenticated)));
    }

    #[tokio::test]
    async fn test_unknown_token() {
        let auth = TokenAuthenticator::new(users());
        let result = auth
            .authenticate(&request(&[("authorization", "Bearer tok-nobody")]))
            .await;
        assert!(matches!(result, Err(AuthError::InvalidCredentials(_))));
    }

    #[tokio::test]
    async fn test_token_prefix_is_not_enough() {
        let auth = TokenAuthenticator::new(users());
        let result = auth
            .authenticate(&request(&[("x-session-token", "tok-an")]))
            .await;
        assert!(matches!(result, Err(AuthError::InvalidCredentials(_))));
    }
}
