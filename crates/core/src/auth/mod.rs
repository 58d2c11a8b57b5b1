mod navigation;
mod none;
mod passcode;
mod session;
mod token;
mod traits;
mod types;

pub use navigation::*;
pub use none::*;
pub use passcode::*;
pub use session::*;
pub use token::*;
pub use traits::*;
pub use types::*;

use std::sync::Arc;
use std::time::Duration;

use crate::config::{AuthConfig, IntrospectionMode, SessionConfig};

/// Factory function to create authenticator from config
pub fn create_authenticator(config: &AuthConfig) -> Result<Arc<dyn Authenticator>, AuthError> {
    use crate::config::AuthMethod;

    match config.method {
        AuthMethod::None => Ok(Arc::new(NoneAuthenticator::new())),
        AuthMethod::Token => {
            if config.users.is_empty() {
                return Err(AuthError::ConfigurationError(
                    "auth.users must be set when using token auth".to_string(),
                ));
            }
            Ok(Arc::new(TokenAuthenticator::new(config.users.clone())))
        }
    }
}

/// Build the introspector the navigation gate consults.
pub fn create_session_introspector(
    config: &SessionConfig,
    authenticator: Arc<dyn Authenticator>,
) -> Result<Arc<dyn SessionIntrospector>, AuthError> {
    match config.introspection {
        IntrospectionMode::Local => Ok(Arc::new(LocalSessionIntrospector::new(authenticator))),
        IntrospectionMode::Http => {
            let url = config.url.clone().filter(|u| !u.is_empty()).ok_or_else(|| {
                AuthError::ConfigurationError(
                    "session.url must be set for http introspection".to_string(),
                )
            })?;
            Ok(Arc::new(HttpSessionIntrospector::new(
                url,
                Duration::from_millis(config.timeout_ms),
            )?))
        }
    }
}

/// Constant-time byte comparison. Length differences still return early.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AuthMethod, UserCredential};

    #[test]
    fn test_create_authenticator_none() {
        let config = AuthConfig {
            method: AuthMethod::None,
            users: vec![],
        };
        let auth = create_authenticator(&config).unwrap();
        assert_eq!(auth.method_name(), "none");
    }

    #[test]
    fn test_create_authenticator_token() {
        let config = AuthConfig {
            method: AuthMethod::Token,
            users: vec![UserCredential {
                user_id: "u".to_string(),
                email: None,
                token: "t".to_string(),
            }],
        };
        let auth = create_authenticator(&config).unwrap();
        assert_eq!(auth.method_name(), "token");
    }

    #[test]
    fn test_create_authenticator_token_without_users() {
        let config = AuthConfig {
            method: AuthMethod::Token,
            users: vec![],
        };
        let result = create_authenticator(&config);
        assert!(matches!(result, Err(AuthError::ConfigurationError(_))));
    }

    #[test]
    fn test_create_http_introspector_needs_url() {
        let config = SessionConfig {
            introspection: IntrospectionMode::Http,
            ..SessionConfig::default()
        };
        let result = create_session_introspector(&config, Arc::new(NoneAuthenticator::new()));
        assert!(matches!(result, Err(AuthError::ConfigurationError(_))));
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"secret", b"secret"));
        assert!(!constant_time_eq(b"secret", b"secreT"));
        assert!(!constant_time_eq(b"secret", b"secret!"));
        assert!(constant_time_eq(b"", b""));
    }
}
