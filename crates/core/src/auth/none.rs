use async_trait::async_trait;

use super::{AuthError, AuthRequest, Authenticator, Identity};

/// Header that picks the acting user in development mode.
pub const DEV_USER_HEADER: &str = "x-dev-user";

/// Development authenticator: every request is signed in.
///
/// Requests act as the anonymous user unless they name one in
/// `X-Dev-User`, which lets local setups exercise per-owner data.
/// Must be explicitly configured.
#[derive(Default)]
pub struct NoneAuthenticator;

impl NoneAuthenticator {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Authenticator for NoneAuthenticator {
    async fn authenticate(&self, request: &AuthRequest) -> Result<Identity, AuthError> {
        let mut identity = Identity::anonymous();
        if let Some(user) = request
            .headers
            .get(DEV_USER_HEADER)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
        {
            identity.user_id = user.to_string();
        }
        Ok(identity)
    }

    fn method_name(&self) -> &'static str {
        "none"
    }
}
