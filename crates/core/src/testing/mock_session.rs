//! Mock session introspector for testing.

use async_trait::async_trait;
use std::sync::Mutex;

use crate::auth::{AuthError, AuthRequest, SessionIntrospector, SessionState};

/// Returns a fixed session, or fails on demand.
#[derive(Debug, Default)]
pub struct MockSessionIntrospector {
    state: Mutex<Option<SessionState>>,
    calls: Mutex<usize>,
}

impl MockSessionIntrospector {
    /// Starts out failing, as an unreachable session endpoint would.
    pub fn failing() -> Self {
        Self::default()
    }

    pub fn with_state(state: SessionState) -> Self {
        Self {
            state: Mutex::new(Some(state)),
            calls: Mutex::new(0),
        }
    }

    pub fn anonymous() -> Self {
        Self::with_state(SessionState::anonymous())
    }

    /// A signed-in user, with or without the passcode cookie.
    pub fn signed_in(user_id: &str, passcode_verified: bool) -> Self {
        Self::with_state(SessionState {
            authenticated: true,
            user_id: Some(user_id.to_string()),
            user_email: Some(format!("{user_id}@example.com")),
            passcode_verified,
        })
    }

    pub fn set_state(&self, state: Option<SessionState>) {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = state;
    }

    pub fn call_count(&self) -> usize {
        *self.calls.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl SessionIntrospector for MockSessionIntrospector {
    async fn introspect(&self, _request: &AuthRequest) -> Result<SessionState, AuthError> {
        *self.calls.lock().unwrap_or_else(|e| e.into_inner()) += 1;
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .ok_or_else(|| AuthError::SessionUnavailable("mock session endpoint down".to_string()))
    }
}
