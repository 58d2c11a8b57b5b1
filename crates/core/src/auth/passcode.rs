//! Shared-secret passcode gate in front of the dashboard.

use std::net::IpAddr;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

use super::constant_time_eq;
use crate::metrics::PASSCODE_ATTEMPTS;
use crate::ratelimit::{RateLimitDecision, RateLimiter};

/// Cookie set once the passcode has been accepted.
pub const PASSCODE_COOKIE: &str = "dashboard_passcode_verified";

/// Lifetime of the passcode cookie: seven days.
pub const PASSCODE_COOKIE_MAX_AGE_SECS: u64 = 7 * 24 * 60 * 60;

#[derive(Debug, Error)]
pub enum PasscodeError {
    #[error("Too many attempts. Please try again later.")]
    RateLimited(RateLimitDecision),

    #[error("Server configuration error")]
    NotConfigured,

    #[error("Invalid passcode")]
    Invalid,

    #[error("Rate limiter unavailable: {0}")]
    LimiterUnavailable(String),
}

/// Proof that the passcode was accepted, carrying the cookie to issue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasscodeGrant {
    pub cookie_secure: bool,
}

impl PasscodeGrant {
    /// `Set-Cookie` header value for the verification cookie.
    pub fn cookie_header(&self) -> String {
        let mut cookie = format!(
            "{PASSCODE_COOKIE}=true; Path=/; Max-Age={PASSCODE_COOKIE_MAX_AGE_SECS}; HttpOnly; SameSite=Lax"
        );
        if self.cookie_secure {
            cookie.push_str("; Secure");
        }
        cookie
    }
}

/// Verifies passcode submissions under a per-client attempt budget.
pub struct PasscodeGate {
    secret: Option<String>,
    cookie_secure: bool,
    limiter: Arc<dyn RateLimiter>,
}

impl PasscodeGate {
    pub fn new(secret: Option<String>, cookie_secure: bool, limiter: Arc<dyn RateLimiter>) -> Self {
        Self {
            secret: secret.filter(|s| !s.is_empty()),
            cookie_secure,
            limiter,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.secret.is_some()
    }

    /// Check one submission from `client_ip`.
    ///
    /// The attempt is charged before anything else, so a missing secret
    /// or a correct passcode still costs budget.
    pub async fn verify(
        &self,
        client_ip: IpAddr,
        submitted: &str,
    ) -> Result<PasscodeGrant, PasscodeError> {
        let key = format!("passcode:{client_ip}");
        let decision = match self.limiter.limit(&key).await {
            Ok(decision) => decision,
            Err(e) => {
                error!(client_ip = %client_ip, error = %e, "Passcode limiter unavailable, denying");
                PASSCODE_ATTEMPTS.with_label_values(&["rate_limited"]).inc();
                return Err(PasscodeError::LimiterUnavailable(e.to_string()));
            }
        };

        if !decision.allowed {
            warn!(
                client_ip = %client_ip,
                retry_after_secs = decision.retry_after_secs,
                "Passcode attempts exhausted"
            );
            PASSCODE_ATTEMPTS.with_label_values(&["rate_limited"]).inc();
            return Err(PasscodeError::RateLimited(decision));
        }

        let Some(secret) = self.secret.as_deref() else {
            error!("Passcode submitted but no passcode secret is configured");
            PASSCODE_ATTEMPTS.with_label_values(&["not_configured"]).inc();
            return Err(PasscodeError::NotConfigured);
        };

        if !constant_time_eq(submitted.as_bytes(), secret.as_bytes()) {
            warn!(
                client_ip = %client_ip,
                remaining = decision.remaining,
                "Invalid passcode attempt"
            );
            PASSCODE_ATTEMPTS.with_label_values(&["invalid"]).inc();
            return Err(PasscodeError::Invalid);
        }

        info!(client_ip = %client_ip, "Passcode accepted");
        PASSCODE_ATTEMPTS.with_label_values(&["granted"]).inc();
        Ok(PasscodeGrant {
            cookie_secure: self.cookie_secure,
        })
    }
}
