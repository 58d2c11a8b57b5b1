//! Routing decisions for page navigations based on access level.

use tracing::warn;

use super::{AccessLevel, SessionState};
use crate::config::{FailMode, SessionConfig};
use crate::metrics::NAVIGATION_DECISIONS;

const STATIC_PREFIXES: &[&str] = &["/_next/", "/assets/", "/static/"];
const STATIC_FILES: &[&str] = &["/favicon.ico", "/robots.txt"];
const IMAGE_EXTENSIONS: &[&str] = &["svg", "png", "jpg", "jpeg", "gif", "webp"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationDecision {
    Allow,
    Redirect(String),
}

/// Decides where a page navigation may go.
#[derive(Debug, Clone)]
pub struct NavigationGate {
    login_path: String,
    passcode_path: String,
    dashboard_path: String,
    auth_pages: Vec<String>,
    fail_mode: FailMode,
}

impl NavigationGate {
    pub fn from_config(config: &SessionConfig) -> Self {
        Self {
            login_path: config.login_path.clone(),
            passcode_path: config.passcode_path.clone(),
            dashboard_path: config.dashboard_path.clone(),
            auth_pages: config.auth_pages.clone(),
            fail_mode: config.fail_mode,
        }
    }

    /// API calls and static assets bypass the gate.
    pub fn applies_to(path: &str) -> bool {
        if path == "/api" || path.starts_with("/api/") || path == "/metrics" {
            return false;
        }
        if STATIC_PREFIXES.iter().any(|p| path.starts_with(p)) || STATIC_FILES.contains(&path) {
            return false;
        }
        let is_image = path
            .rsplit_once('.')
            .map(|(_, ext)| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
            .unwrap_or(false);
        !is_image
    }

    pub fn is_auth_page(&self, path: &str) -> bool {
        self.auth_pages.iter().any(|page| {
            path == page
                || path
                    .strip_prefix(page.as_str())
                    .is_some_and(|rest| rest.starts_with('/'))
        })
    }

    /// Route `path` given the caller's session.
    ///
    /// `None` means introspection failed; the configured fail mode applies.
    pub fn decide(&self, path: &str, session: Option<&SessionState>) -> NavigationDecision {
        if !Self::applies_to(path) {
            return NavigationDecision::Allow;
        }

        let Some(session) = session else {
            return match self.fail_mode {
                FailMode::Open => {
                    warn!(path = %path, "Session introspection failed, allowing navigation");
                    NAVIGATION_DECISIONS.with_label_values(&["fail_open"]).inc();
                    NavigationDecision::Allow
                }
                FailMode::Closed => {
                    warn!(path = %path, "Session introspection failed, redirecting to login");
                    NAVIGATION_DECISIONS.with_label_values(&["fail_closed"]).inc();
                    NavigationDecision::Redirect(self.login_path.clone())
                }
            };
        };

        let level = session.access_level();
        let decision = if path == "/" {
            NavigationDecision::Redirect(self.home_for(level).to_string())
        } else if self.is_auth_page(path) {
            if level == AccessLevel::FullyVerified {
                NavigationDecision::Redirect(self.dashboard_path.clone())
            } else {
                NavigationDecision::Allow
            }
        } else {
            match level {
                AccessLevel::Anonymous => NavigationDecision::Redirect(self.login_path.clone()),
                AccessLevel::AuthenticatedUnverified => {
                    NavigationDecision::Redirect(self.passcode_path.clone())
                }
                AccessLevel::FullyVerified => NavigationDecision::Allow,
            }
        };

        let label = match decision {
            NavigationDecision::Allow => "allow",
            NavigationDecision::Redirect(_) => "redirect",
        };
        NAVIGATION_DECISIONS.with_label_values(&[label]).inc();
        decision
    }

    fn home_for(&self, level: AccessLevel) -> &str {
        match level {
            AccessLevel::Anonymous => &self.login_path,
            AccessLevel::AuthenticatedUnverified => &self.passcode_path,
            AccessLevel::FullyVerified => &self.dashboard_path,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate(fail_mode: FailMode) -> NavigationGate {
        NavigationGate::from_config(&SessionConfig {
            fail_mode,
            ..SessionConfig::default()
        })
    }

    fn state(authenticated: bool, passcode_verified: bool) -> SessionState {
        SessionState {
            authenticated,
            user_id: authenticated.then(|| "u-1".to_string()),
            user_email: None,
            passcode_verified,
        }
    }

    fn redirect(path: &str) -> NavigationDecision {
        NavigationDecision::Redirect(path.to_string())
    }

    #[test]
    fn test_root_routes_by_access_level() {
        let gate = gate(FailMode::Open);
        assert_eq!(gate.decide("/", Some(&state(false, false))), redirect("/login"));
        assert_eq!(gate.decide("/", Some(&state(true, false))), redirect("/verify-passcode"));
        assert_eq!(gate.decide("/", Some(&state(true, true))), redirect("/dashboard"));
    }

    #[test]
    fn test_protected_page_requires_login() {
        let gate = gate(FailMode::Open);
        assert_eq!(
            gate.decide("/dashboard/campaigns", Some(&state(false, false))),
            redirect("/login")
        );
        // A passcode cookie alone does not count as a session.
        assert_eq!(gate.decide("/dashboard", Some(&state(false, true))), redirect("/login"));
    }

    #[test]
    fn test_protected_page_requires_passcode() {
        let gate = gate(FailMode::Open);
        assert_eq!(
            gate.decide("/dashboard", Some(&state(true, false))),
            redirect("/verify-passcode")
        );
    }

    #[test]
    fn test_fully_verified_reaches_protected_page() {
        let gate = gate(FailMode::Open);
        assert_eq!(
            gate.decide("/dashboard/requests/abc", Some(&state(true, true))),
            NavigationDecision::Allow
        );
    }

    #[test]
    fn test_auth_pages() {
        let gate = gate(FailMode::Open);
        assert_eq!(gate.decide("/login", Some(&state(false, false))), NavigationDecision::Allow);
        assert_eq!(gate.decide("/signup", Some(&state(false, false))), NavigationDecision::Allow);
        assert_eq!(
            gate.decide("/verify-passcode", Some(&state(true, false))),
            NavigationDecision::Allow
        );
        assert_eq!(gate.decide("/login", Some(&state(true, true))), redirect("/dashboard"));
        assert_eq!(
            gate.decide("/verify-passcode", Some(&state(true, true))),
            redirect("/dashboard")
        );
    }

    #[test]
    fn test_auth_page_prefix_is_segment_aware() {
        let gate = gate(FailMode::Open);
        assert!(gate.is_auth_page("/login"));
        assert!(gate.is_auth_page("/login/callback"));
        assert!(!gate.is_auth_page("/login-history"));
    }

    #[test]
    fn test_api_and_static_bypass() {
        assert!(!NavigationGate::applies_to("/api/v1/campaigns"));
        assert!(!NavigationGate::applies_to("/api"));
        assert!(!NavigationGate::applies_to("/_next/static/chunk.js"));
        assert!(!NavigationGate::applies_to("/favicon.ico"));
        assert!(!NavigationGate::applies_to("/logo.PNG"));
        assert!(NavigationGate::applies_to("/dashboard"));
        assert!(NavigationGate::applies_to("/"));

        let gate = gate(FailMode::Closed);
        assert_eq!(gate.decide("/api/v1/campaigns", None), NavigationDecision::Allow);
    }

    #[test]
    fn test_fail_open() {
        let gate = gate(FailMode::Open);
        assert_eq!(gate.decide("/dashboard", None), NavigationDecision::Allow);
    }

    #[test]
    fn test_fail_closed() {
        let gate = gate(FailMode::Closed);
        assert_eq!(gate.decide("/dashboard", None), redirect("/login"));
    }
}
