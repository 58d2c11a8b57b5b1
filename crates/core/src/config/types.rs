use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;

use crate::orchestrator::OrchestratorConfig;
use crate::ratelimit::RateLimitPolicy;

/// Root configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub auth: AuthConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub passcode: PasscodeConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub unlock: UnlockConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Directory holding the built dashboard SPA.
    #[serde(default = "default_dashboard_dir")]
    pub dashboard_dir: PathBuf,
    /// Peers whose `X-Forwarded-For` / `X-Real-IP` headers are believed.
    #[serde(default)]
    pub trusted_proxies: Vec<IpAddr>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            dashboard_dir: default_dashboard_dir(),
            trusted_proxies: Vec::new(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::V4(std::net::Ipv4Addr::UNSPECIFIED)
}

fn default_port() -> u16 {
    8080
}

fn default_dashboard_dir() -> PathBuf {
    PathBuf::from("dashboard/dist")
}

/// Authentication configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthConfig {
    pub method: AuthMethod,
    /// Users accepted by the `token` method.
    #[serde(default)]
    pub users: Vec<UserCredential>,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    None,
    Token,
}

/// A user that may sign in with a static session token.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UserCredential {
    pub user_id: String,
    #[serde(default)]
    pub email: Option<String>,
    pub token: String,
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("reelforge.db")
}

/// Passcode gate configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PasscodeConfig {
    /// Shared secret. Absent means every submission is a server configuration error.
    #[serde(default)]
    pub secret: Option<String>,
    /// Mark the verification cookie `Secure`.
    #[serde(default)]
    pub cookie_secure: bool,
}

/// Rate limit budgets
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitConfig {
    /// Budget for every `/api/*` request, keyed by client IP.
    #[serde(default = "default_api_policy")]
    pub api: RateLimitPolicy,
    /// Budget for passcode attempts, keyed by `passcode:<ip>`.
    #[serde(default = "default_passcode_policy")]
    pub passcode: RateLimitPolicy,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            api: default_api_policy(),
            passcode: default_passcode_policy(),
        }
    }
}

fn default_api_policy() -> RateLimitPolicy {
    RateLimitPolicy::new(10, 10)
}

fn default_passcode_policy() -> RateLimitPolicy {
    RateLimitPolicy::new(5, 15 * 60)
}

/// Where the navigation gate obtains session state from.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum IntrospectionMode {
    /// Resolve the session in process.
    #[default]
    Local,
    /// Call the session endpoint over HTTP.
    Http,
}

/// What the navigation gate does when session introspection fails.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum FailMode {
    /// Let the navigation through; API handlers still enforce auth.
    #[default]
    Open,
    /// Redirect to the login page.
    Closed,
}

/// Session gate configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SessionConfig {
    #[serde(default)]
    pub introspection: IntrospectionMode,
    /// Session endpoint used when `introspection = "http"`.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_introspection_timeout")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub fail_mode: FailMode,
    #[serde(default = "default_login_path")]
    pub login_path: String,
    #[serde(default = "default_passcode_path")]
    pub passcode_path: String,
    #[serde(default = "default_dashboard_path")]
    pub dashboard_path: String,
    /// Path prefixes reachable without a full session.
    #[serde(default = "default_auth_pages")]
    pub auth_pages: Vec<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            introspection: IntrospectionMode::default(),
            url: None,
            timeout_ms: default_introspection_timeout(),
            fail_mode: FailMode::default(),
            login_path: default_login_path(),
            passcode_path: default_passcode_path(),
            dashboard_path: default_dashboard_path(),
            auth_pages: default_auth_pages(),
        }
    }
}

fn default_introspection_timeout() -> u64 {
    2000
}

fn default_login_path() -> String {
    "/login".to_string()
}

fn default_passcode_path() -> String {
    "/verify-passcode".to_string()
}

fn default_dashboard_path() -> String {
    "/dashboard".to_string()
}

fn default_auth_pages() -> Vec<String> {
    vec![
        "/login".to_string(),
        "/signup".to_string(),
        "/verify-passcode".to_string(),
    ]
}

/// Master unlock key configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct UnlockConfig {
    #[serde(default)]
    pub master_key: Option<String>,
}

/// Sanitized config for API responses (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub auth: SanitizedAuthConfig,
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub passcode: SanitizedPasscodeConfig,
    pub rate_limit: RateLimitConfig,
    pub session: SessionConfig,
    pub orchestrator: SanitizedOrchestratorConfig,
    pub unlock: SanitizedUnlockConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedAuthConfig {
    pub method: String,
    pub user_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedPasscodeConfig {
    pub secret_configured: bool,
    pub cookie_secure: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedOrchestratorConfig {
    #[serde(flatten)]
    pub settings: OrchestratorConfig,
    pub webhook_api_key_configured: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedUnlockConfig {
    pub master_key_configured: bool,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            auth: SanitizedAuthConfig {
                method: match config.auth.method {
                    AuthMethod::None => "none".to_string(),
                    AuthMethod::Token => "token".to_string(),
                },
                user_count: config.auth.users.len(),
            },
            server: config.server.clone(),
            database: config.database.clone(),
            passcode: SanitizedPasscodeConfig {
                secret_configured: config
                    .passcode
                    .secret
                    .as_deref()
                    .is_some_and(|s| !s.is_empty()),
                cookie_secure: config.passcode.cookie_secure,
            },
            rate_limit: config.rate_limit.clone(),
            session: config.session.clone(),
            orchestrator: SanitizedOrchestratorConfig {
                settings: config.orchestrator.clone(),
                webhook_api_key_configured: config
                    .orchestrator
                    .webhook_api_key
                    .as_deref()
                    .is_some_and(|k| !k.is_empty()),
            },
            unlock: SanitizedUnlockConfig {
                master_key_configured: config
                    .unlock
                    .master_key
                    .as_deref()
                    .is_some_and(|k| !k.is_empty()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_minimal_config() {
        let toml = r#"
[auth]
method = "none"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.auth.method, AuthMethod::None);
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host.to_string(), "0.0.0.0");
        assert_eq!(config.database.path.to_str().unwrap(), "reelforge.db");
        assert!(config.passcode.secret.is_none());
        assert_eq!(config.rate_limit.api.max_requests, 10);
        assert_eq!(config.rate_limit.api.window_secs, 10);
        assert_eq!(config.rate_limit.passcode.max_requests, 5);
        assert_eq!(config.session.fail_mode, FailMode::Open);
        assert_eq!(config.session.login_path, "/login");
    }

    #[test]
    fn test_deserialize_missing_auth_fails() {
        let toml = r#"
[server]
port = 8080
"#;
        let result: Result<Config, _> = toml::from_str(toml);
        assert!(result.is_err());
    }

    #[test]
    fn test_deserialize_token_auth_with_users() {
        let toml = r#"
[auth]
method = "token"

[[auth.users]]
user_id = "u-1"
email = "ana@example.com"
token = "tok-1"

[[auth.users]]
user_id = "u-2"
token = "tok-2"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.auth.method, AuthMethod::Token);
        assert_eq!(config.auth.users.len(), 2);
        assert_eq!(config.auth.users[0].email.as_deref(), Some("ana@example.com"));
        assert!(config.auth.users[1].email.is_none());
    }

    #[test]
    fn test_deserialize_session_fail_closed() {
        let toml = r#"
[auth]
method = "none"

[session]
introspection = "http"
url = "http://127.0.0.1:8080/api/auth/session"
fail_mode = "closed"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.session.introspection, IntrospectionMode::Http);
        assert_eq!(config.session.fail_mode, FailMode::Closed);
        assert_eq!(config.session.timeout_ms, 2000);
        assert_eq!(config.session.auth_pages.len(), 3);
    }

    #[test]
    fn test_sanitized_config_hides_secrets() {
        let toml = r#"
[auth]
method = "token"

[[auth.users]]
user_id = "u-1"
token = "very-secret-token"

[passcode]
secret = "open-sesame"

[orchestrator]
webhook_api_key = "n8n-api-key"

[unlock]
master_key = "master"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        let sanitized = SanitizedConfig::from(&config);
        assert!(sanitized.orchestrator.webhook_api_key_configured);
        assert_eq!(sanitized.auth.method, "token");
        assert_eq!(sanitized.auth.user_count, 1);
        assert!(sanitized.passcode.secret_configured);
        assert!(sanitized.unlock.master_key_configured);

        let json = serde_json::to_string(&sanitized).unwrap();
        assert!(!json.contains("open-sesame"));
        assert!(!json.contains("very-secret-token"));
        assert!(!json.contains("\"master\""));
        assert!(!json.contains("n8n-api-key"));

        let value = serde_json::to_value(&sanitized).unwrap();
        assert_eq!(value["orchestrator"]["webhook_api_key_configured"], true);
        assert_eq!(value["orchestrator"]["max_task_retries"], 3);
    }

    #[test]
    fn test_sanitized_config_empty_secret_is_not_configured() {
        let toml = r#"
[auth]
method = "none"

[passcode]
secret = ""
"#;
        let config: Config = toml::from_str(toml).unwrap();
        let sanitized = SanitizedConfig::from(&config);
        assert!(!sanitized.passcode.secret_configured);
        assert!(!sanitized.unlock.master_key_configured);
        assert!(!sanitized.orchestrator.webhook_api_key_configured);
    }
}
