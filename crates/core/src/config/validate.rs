use super::{types::Config, AuthMethod, ConfigError, IntrospectionMode};

/// Validate configuration
/// Currently validates:
/// - Auth section exists (enforced by serde)
/// - Server port is not 0
/// - Token auth has at least one user, with unique non-empty tokens
/// - Rate limit policies have a non-zero budget and window
/// - HTTP session introspection has a URL
/// - Orchestrator iteration bound is positive and URLs are http(s)
/// - Dispatch makes at least one attempt and the breaker ratio is in (0, 1]
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    if config.auth.method == AuthMethod::Token {
        if config.auth.users.is_empty() {
            return Err(ConfigError::ValidationError(
                "auth.users must not be empty when using token auth".to_string(),
            ));
        }
        let mut seen = std::collections::HashSet::new();
        for user in &config.auth.users {
            if user.token.is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "auth.users[{}].token cannot be empty",
                    user.user_id
                )));
            }
            if !seen.insert(user.token.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "auth.users[{}].token is shared with another user",
                    user.user_id
                )));
            }
        }
    }

    for (name, policy) in [
        ("rate_limit.api", &config.rate_limit.api),
        ("rate_limit.passcode", &config.rate_limit.passcode),
    ] {
        if policy.max_requests == 0 || policy.window_secs == 0 {
            return Err(ConfigError::ValidationError(format!(
                "{name} needs max_requests > 0 and window_secs > 0"
            )));
        }
    }

    if config.session.introspection == IntrospectionMode::Http
        && config.session.url.as_deref().map_or(true, str::is_empty)
    {
        return Err(ConfigError::ValidationError(
            "session.url must be set when introspection = \"http\"".to_string(),
        ));
    }

    if config.orchestrator.max_iterations == 0 {
        return Err(ConfigError::ValidationError(
            "orchestrator.max_iterations cannot be 0".to_string(),
        ));
    }

    if config.orchestrator.dispatch_max_attempts == 0 {
        return Err(ConfigError::ValidationError(
            "orchestrator.dispatch_max_attempts cannot be 0".to_string(),
        ));
    }

    let ratio = config.orchestrator.breaker_failure_ratio;
    if !(ratio > 0.0 && ratio <= 1.0) {
        return Err(ConfigError::ValidationError(format!(
            "orchestrator.breaker_failure_ratio must be in (0, 1], got {ratio}"
        )));
    }

    for (name, url) in [
        ("orchestrator.webhook_base_url", &config.orchestrator.webhook_base_url),
        ("orchestrator.callback_base_url", &config.orchestrator.callback_base_url),
    ] {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ConfigError::ValidationError(format!(
                "{name} must be an http(s) URL, got {url:?}"
            )));
        }
    }

    Ok(())
}
