//! Rate limiting, authentication, navigation and metrics middleware.

use axum::{
    body::Body,
    extract::{ConnectInfo, FromRequestParts, State},
    http::{request::Parts, Extensions, HeaderMap, Request},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use std::collections::HashMap;
use std::future::Future;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

use reelforge_core::auth::resolve_client_ip;
use reelforge_core::{AuthError, AuthRequest, Identity, NavigationDecision, NavigationGate, RateLimiter};

use super::error::ApiError;
use crate::metrics::{
    normalize_path, AUTH_FAILURES_TOTAL, HTTP_REQUESTS_IN_FLIGHT, HTTP_REQUESTS_TOTAL,
    HTTP_REQUEST_DURATION, RATE_LIMITED_TOTAL,
};
use crate::state::AppState;

/// Build the credential view of a request used by the gates.
///
/// Header names are lowercased. The client IP is the socket peer, unless the
/// peer is a trusted proxy or unknown, in which case the forwarding headers
/// are used.
pub fn auth_request_from(
    headers: &HeaderMap,
    extensions: &Extensions,
    trusted_proxies: &[IpAddr],
) -> AuthRequest {
    let headers: HashMap<String, String> = headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_lowercase(), v.to_string()))
        })
        .collect();

    let peer = extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());
    let source_ip = resolve_client_ip(&headers, peer, trusted_proxies);

    AuthRequest { headers, source_ip }
}

/// Metrics middleware that tracks HTTP request duration and counts.
///
/// This middleware records:
/// - Request duration (histogram)
/// - Request count (counter)
/// - Requests in flight (gauge)
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();
    let path = normalize_path(request.uri().path());

    HTTP_REQUESTS_IN_FLIGHT.inc();

    let response = next.run(request).await;

    HTTP_REQUESTS_IN_FLIGHT.dec();

    let duration = start.elapsed().as_secs_f64();
    let status = response.status().as_u16().to_string();

    HTTP_REQUEST_DURATION
        .with_label_values(&[&method, &path, &status])
        .observe(duration);
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[&method, &path, &status])
        .inc();

    response
}

/// Per-IP budget for every `/api` request.
///
/// A limiter failure denies the request.
pub async fn rate_limit_middleware(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let client = auth_request_from(
        request.headers(),
        request.extensions(),
        state.trusted_proxies(),
    ).source_ip;

    match state.api_limiter().limit(&client.to_string()).await {
        Ok(decision) if decision.allowed => next.run(request).await,
        Ok(decision) => {
            warn!(
                client_ip = %client,
                path = %request.uri().path(),
                retry_after_secs = decision.retry_after_secs,
                "Rate limit exceeded"
            );
            RATE_LIMITED_TOTAL.with_label_values(&["exceeded"]).inc();
            ApiError::RateLimited(decision).into_response()
        }
        Err(e) => {
            warn!(client_ip = %client, error = %e, "Rate limiter unavailable, denying");
            RATE_LIMITED_TOTAL
                .with_label_values(&["limiter_unavailable"])
                .inc();
            ApiError::ServiceUnavailable("Rate limiter unavailable".to_string()).into_response()
        }
    }
}

/// Authentication middleware that validates requests using the configured authenticator.
///
/// On success the resolved [`Identity`] is stored in the request extensions
/// for [`AuthUser`]. Missing or wrong credentials are a 401.
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let auth_request = auth_request_from(
        request.headers(),
        request.extensions(),
        state.trusted_proxies(),
    );

    match state.authenticator().authenticate(&auth_request).await {
        Ok(identity) => {
            let mut request = request;
            request.extensions_mut().insert(identity);
            Ok(next.run(request).await)
        }
        Err(AuthError::NotAuthenticated) => {
            AUTH_FAILURES_TOTAL.with_label_values(&["not_authenticated"]).inc();
            Err(ApiError::Unauthorized("Authentication required".to_string()))
        }
        Err(AuthError::InvalidCredentials(_)) => {
            AUTH_FAILURES_TOTAL.with_label_values(&["invalid_credentials"]).inc();
            Err(ApiError::Unauthorized("Invalid credentials".to_string()))
        }
        Err(e) => {
            AUTH_FAILURES_TOTAL.with_label_values(&["internal_error"]).inc();
            Err(ApiError::Internal(e.to_string()))
        }
    }
}

/// Redirects page navigations according to the caller's access level.
///
/// API calls and static assets pass straight through. Introspection
/// failures are resolved by the configured fail mode.
pub async fn navigation_middleware(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();
    if !NavigationGate::applies_to(&path) {
        return next.run(request).await;
    }

    let auth_request = auth_request_from(
        request.headers(),
        request.extensions(),
        state.trusted_proxies(),
    );
    let session = match state.session_introspector().introspect(&auth_request).await {
        Ok(session) => Some(session),
        Err(e) => {
            warn!(path = %path, client_ip = %auth_request.source_ip, error = %e, "Session introspection failed");
            None
        }
    };

    match state.navigation_gate().decide(&path, session.as_ref()) {
        NavigationDecision::Allow => next.run(request).await,
        NavigationDecision::Redirect(to) => {
            debug!(from = %path, to = %to, "Redirecting navigation");
            Redirect::temporary(&to).into_response()
        }
    }
}

/// Extractor for authenticated user ID.
///
/// Extracts the user_id from the Identity stored in request extensions.
/// Falls back to "anonymous" if no identity is present (shouldn't happen
/// if auth middleware is properly configured).
#[derive(Debug, Clone)]
pub struct AuthUser(pub String);

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> impl Future<Output = Result<Self, Self::Rejection>> + Send {
        let user_id = parts
            .extensions
            .get::<Identity>()
            .map(|id| id.user_id.clone())
            .unwrap_or_else(|| "anonymous".to_string());
        std::future::ready(Ok(AuthUser(user_id)))
    }
}

impl AuthUser {
    /// Actor string recorded on request events.
    pub fn actor(&self) -> String {
        format!("user:{}", self.0)
    }
}

/// Extractor for the credential view of the current request.
#[derive(Debug, Clone)]
pub struct ClientRequest(pub AuthRequest);

impl FromRequestParts<Arc<AppState>> for ClientRequest {
    type Rejection = std::convert::Infallible;

    fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> impl Future<Output = Result<Self, Self::Rejection>> + Send {
        std::future::ready(Ok(ClientRequest(auth_request_from(
            &parts.headers,
            &parts.extensions,
            state.trusted_proxies(),
        ))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{header, Request, StatusCode},
        middleware,
        routing::get,
        Router,
    };
    use reelforge_core::{load_config_from_str, InProcessDispatcher};
    use tower::ServiceExt;

    async fn dummy_handler() -> &'static str {
        "OK"
    }

    async fn user_handler(AuthUser(user_id): AuthUser) -> String {
        user_id
    }

    fn create_test_state(toml: &str) -> (Arc<AppState>, tempfile::TempDir) {
        let temp_dir = tempfile::tempdir().unwrap();
        let db_path = temp_dir.path().join("test.db");
        let mut config = load_config_from_str(toml).unwrap();
        config.database.path = db_path;

        let state =
            AppState::from_config(config, Arc::new(InProcessDispatcher::new())).unwrap();
        (Arc::new(state), temp_dir)
    }

    fn token_config() -> &'static str {
        r#"
[auth]
method = "token"

[[auth.users]]
user_id = "u-1"
token = "secret-token"
"#
    }

    fn auth_app(state: Arc<AppState>) -> Router {
        Router::new()
            .route("/test", get(user_handler))
            .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
            .with_state(state)
    }

    #[tokio::test]
    async fn test_none_auth_allows_all() {
        let (state, _dir) = create_test_state("[auth]\nmethod = \"none\"\n");
        let app = auth_app(state);

        let request = Request::builder().uri("/test").body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_token_auth_valid() {
        use http_body_util::BodyExt;

        let (state, _dir) = create_test_state(token_config());
        let app = auth_app(state);

        let request = Request::builder()
            .uri("/test")
            .header(header::AUTHORIZATION, "Bearer secret-token")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(String::from_utf8(body.to_vec()).unwrap(), "u-1");
    }

    #[tokio::test]
    async fn test_token_auth_invalid() {
        let (state, _dir) = create_test_state(token_config());
        let app = auth_app(state);

        let request = Request::builder()
            .uri("/test")
            .header(header::AUTHORIZATION, "Bearer wrong-token")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_token_auth_missing() {
        let (state, _dir) = create_test_state(token_config());
        let app = auth_app(state);

        let request = Request::builder().uri("/test").body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_session_cookie_is_accepted() {
        let (state, _dir) = create_test_state(token_config());
        let app = auth_app(state);

        let request = Request::builder()
            .uri("/test")
            .header(header::COOKIE, "session_token=secret-token")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_rate_limit_middleware_denies_over_budget() {
        let (state, _dir) = create_test_state(
            r#"
[auth]
method = "none"

[rate_limit.api]
max_requests = 2
window_secs = 60
"#,
        );
        let app = Router::new()
            .route("/test", get(dummy_handler))
            .layer(middleware::from_fn_with_state(
                state.clone(),
                rate_limit_middleware,
            ))
            .with_state(state);

        let send = |ip: &'static str| {
            let app = app.clone();
            async move {
                let request = Request::builder()
                    .uri("/test")
                    .header("x-forwarded-for", ip)
                    .body(Body::empty())
                    .unwrap();
                app.oneshot(request).await.unwrap()
            }
        };

        assert_eq!(send("10.0.0.1").await.status(), StatusCode::OK);
        assert_eq!(send("10.0.0.1").await.status(), StatusCode::OK);

        let denied = send("10.0.0.1").await;
        assert_eq!(denied.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(denied.headers()["x-ratelimit-limit"], "2");
        assert_eq!(denied.headers()["x-ratelimit-remaining"], "0");
        assert!(denied.headers().contains_key("retry-after"));

        // Budgets are per client
        assert_eq!(send("10.0.0.2").await.status(), StatusCode::OK);
    }

    #[test]
    fn test_auth_request_from_trusts_configured_proxy() {
        let mut headers = HeaderMap::new();
        headers.insert("X-Forwarded-For", "203.0.113.7, 10.0.0.1".parse().unwrap());
        headers.insert("X-Real-IP", "198.51.100.2".parse().unwrap());

        let mut extensions = Extensions::new();
        extensions.insert(ConnectInfo(SocketAddr::from(([10, 0, 0, 1], 4000))));

        let proxy: IpAddr = "10.0.0.1".parse().unwrap();
        let request = auth_request_from(&headers, &extensions, &[proxy]);
        assert_eq!(request.source_ip.to_string(), "203.0.113.7");
        assert!(request.headers.contains_key("x-forwarded-for"));
    }

    #[test]
    fn test_auth_request_from_ignores_spoofed_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("X-Forwarded-For", "203.0.113.7".parse().unwrap());

        let mut extensions = Extensions::new();
        extensions.insert(ConnectInfo(SocketAddr::from(([192, 0, 2, 9], 4000))));

        let request = auth_request_from(&headers, &extensions, &[]);
        assert_eq!(request.source_ip.to_string(), "192.0.2.9");

        let request = auth_request_from(&HeaderMap::new(), &Extensions::new(), &[]);
        assert_eq!(request.source_ip.to_string(), "127.0.0.1");
    }
}
