use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{
    services::{ServeDir, ServeFile},
    trace::TraceLayer,
};

use super::middleware::{
    auth_middleware, metrics_middleware, navigation_middleware, rate_limit_middleware,
};
use super::{access, brands, callbacks, campaigns, handlers, requests};
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    let dashboard_dir = state.config().server.dashboard_dir.clone();

    // Reachable without credentials
    let public_v1 = Router::new()
        .route("/health", get(handlers::health))
        .route("/config", get(handlers::get_config))
        .route("/callbacks/n8n", post(callbacks::n8n_callback));

    let protected_v1 = Router::new()
        .route("/orchestrator/status", get(handlers::orchestrator_status))
        .route("/unlock", post(access::unlock))
        // Campaigns
        .route(
            "/campaigns",
            get(campaigns::list_campaigns).post(campaigns::create_campaign),
        )
        .route(
            "/campaigns/{id}",
            get(campaigns::get_campaign)
                .put(campaigns::update_campaign)
                .delete(campaigns::delete_campaign),
        )
        .route("/campaigns/{id}/restore", post(campaigns::restore_campaign))
        .route("/campaigns/{id}/progress", get(campaigns::get_campaign_progress))
        .route("/dashboard/stats", get(campaigns::dashboard_stats))
        // Brands and knowledge bases
        .route("/brands", get(brands::list_brands).post(brands::create_brand))
        .route("/brands/{id}", get(brands::get_brand))
        .route(
            "/knowledge-bases",
            get(brands::list_knowledge_bases).post(brands::create_knowledge_base),
        )
        .route("/knowledge-bases/{id}", get(brands::get_knowledge_base))
        // Content requests
        .route(
            "/requests",
            get(requests::list_requests).post(requests::create_request),
        )
        .route("/requests/estimate", post(requests::estimate_cost))
        .route(
            "/requests/{id}",
            get(requests::get_request)
                .patch(requests::update_request)
                .delete(requests::delete_request),
        )
        .route("/requests/{id}/progress", get(requests::get_request_progress))
        .route("/requests/{id}/events", get(requests::list_request_events))
        .route("/requests/{id}/retry", post(requests::retry_request))
        .route("/requests/{id}/cancel", post(requests::cancel_request))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    // Every /api call spends the per-IP budget
    let api_routes = Router::new()
        .nest("/v1", public_v1.merge(protected_v1))
        .route("/verify-passcode", post(access::verify_passcode))
        .route("/auth/session", get(access::get_session))
        .fallback(handlers::api_not_found)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ));

    // Serve dashboard with SPA fallback
    let index_path = dashboard_dir.join("index.html");
    let serve_dir = ServeDir::new(&dashboard_dir).fallback(ServeFile::new(index_path));

    Router::new()
        .nest("/api", api_routes)
        .route("/metrics", get(handlers::metrics))
        .fallback_service(serve_dir)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            navigation_middleware,
        ))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
