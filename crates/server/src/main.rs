use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use tokio::signal;
use tracing::{debug, error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

use reelforge_core::{
    config_path_from_env, load_config, validate_config, Config, InProcessDispatcher,
    SanitizedConfig, TaskDispatcher, WebhookDispatcher,
};
use reelforge_server::api::create_router;
use reelforge_server::metrics::REGISTRY;
use reelforge_server::state::AppState;

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// How often expired rate-limit keys are dropped.
const RATE_LIMIT_PURGE_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());

    // REELFORGE_LOG_FORMAT=json switches to one JSON object per line
    let json = std::env::var("REELFORGE_LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    let fmt_layer = if json {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .init();
}

fn create_dispatcher(config: &Config) -> Result<Arc<dyn TaskDispatcher>> {
    if config.orchestrator.mock_mode {
        info!("Mock mode: tasks complete in process");
        return Ok(Arc::new(InProcessDispatcher::new()));
    }
    let dispatcher =
        WebhookDispatcher::new(&config.orchestrator).context("Failed to create webhook dispatcher")?;
    info!(
        "Dispatching tasks to {}",
        config.orchestrator.webhook_base_url
    );
    Ok(Arc::new(dispatcher))
}

async fn run() -> Result<()> {
    init_logging();
    info!("Reelforge {} starting", VERSION);

    let config_path = config_path_from_env();

    // Load configuration
    info!("Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    // Validate configuration
    validate_config(&config).context("Configuration validation failed")?;

    info!("Configuration loaded successfully");
    info!("Auth method: {:?}", config.auth.method);
    info!("Database path: {:?}", config.database.path);

    // Hash of the sanitized config, for telling deployments apart in logs
    let sanitized = serde_json::to_string(&SanitizedConfig::from(&config)).unwrap_or_default();
    let config_hash = format!("{:x}", Sha256::digest(sanitized.as_bytes()));
    info!("Configuration hash: {}", &config_hash[..16]);

    once_cell::sync::Lazy::force(&REGISTRY);

    let dispatcher = create_dispatcher(&config)?;
    let addr = SocketAddr::new(config.server.host, config.server.port);

    let state = Arc::new(AppState::from_config(config, dispatcher)?);

    state.orchestrator().start().await;

    // Periodically drop rate-limit keys with no live hits
    let purge_state = Arc::clone(&state);
    let purge_handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(RATE_LIMIT_PURGE_INTERVAL);
        loop {
            interval.tick().await;
            let purged = purge_state.purge_rate_limits().await;
            if purged > 0 {
                debug!("Purged {} expired rate-limit keys", purged);
            }
        }
    });

    // Create router
    let app = create_router(Arc::clone(&state));

    // Start server
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    // Run server with graceful shutdown
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("Server error")?;

    info!("Server shutting down...");
    purge_handle.abort();

    info!("Stopping orchestrator...");
    state.orchestrator().stop().await;
    info!("Orchestrator stopped");

    info!("Shutdown complete");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
