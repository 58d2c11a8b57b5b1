use std::net::IpAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use reelforge_core::{
    create_authenticator, create_session_introspector, Authenticator, BrandStore, CampaignStore,
    Config, LocalSessionIntrospector, NavigationGate, PasscodeGate, PipelineStore,
    RequestOrchestrator, SanitizedConfig, SessionIntrospector, SlidingWindowLimiter,
    SqliteBrandStore, SqliteCampaignStore, SqlitePipelineStore, TaskDispatcher, UnlockKey,
};

/// Shared application state
pub struct AppState {
    config: Config,
    authenticator: Arc<dyn Authenticator>,
    session_introspector: Arc<dyn SessionIntrospector>,
    local_session: LocalSessionIntrospector,
    api_limiter: Arc<SlidingWindowLimiter>,
    passcode_limiter: Arc<SlidingWindowLimiter>,
    passcode_gate: PasscodeGate,
    navigation_gate: NavigationGate,
    unlock_key: UnlockKey,
    campaign_store: Arc<dyn CampaignStore>,
    brand_store: Arc<dyn BrandStore>,
    pipeline_store: Arc<dyn PipelineStore>,
    orchestrator: RequestOrchestrator,
}

impl AppState {
    /// Build every component from `config`.
    ///
    /// All three stores share the SQLite file at `database.path`. Tasks are
    /// handed to `dispatcher`.
    pub fn from_config(config: Config, dispatcher: Arc<dyn TaskDispatcher>) -> Result<Self> {
        let authenticator =
            create_authenticator(&config.auth).context("Failed to create authenticator")?;
        info!("Using authenticator: {}", authenticator.method_name());

        let session_introspector =
            create_session_introspector(&config.session, Arc::clone(&authenticator))
                .context("Failed to create session introspector")?;

        let api_limiter = Arc::new(
            SlidingWindowLimiter::new("api", config.rate_limit.api).with_prefix("ratelimit:api"),
        );
        let passcode_limiter = Arc::new(
            SlidingWindowLimiter::new("passcode", config.rate_limit.passcode)
                .with_prefix("ratelimit:passcode"),
        );
        let passcode_gate = PasscodeGate::new(
            config.passcode.secret.clone(),
            config.passcode.cookie_secure,
            Arc::clone(&passcode_limiter) as _,
        );
        if !passcode_gate.is_configured() {
            tracing::warn!("No passcode secret configured; passcode submissions will fail");
        }

        let db_path = &config.database.path;
        let campaign_store: Arc<dyn CampaignStore> = Arc::new(
            SqliteCampaignStore::new(db_path).context("Failed to create campaign store")?,
        );
        let brand_store: Arc<dyn BrandStore> =
            Arc::new(SqliteBrandStore::new(db_path).context("Failed to create brand store")?);
        let pipeline_store: Arc<dyn PipelineStore> = Arc::new(
            SqlitePipelineStore::new(db_path).context("Failed to create pipeline store")?,
        );
        info!("Stores initialized at {:?}", db_path);

        let orchestrator = RequestOrchestrator::new(
            config.orchestrator.clone(),
            Arc::clone(&pipeline_store),
            dispatcher,
        );

        Ok(Self {
            navigation_gate: NavigationGate::from_config(&config.session),
            unlock_key: UnlockKey::from_config(&config.unlock),
            local_session: LocalSessionIntrospector::new(Arc::clone(&authenticator)),
            authenticator,
            session_introspector,
            api_limiter,
            passcode_limiter,
            passcode_gate,
            campaign_store,
            brand_store,
            pipeline_store,
            orchestrator,
            config,
        })
    }

    /// Replace the session introspector the navigation gate consults.
    pub fn with_session_introspector(mut self, introspector: Arc<dyn SessionIntrospector>) -> Self {
        self.session_introspector = introspector;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    /// Peers allowed to report the client address in forwarding headers.
    pub fn trusted_proxies(&self) -> &[IpAddr] {
        &self.config.server.trusted_proxies
    }

    pub fn authenticator(&self) -> &dyn Authenticator {
        self.authenticator.as_ref()
    }

    pub fn session_introspector(&self) -> &dyn SessionIntrospector {
        self.session_introspector.as_ref()
    }

    /// Session resolved in process, as served by the session endpoint.
    pub fn local_session(&self) -> &LocalSessionIntrospector {
        &self.local_session
    }

    pub fn api_limiter(&self) -> &SlidingWindowLimiter {
        &self.api_limiter
    }

    pub fn passcode_gate(&self) -> &PasscodeGate {
        &self.passcode_gate
    }

    pub fn navigation_gate(&self) -> &NavigationGate {
        &self.navigation_gate
    }

    pub fn unlock_key(&self) -> &UnlockKey {
        &self.unlock_key
    }

    pub fn campaign_store(&self) -> &dyn CampaignStore {
        self.campaign_store.as_ref()
    }

    pub fn brand_store(&self) -> &dyn BrandStore {
        self.brand_store.as_ref()
    }

    pub fn pipeline_store(&self) -> &dyn PipelineStore {
        self.pipeline_store.as_ref()
    }

    pub fn orchestrator(&self) -> &RequestOrchestrator {
        &self.orchestrator
    }

    /// Drop rate-limit keys whose hits have all expired. Returns keys removed.
    pub async fn purge_rate_limits(&self) -> usize {
        self.api_limiter.purge_expired().await + self.passcode_limiter.purge_expired().await
    }
}
