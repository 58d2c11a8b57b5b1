pub mod auth;
pub mod brand;
pub mod campaign;
pub mod config;
pub mod metrics;
pub mod orchestrator;
pub mod pipeline;
pub mod ratelimit;
pub mod testing;
pub mod unlock;
pub mod validation;

pub use auth::{
    constant_time_eq, create_authenticator, create_session_introspector, AccessLevel, AuthError,
    AuthRequest, Authenticator, HttpSessionIntrospector, Identity, LocalSessionIntrospector,
    NavigationDecision, NavigationGate, NoneAuthenticator, PasscodeError, PasscodeGate,
    PasscodeGrant, SessionIntrospector, SessionState, TokenAuthenticator, PASSCODE_COOKIE,
};
pub use brand::{
    Brand, BrandError, BrandStore, CreateBrandInput, CreateKnowledgeBaseInput, KnowledgeBase,
    SqliteBrandStore,
};
pub use campaign::{
    campaign_progress, BudgetTier, Campaign, CampaignError, CampaignFilter, CampaignPatch,
    CampaignProgress, CampaignStatus, CampaignStore, CreateCampaignInput, DashboardStats,
    SqliteCampaignStore,
};
pub use config::{
    config_path_from_env, load_config, load_config_from_str, validate_config, AuthMethod, Config,
    ConfigError, FailMode, IntrospectionMode, SanitizedConfig,
};
pub use orchestrator::{
    CallbackAck, CallbackPayload, DispatchError, DispatchOutcome, InProcessDispatcher,
    OrchestratorConfig, OrchestratorError, OrchestratorStatus, ProcessOutcome,
    RequestOrchestrator, TaskDispatcher, WebhookDispatcher,
};
pub use pipeline::{
    ContentRequest, CreateRequestInput, PipelineError, PipelineStore, RequestFilter,
    RequestStatus, RequestTask, RequestType, SqlitePipelineStore, TaskStatus,
    UpdateRequestInput,
};
pub use ratelimit::{
    RateLimitDecision, RateLimitError, RateLimitPolicy, RateLimiter, SlidingWindowLimiter,
};
pub use unlock::UnlockKey;
pub use validation::FieldError;
