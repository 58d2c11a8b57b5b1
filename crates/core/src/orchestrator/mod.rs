//! Request orchestrator for automated pipeline processing.
//!
//! The orchestrator drives content requests through their pipeline:
//! - **Dispatch**: runnable tasks go to a [`TaskDispatcher`], either the
//!   workflow-automation webhooks or an in-process stand-in
//! - **Callbacks**: asynchronous results are folded back in
//! - **Sweep**: tasks stuck in progress past their timeout are failed

mod breaker;
mod config;
mod dispatcher;
mod runner;
mod types;
mod webhook;

pub use breaker::{CircuitBreaker, CircuitSnapshot, CircuitState};
pub use config::OrchestratorConfig;
pub use dispatcher::{
    dispatch_input, is_async_role, workflow_for, DispatchError, DispatchOutcome, DispatchRequest,
    InProcessDispatcher, TaskDispatcher,
};
pub use runner::{RequestOrchestrator, ORCHESTRATOR_ACTOR};
pub use types::{
    CallbackAck, CallbackError, CallbackPayload, CallbackStatus, OrchestratorError,
    OrchestratorStatus, ProcessOutcome,
};
pub use webhook::WebhookDispatcher;
