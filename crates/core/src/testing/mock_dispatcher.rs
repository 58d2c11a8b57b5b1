//! Mock task dispatcher for testing.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;

use crate::orchestrator::{
    is_async_role, DispatchError, DispatchOutcome, DispatchRequest, TaskDispatcher,
};
use crate::pipeline::AgentRole;

/// A recorded dispatch for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedDispatch {
    pub request: DispatchRequest,
    pub timestamp: chrono::DateTime<Utc>,
}

#[derive(Debug, Default)]
struct MockState {
    calls: Vec<RecordedDispatch>,
    /// One-shot outcomes, consumed before the per-role default.
    queued: HashMap<AgentRole, VecDeque<DispatchOutcome>>,
    defaults: HashMap<AgentRole, DispatchOutcome>,
    transport_errors: HashSet<AgentRole>,
    complete_async_roles: bool,
}

/// Mock implementation of the TaskDispatcher trait.
///
/// By default it behaves like the workflow service: synchronous roles
/// complete at once, the producer is accepted and reports via callback.
///
/// # Example
///
/// ```rust,ignore
/// let dispatcher = MockDispatcher::new();
/// dispatcher.queue_outcome(AgentRole::Strategist, DispatchOutcome::Failed {
///     code: "LLM_ERROR".into(),
///     message: "overloaded".into(),
/// });
///
/// orchestrator.process_request(&id).await?;
/// assert_eq!(dispatcher.roles_called()[0], AgentRole::Executive);
/// ```
#[derive(Debug, Default)]
pub struct MockDispatcher {
    state: Mutex<MockState>,
}

impl MockDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Complete every role synchronously, the producer included.
    pub fn completing_everything() -> Self {
        let dispatcher = Self::new();
        dispatcher.lock().complete_async_roles = true;
        dispatcher
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Use `outcome` for every dispatch of `role`.
    pub fn set_outcome(&self, role: AgentRole, outcome: DispatchOutcome) {
        self.lock().defaults.insert(role, outcome);
    }

    /// Use `outcome` for the next dispatch of `role` only.
    pub fn queue_outcome(&self, role: AgentRole, outcome: DispatchOutcome) {
        self.lock().queued.entry(role).or_default().push_back(outcome);
    }

    /// Make dispatches of `role` fail at the transport level.
    pub fn set_transport_error(&self, role: AgentRole) {
        self.lock().transport_errors.insert(role);
    }

    pub fn calls(&self) -> Vec<RecordedDispatch> {
        self.lock().calls.clone()
    }

    pub fn calls_for(&self, role: AgentRole) -> Vec<DispatchRequest> {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.request.agent_role == role)
            .map(|c| c.request.clone())
            .collect()
    }

    /// Roles dispatched, in order.
    pub fn roles_called(&self) -> Vec<AgentRole> {
        self.lock()
            .calls
            .iter()
            .map(|c| c.request.agent_role)
            .collect()
    }

    pub fn clear_recorded(&self) {
        self.lock().calls.clear();
    }

    fn default_outcome(state: &MockState, request: &DispatchRequest) -> DispatchOutcome {
        if let Some(outcome) = state.defaults.get(&request.agent_role) {
            return outcome.clone();
        }
        if is_async_role(request.agent_role) && !state.complete_async_roles {
            return DispatchOutcome::Accepted {
                external_job_id: Some(format!("mock-exec-{}", state.calls.len())),
            };
        }
        let mut output = json!({ "role": request.agent_role, "mock": true });
        if request.agent_role == AgentRole::Producer {
            output["output_url"] = json!(format!("mock://assets/{}.mp4", request.request_id));
        }
        DispatchOutcome::Completed { output }
    }
}

#[async_trait]
impl TaskDispatcher for MockDispatcher {
    async fn dispatch(&self, request: &DispatchRequest) -> Result<DispatchOutcome, DispatchError> {
        let mut state = self.lock();
        state.calls.push(RecordedDispatch {
            request: request.clone(),
            timestamp: Utc::now(),
        });

        if state.transport_errors.contains(&request.agent_role) {
            return Err(DispatchError::Connection("mock transport failure".to_string()));
        }

        if let Some(outcome) = state
            .queued
            .get_mut(&request.agent_role)
            .and_then(VecDeque::pop_front)
        {
            return Ok(outcome);
        }

        Ok(Self::default_outcome(&state, request))
    }
}
