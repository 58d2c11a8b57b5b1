//! Request orchestrator implementation.
//!
//! Drives content requests through the pipeline:
//! - Intake: expands the request type's template into tasks
//! - Draft/Production/QA: dispatches the next runnable task and advances the
//!   status once the gating tasks are done
//! - Callbacks: folds asynchronous results back in
//! - Sweep: fails tasks that stayed in progress past their timeout

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde_json::{json, Value};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::metrics::{
    CALLBACKS_RECEIVED, DISPATCH_DURATION, INVALID_TRANSITIONS, REQUESTS_CREATED,
    STATUS_TRANSITIONS, TASKS_DISPATCHED, TASK_RETRIES,
};
use crate::pipeline::{
    status_machine, task_factory, AgentRole, ContentRequest, EventType, NewContentRequest,
    NewRequestEvent, PipelineError, PipelineStore, RequestFilter, RequestStatus, RequestTask,
    TaskStatus,
};

use super::config::OrchestratorConfig;
use super::dispatcher::{dispatch_input, workflow_for, DispatchOutcome, DispatchRequest, TaskDispatcher};
use super::types::{
    CallbackAck, CallbackPayload, CallbackStatus, OrchestratorError, OrchestratorStatus,
    ProcessOutcome,
};

/// Actor recorded on events the orchestrator writes itself.
pub const ORCHESTRATOR_ACTOR: &str = "system:orchestrator";

const DRAFT_ROLES: [AgentRole; 3] = [
    AgentRole::Strategist,
    AgentRole::Copywriter,
    AgentRole::TaskPlanner,
];

/// Requests re-driven per status on startup.
const RECOVERY_BATCH: i64 = 100;
const RECOVERY_CONCURRENCY: usize = 4;

/// Attempts at cancelling a request the orchestrator is moving concurrently.
const CANCEL_ATTEMPTS: u32 = 3;

type ProcessingSet = Arc<Mutex<HashSet<String>>>;

/// Marks a request as being processed until dropped.
struct ProcessingGuard {
    set: ProcessingSet,
    request_id: String,
}

impl ProcessingGuard {
    fn acquire(set: &ProcessingSet, request_id: &str) -> Option<Self> {
        let mut held = set.lock().unwrap_or_else(|e| e.into_inner());
        if !held.insert(request_id.to_string()) {
            return None;
        }
        Some(Self {
            set: Arc::clone(set),
            request_id: request_id.to_string(),
        })
    }
}

impl Drop for ProcessingGuard {
    fn drop(&mut self) {
        let mut held = self.set.lock().unwrap_or_else(|e| e.into_inner());
        held.remove(&self.request_id);
    }
}

/// The request orchestrator - drives content requests through the pipeline.
#[derive(Clone)]
pub struct RequestOrchestrator {
    config: OrchestratorConfig,
    store: Arc<dyn PipelineStore>,
    dispatcher: Arc<dyn TaskDispatcher>,

    // Runtime state
    processing: ProcessingSet,
    running: Arc<AtomicBool>,
    timeouts_swept: Arc<AtomicU64>,
    shutdown_tx: broadcast::Sender<()>,
}

impl RequestOrchestrator {
    /// Create a new orchestrator.
    pub fn new(
        config: OrchestratorConfig,
        store: Arc<dyn PipelineStore>,
        dispatcher: Arc<dyn TaskDispatcher>,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config,
            store,
            dispatcher,
            processing: Arc::new(Mutex::new(HashSet::new())),
            running: Arc::new(AtomicBool::new(false)),
            timeouts_swept: Arc::new(AtomicU64::new(0)),
            shutdown_tx,
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Start the background timeout sweep.
    pub async fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Orchestrator already running");
            return;
        }

        info!("Starting request orchestrator");

        // Pick up requests a previous run left mid-pipeline
        let this = self.clone();
        tokio::spawn(async move {
            this.recover_in_flight().await;
        });

        if self.config.timeout_sweep_secs > 0 {
            self.spawn_timeout_sweep_loop();
        }

        info!("Request orchestrator started");
    }

    /// Stop the orchestrator gracefully.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            warn!("Orchestrator not running");
            return;
        }

        info!("Stopping request orchestrator");
        let _ = self.shutdown_tx.send(());
        info!("Request orchestrator stopped");
    }

    /// Get current orchestrator status.
    pub async fn status(&self) -> OrchestratorStatus {
        let processing = self
            .processing
            .lock()
            .map(|held| held.len())
            .unwrap_or(0);

        OrchestratorStatus {
            running: self.running.load(Ordering::Relaxed),
            mock_mode: self.config.mock_mode,
            processing,
            timeouts_swept: self.timeouts_swept.load(Ordering::Relaxed),
            circuit: self.dispatcher.circuit(),
        }
    }

    /// Re-drive every non-terminal request that is not waiting on a human.
    /// Returns how many were visited.
    pub async fn recover_in_flight(&self) -> usize {
        let mut ids = Vec::new();
        for status in [
            RequestStatus::Intake,
            RequestStatus::Draft,
            RequestStatus::Production,
            RequestStatus::Qa,
        ] {
            let filter = RequestFilter::default()
                .with_status(status)
                .with_limit(RECOVERY_BATCH);
            match self.store.list_requests(&filter) {
                Ok(requests) => ids.extend(requests.into_iter().map(|r| r.id)),
                Err(e) => error!("Failed to list {} requests for recovery: {}", status, e),
            }
        }

        let count = ids.len();
        stream::iter(ids)
            .for_each_concurrent(RECOVERY_CONCURRENCY, |id| async move {
                if let Err(e) = self.process_request(&id).await {
                    warn!("Recovery of request {} failed: {}", id, e);
                }
            })
            .await;

        if count > 0 {
            info!("Recovered {} in-flight requests", count);
        }
        count
    }

    fn spawn_timeout_sweep_loop(&self) {
        let this = self.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let interval = Duration::from_secs(self.config.timeout_sweep_secs);

        tokio::spawn(async move {
            info!("Timeout sweep loop started");
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("Timeout sweep loop received shutdown signal");
                        break;
                    }
                    _ = tokio::time::sleep(interval) => {
                        if !this.running.load(Ordering::Relaxed) {
                            break;
                        }
                        if let Err(e) = this.sweep_timeouts(Utc::now()) {
                            warn!("Timeout sweep error: {}", e);
                        }
                    }
                }
            }
            info!("Timeout sweep loop stopped");
        });
    }

    /// Run `process_request` in the background.
    pub fn spawn_process(&self, request_id: String) {
        let this = self.clone();
        tokio::spawn(async move {
            match this.process_request(&request_id).await {
                Ok(outcome) => debug!("Request {} processed: {:?}", request_id, outcome),
                Err(e) => warn!("Processing request {} failed: {}", request_id, e),
            }
        });
    }

    /// Persist a new request, or return the existing one for a repeated
    /// idempotency key. The flag is true when a row was created.
    pub fn submit_request(
        &self,
        new: NewContentRequest,
    ) -> Result<(ContentRequest, bool), OrchestratorError> {
        let owner_id = new.owner_id.clone();
        let key = new.idempotency_key.clone();

        if let Some(key) = &key {
            if let Some(existing) = self.store.find_by_idempotency_key(&owner_id, key)? {
                if self.replays(&existing) {
                    debug!("Idempotent replay of request {}", existing.id);
                    return Ok((existing, false));
                }
                debug!("Idempotency key of request {} expired", existing.id);
                self.store.clear_idempotency_key(&existing.id)?;
            }
        }

        let request = match self.store.create_request(new) {
            Ok(request) => request,
            Err(e) => {
                // A concurrent submit with the same key may have won the insert.
                if let Some(key) = &key {
                    if let Some(existing) = self.store.find_by_idempotency_key(&owner_id, key)? {
                        return Ok((existing, false));
                    }
                }
                return Err(e.into());
            }
        };

        REQUESTS_CREATED
            .with_label_values(&[request.request_type.as_str()])
            .inc();
        self.store.append_event(
            NewRequestEvent::new(&request.id, EventType::Created, "Request created")
                .metadata(json!({
                    "request_type": request.request_type,
                    "estimated_cost": request.estimated_cost,
                    "estimated_time_seconds": request.estimated_time_seconds,
                }))
                .actor(owner_id),
        )?;
        info!(
            "Created {} request {} for brand {}",
            request.request_type, request.id, request.brand_id
        );

        Ok((request, true))
    }

    /// A repeated key only returns the earlier request inside the window.
    fn replays(&self, existing: &ContentRequest) -> bool {
        let window = chrono::Duration::seconds(self.config.idempotency_window_secs as i64);
        Utc::now() - existing.created_at < window
    }

    /// Drive a request as far as it can go without outside input.
    ///
    /// Returns `AlreadyRunning` when another call holds the request.
    pub async fn process_request(
        &self,
        request_id: &str,
    ) -> Result<ProcessOutcome, OrchestratorError> {
        let Some(_guard) = ProcessingGuard::acquire(&self.processing, request_id) else {
            debug!("Request {} is already being processed", request_id);
            return Ok(ProcessOutcome::AlreadyRunning);
        };

        match self.drive(request_id).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                error!("Error processing request {}: {}", request_id, e);
                if !matches!(e, OrchestratorError::RequestNotFound(_)) {
                    let event = NewRequestEvent::new(
                        request_id,
                        EventType::SystemError,
                        format!("Orchestrator error: {e}"),
                    )
                    .metadata(json!({ "code": "ORCHESTRATOR_ERROR" }))
                    .actor(ORCHESTRATOR_ACTOR);
                    if let Err(log_err) = self.store.append_event(event) {
                        warn!("Failed to record orchestrator error: {}", log_err);
                    }
                }
                Err(e)
            }
        }
    }

    async fn drive(&self, request_id: &str) -> Result<ProcessOutcome, OrchestratorError> {
        let mut status = self.load(request_id)?.status;

        for iteration in 0..self.config.max_iterations {
            let request = self.load(request_id)?;
            if request.status.is_terminal() {
                return Ok(ProcessOutcome::Terminal {
                    status: request.status,
                });
            }

            let before = request.status;
            debug!(
                "Processing request {} in {} (iteration {})",
                request_id, before, iteration
            );

            let handled = match before {
                RequestStatus::Intake => self.handle_intake(&request).await,
                RequestStatus::Draft => self.handle_draft(&request).await,
                RequestStatus::Production => self.handle_production(&request).await,
                RequestStatus::Qa => self.handle_qa(&request).await,
                // Waits for a human decision.
                RequestStatus::Approval => Ok(false),
                RequestStatus::Published | RequestStatus::Cancelled => Ok(false),
            };
            let acted = match handled {
                Ok(acted) => acted,
                Err(e) if e.is_conflict() => {
                    debug!("Request {} changed while processing: {}", request_id, e);
                    true
                }
                Err(e) => return Err(e),
            };

            let mut current = self.load(request_id)?;
            if current.status == before {
                match self.check_and_advance(&current, !acted) {
                    Ok(false) => {}
                    Ok(true) => current = self.load(request_id)?,
                    Err(e) if e.is_conflict() => current = self.load(request_id)?,
                    Err(e) => return Err(e),
                }
            }
            status = current.status;

            if status.is_terminal() {
                return Ok(ProcessOutcome::Terminal { status });
            }

            let tasks = self.store.list_tasks(request_id)?;
            if tasks.iter().any(|t| t.status == TaskStatus::InProgress) {
                return Ok(ProcessOutcome::AwaitingCallback { status });
            }

            if !acted && status == before {
                return Ok(ProcessOutcome::Idle { status });
            }
        }

        warn!(
            "Request {} hit the iteration limit ({}) in {}",
            request_id, self.config.max_iterations, status
        );
        Ok(ProcessOutcome::IterationLimit { status })
    }

    fn load(&self, request_id: &str) -> Result<ContentRequest, OrchestratorError> {
        self.store
            .get_request_unscoped(request_id)?
            .ok_or_else(|| OrchestratorError::RequestNotFound(request_id.to_string()))
    }

    fn log_event(&self, event: NewRequestEvent) -> Result<(), OrchestratorError> {
        self.store.append_event(event)?;
        Ok(())
    }

    async fn handle_intake(&self, request: &ContentRequest) -> Result<bool, OrchestratorError> {
        let mut tasks = self.store.list_tasks(&request.id)?;
        let mut acted = false;

        if tasks.is_empty() {
            tasks = task_factory::build_tasks(request, self.config.max_task_retries);
            self.store.insert_tasks(&tasks)?;

            let roles: Vec<&str> = tasks.iter().map(|t| t.agent_role.as_str()).collect();
            self.log_event(
                NewRequestEvent::new(
                    &request.id,
                    EventType::Created,
                    format!("Created {} tasks", tasks.len()),
                )
                .metadata(json!({ "task_count": tasks.len(), "roles": roles }))
                .actor(ORCHESTRATOR_ACTOR),
            )?;
            info!("Created {} tasks for request {}", tasks.len(), request.id);
            acted = true;
        }

        if !tasks.iter().any(|t| t.status == TaskStatus::InProgress) {
            acted |= self.start_next(request, &tasks).await?;
        }
        Ok(acted)
    }

    async fn handle_draft(&self, request: &ContentRequest) -> Result<bool, OrchestratorError> {
        let tasks = self.store.list_tasks(&request.id)?;
        let draft: Vec<&RequestTask> = tasks
            .iter()
            .filter(|t| DRAFT_ROLES.contains(&t.agent_role))
            .collect();

        if !draft.is_empty() && draft.iter().all(|t| t.status.is_done()) {
            self.apply_transition(request, RequestStatus::Production, ORCHESTRATOR_ACTOR)?;
            return Ok(true);
        }

        if tasks.iter().any(|t| t.status == TaskStatus::InProgress) {
            return Ok(false);
        }
        self.start_next(request, &tasks).await
    }

    async fn handle_production(&self, request: &ContentRequest) -> Result<bool, OrchestratorError> {
        let tasks = self.store.list_tasks(&request.id)?;
        let producer = tasks
            .iter()
            .find(|t| t.agent_role == AgentRole::Producer)
            .ok_or_else(|| {
                OrchestratorError::InvalidState(format!(
                    "Producer task not found for request {}",
                    request.id
                ))
            })?;

        match producer.status {
            TaskStatus::InProgress => Ok(false),
            TaskStatus::Completed => {
                self.apply_transition(request, RequestStatus::Qa, ORCHESTRATOR_ACTOR)?;
                Ok(true)
            }
            TaskStatus::Pending => self.start_next(request, &tasks).await,
            TaskStatus::Failed | TaskStatus::Skipped => Ok(false),
        }
    }

    async fn handle_qa(&self, request: &ContentRequest) -> Result<bool, OrchestratorError> {
        let tasks = self.store.list_tasks(&request.id)?;
        let qa_status = tasks
            .iter()
            .find(|t| t.agent_role == AgentRole::Qa)
            .map(|t| t.status);

        match qa_status {
            None | Some(TaskStatus::Completed) | Some(TaskStatus::Skipped) => {
                self.apply_transition(request, RequestStatus::Published, ORCHESTRATOR_ACTOR)?;
                Ok(true)
            }
            Some(TaskStatus::InProgress) | Some(TaskStatus::Failed) => Ok(false),
            Some(TaskStatus::Pending) => self.start_next(request, &tasks).await,
        }
    }

    /// Advance to the next forward status when its gates are clear.
    ///
    /// A blocked advance is only written to the event log when `log_blocked`
    /// is set and nothing is in flight.
    fn check_and_advance(
        &self,
        request: &ContentRequest,
        log_blocked: bool,
    ) -> Result<bool, OrchestratorError> {
        if !status_machine::should_auto_advance(request.status) {
            return Ok(false);
        }

        let tasks = self.store.list_tasks(&request.id)?;
        let check = status_machine::can_advance(request.request_type, request.status, &tasks);

        match (check.can_advance, check.next_status) {
            (true, Some(next)) => {
                self.apply_transition(request, next, ORCHESTRATOR_ACTOR)?;
                Ok(true)
            }
            _ => {
                let reason = check.reason.unwrap_or_default();
                debug!("Auto-advance blocked for {}: {}", request.id, reason);
                if log_blocked && !tasks.iter().any(|t| t.status == TaskStatus::InProgress) {
                    self.log_event(
                        NewRequestEvent::new(
                            &request.id,
                            EventType::SystemAction,
                            format!("Auto-advance blocked: {reason}"),
                        )
                        .actor(ORCHESTRATOR_ACTOR),
                    )?;
                }
                Ok(false)
            }
        }
    }

    /// Move a request to `to`, validating against the status machine.
    pub fn transition(
        &self,
        request_id: &str,
        to: RequestStatus,
        actor: &str,
    ) -> Result<ContentRequest, OrchestratorError> {
        let request = self.load(request_id)?;
        self.apply_transition(&request, to, actor)
    }

    fn apply_transition(
        &self,
        request: &ContentRequest,
        to: RequestStatus,
        actor: &str,
    ) -> Result<ContentRequest, OrchestratorError> {
        let from = request.status;
        let tasks = self.store.list_tasks(&request.id)?;

        if let Err(e) = status_machine::validate_transition(request.request_type, from, to, &tasks) {
            INVALID_TRANSITIONS
                .with_label_values(&[from.as_str(), to.as_str()])
                .inc();
            warn!("Rejected transition for request {}: {}", request.id, e);
            self.log_event(
                NewRequestEvent::new(
                    &request.id,
                    EventType::SystemAction,
                    format!("Invalid transition attempted: {from} → {to}"),
                )
                .metadata(json!({ "from": from, "to": to, "reason": e.to_string() }))
                .actor(ORCHESTRATOR_ACTOR),
            )?;
            return Err(e.into());
        }

        let updated = self.store.update_status(&request.id, from, to)?;
        STATUS_TRANSITIONS
            .with_label_values(&[from.as_str(), to.as_str()])
            .inc();
        self.log_event(
            NewRequestEvent::new(
                &request.id,
                EventType::StatusChange,
                format!("Status changed from {from} to {to}"),
            )
            .metadata(json!({ "from": from, "to": to }))
            .actor(actor),
        )?;
        info!("Request {} moved {} → {}", request.id, from, to);

        Ok(updated)
    }

    async fn start_next(
        &self,
        request: &ContentRequest,
        tasks: &[RequestTask],
    ) -> Result<bool, OrchestratorError> {
        let Some(task) = task_factory::next_runnable(tasks).cloned() else {
            return Ok(false);
        };
        self.start_task(request, task, tasks).await
    }

    /// Save `task` if its stored status is still `expected`.
    ///
    /// Returns false when the task moved on in the meantime.
    fn save_if(&self, task: &RequestTask, expected: TaskStatus) -> Result<bool, OrchestratorError> {
        match self.store.save_task(task, expected) {
            Ok(()) => Ok(true),
            Err(PipelineError::Conflict { .. }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Returns false when the task was claimed elsewhere before it started.
    async fn start_task(
        &self,
        request: &ContentRequest,
        mut task: RequestTask,
        tasks: &[RequestTask],
    ) -> Result<bool, OrchestratorError> {
        let role = task.agent_role;
        let expected = task.status;

        task.status = TaskStatus::InProgress;
        task.started_at = Some(Utc::now());
        task.completed_at = None;
        task.error_message = None;
        task.error_code = None;
        if !self.save_if(&task, expected)? {
            debug!("Task {} left {} before it could start", task.id, expected);
            return Ok(false);
        }
        self.log_event(
            NewRequestEvent::new(
                &request.id,
                EventType::TaskStarted,
                format!("Started {}", task.task_name),
            )
            .task(&task.id)
            .metadata(json!({ "agent_role": role, "attempt": task.retry_count + 1 }))
            .actor(ORCHESTRATOR_ACTOR),
        )?;

        let dispatch = DispatchRequest::new(
            &task,
            dispatch_input(request, &task, tasks),
            self.config.callback_url(),
        );

        let timer = DISPATCH_DURATION
            .with_label_values(&[role.as_str()])
            .start_timer();
        let result = self.dispatcher.dispatch(&dispatch).await;
        timer.observe_duration();

        match result {
            Ok(DispatchOutcome::Completed { output }) => {
                TASKS_DISPATCHED
                    .with_label_values(&[role.as_str(), "completed"])
                    .inc();
                self.complete_task(task, output)?;
            }
            Ok(DispatchOutcome::Accepted { external_job_id }) => {
                TASKS_DISPATCHED
                    .with_label_values(&[role.as_str(), "accepted"])
                    .inc();
                let still_running = self
                    .store
                    .get_task(&task.id)?
                    .is_some_and(|t| t.status == TaskStatus::InProgress);
                if !still_running {
                    debug!("Task {} left in_progress during dispatch", task.id);
                    return Ok(true);
                }
                self.log_event(
                    NewRequestEvent::new(
                        &request.id,
                        EventType::ProviderDispatched,
                        format!("Dispatched {} to {}", task.task_name, dispatch.workflow),
                    )
                    .task(&task.id)
                    .metadata(json!({
                        "workflow": dispatch.workflow,
                        "external_job_id": external_job_id,
                    }))
                    .actor(ORCHESTRATOR_ACTOR),
                )?;
                debug!("Task {} accepted by {}", task.id, dispatch.workflow);
            }
            Ok(DispatchOutcome::Failed { code, message }) => {
                TASKS_DISPATCHED
                    .with_label_values(&[role.as_str(), "failed"])
                    .inc();
                self.fail_task(task, &code, &message)?;
            }
            Err(e) => {
                TASKS_DISPATCHED
                    .with_label_values(&[role.as_str(), "failed"])
                    .inc();
                self.fail_task(task, e.code(), &e.to_string())?;
            }
        }

        Ok(true)
    }

    /// Record a result for an in-progress task.
    ///
    /// Returns `None` and writes nothing when the task is no longer in
    /// progress, for example because its request was cancelled meanwhile.
    fn complete_task(
        &self,
        mut task: RequestTask,
        output: Value,
    ) -> Result<Option<RequestTask>, OrchestratorError> {
        task.status = TaskStatus::Completed;
        task.output_url = output
            .get("output_url")
            .and_then(Value::as_str)
            .map(str::to_string);
        task.output_data = Some(output);
        task.completed_at = Some(Utc::now());
        if !self.save_if(&task, TaskStatus::InProgress)? {
            debug!("Dropping result of task {}: no longer in progress", task.id);
            return Ok(None);
        }

        if task.agent_role == AgentRole::Producer {
            if let Some(url) = &task.output_url {
                self.store.record_output(&task.request_id, url)?;
            }
        }

        self.log_event(
            NewRequestEvent::new(
                &task.request_id,
                EventType::TaskCompleted,
                format!("Completed {}", task.task_name),
            )
            .task(&task.id)
            .metadata(json!({ "agent_role": task.agent_role, "output_url": task.output_url }))
            .actor(ORCHESTRATOR_ACTOR),
        )?;
        info!("Task {} ({}) completed", task.id, task.agent_role);
        Ok(Some(task))
    }

    /// Record a failure for an in-progress task. See [`Self::complete_task`].
    fn fail_task(
        &self,
        mut task: RequestTask,
        code: &str,
        message: &str,
    ) -> Result<Option<RequestTask>, OrchestratorError> {
        task.status = TaskStatus::Failed;
        task.error_code = Some(code.to_string());
        task.error_message = Some(message.to_string());
        task.completed_at = Some(Utc::now());
        if !self.save_if(&task, TaskStatus::InProgress)? {
            debug!("Dropping failure of task {}: no longer in progress", task.id);
            return Ok(None);
        }

        self.log_event(
            NewRequestEvent::new(
                &task.request_id,
                EventType::TaskFailed,
                format!("{} failed: {}", task.task_name, message),
            )
            .task(&task.id)
            .metadata(json!({
                "code": code,
                "retry_count": task.retry_count,
                "max_retries": task.max_retries,
            }))
            .actor(ORCHESTRATOR_ACTOR),
        )?;
        warn!("Task {} ({}) failed: {} {}", task.id, task.agent_role, code, message);
        Ok(Some(task))
    }

    /// Cancel a request and skip its open tasks.
    pub fn cancel_request(
        &self,
        request_id: &str,
        reason: Option<&str>,
        actor: &str,
    ) -> Result<ContentRequest, OrchestratorError> {
        let mut attempt = 1;
        let cancelled = loop {
            let request = self.load(request_id)?;
            if request.status.is_terminal() {
                return Err(OrchestratorError::InvalidState(format!(
                    "Cannot cancel request in terminal status: {}",
                    request.status
                )));
            }

            match self.apply_transition(&request, RequestStatus::Cancelled, actor) {
                Err(e) if e.is_conflict() && attempt < CANCEL_ATTEMPTS => {
                    debug!("Request {} moved while cancelling, reloading", request_id);
                    attempt += 1;
                }
                result => break result?,
            }
        };
        let skipped = self.store.skip_open_tasks(request_id)?;

        let reason = reason.unwrap_or("Cancelled by user");
        self.log_event(
            NewRequestEvent::new(
                request_id,
                EventType::UserAction,
                format!("Request cancelled: {reason}"),
            )
            .metadata(json!({ "skipped_tasks": skipped }))
            .actor(actor),
        )?;
        info!("Request {} cancelled ({} tasks skipped)", request_id, skipped);

        Ok(cancelled)
    }

    /// Reset the failed tasks of a request so processing can resume.
    ///
    /// Tasks at their retry cap are left alone unless `lift_cap` is set. The
    /// caller resumes processing.
    pub fn retry_request(
        &self,
        request_id: &str,
        actor: &str,
        lift_cap: bool,
    ) -> Result<Vec<RequestTask>, OrchestratorError> {
        let request = self.load(request_id)?;
        if request.status == RequestStatus::Cancelled {
            return Err(OrchestratorError::InvalidState(
                "Cannot retry a cancelled request".to_string(),
            ));
        }

        let failed: Vec<RequestTask> = self
            .store
            .list_tasks(request_id)?
            .into_iter()
            .filter(|t| t.status == TaskStatus::Failed)
            .collect();

        let Some(first) = failed.first() else {
            return Err(OrchestratorError::InvalidState(
                "No failed tasks to retry".to_string(),
            ));
        };
        let first_exhausted = OrchestratorError::RetriesExhausted {
            task_id: first.id.clone(),
            max_retries: first.max_retries,
        };

        let eligible: Vec<RequestTask> = failed
            .into_iter()
            .filter(|t| lift_cap || t.retry_count < t.max_retries)
            .collect();
        if eligible.is_empty() {
            return Err(first_exhausted);
        }

        eligible
            .into_iter()
            .map(|task| self.reset_for_retry(task, actor))
            .collect()
    }

    /// Reset one failed task for another attempt. The caller resumes processing.
    pub fn retry_task(&self, task_id: &str, actor: &str) -> Result<RequestTask, OrchestratorError> {
        let task = self
            .store
            .get_task(task_id)?
            .ok_or_else(|| OrchestratorError::TaskNotFound(task_id.to_string()))?;

        if task.status != TaskStatus::Failed {
            return Err(OrchestratorError::InvalidState(format!(
                "Task {} is not in failed state (current: {})",
                task.id, task.status
            )));
        }
        if task.retry_count + 1 > task.max_retries {
            return Err(OrchestratorError::RetriesExhausted {
                task_id: task.id,
                max_retries: task.max_retries,
            });
        }
        if self.load(&task.request_id)?.status == RequestStatus::Cancelled {
            return Err(OrchestratorError::InvalidState(
                "Cannot retry a task of a cancelled request".to_string(),
            ));
        }

        self.reset_for_retry(task, actor)
    }

    fn reset_for_retry(
        &self,
        mut task: RequestTask,
        actor: &str,
    ) -> Result<RequestTask, OrchestratorError> {
        let attempt = task.retry_count + 1;
        let previous_error = task.error_message.take();

        task.status = TaskStatus::Pending;
        task.retry_count = attempt;
        task.error_code = None;
        task.started_at = None;
        task.completed_at = None;
        if !self.save_if(&task, TaskStatus::Failed)? {
            return Err(OrchestratorError::InvalidState(format!(
                "Task {} is no longer in failed state",
                task.id
            )));
        }

        self.log_event(
            NewRequestEvent::new(
                &task.request_id,
                EventType::RetryInitiated,
                format!("Retrying {} (attempt {})", task.task_name, attempt),
            )
            .task(&task.id)
            .metadata(json!({
                "attempt": attempt,
                "max_retries": task.max_retries,
                "previous_error": previous_error,
            }))
            .actor(actor),
        )?;

        TASK_RETRIES
            .with_label_values(&[task.agent_role.as_str()])
            .inc();
        info!("Task {} reset for retry (attempt {})", task.id, attempt);
        Ok(task)
    }

    /// Apply a result reported by the workflow service.
    ///
    /// Results for tasks that are no longer in progress are acknowledged and
    /// dropped. The caller resumes processing.
    pub fn handle_callback(&self, payload: &CallbackPayload) -> Result<CallbackAck, OrchestratorError> {
        let task = self
            .store
            .get_task(&payload.task_id)?
            .ok_or_else(|| OrchestratorError::TaskNotFound(payload.task_id.clone()))?;

        if task.request_id != payload.request_id {
            return Err(OrchestratorError::CallbackMismatch {
                request_id: payload.request_id.clone(),
                task_id: payload.task_id.clone(),
            });
        }

        if task.status != TaskStatus::InProgress {
            CALLBACKS_RECEIVED.with_label_values(&["ignored"]).inc();
            debug!(
                "Ignoring callback for task {} in status {}",
                task.id, task.status
            );
            return Ok(CallbackAck {
                applied: false,
                task_status: task.status,
            });
        }

        let provider_meta = json!({
            "execution_id": payload.execution_id,
            "workflow_id": payload.workflow_id,
            "workflow": workflow_for(task.agent_role),
        });

        let task_id = task.id.clone();
        let task = match payload.status {
            CallbackStatus::Success => {
                let output = payload.result.clone().unwrap_or_else(|| json!({}));
                let Some(task) = self.complete_task(task, output)? else {
                    return self.ignored_callback(&task_id);
                };
                CALLBACKS_RECEIVED.with_label_values(&["success"]).inc();
                self.log_event(
                    NewRequestEvent::new(
                        &task.request_id,
                        EventType::ProviderCompleted,
                        format!("Workflow finished {}", task.task_name),
                    )
                    .task(&task.id)
                    .metadata(provider_meta)
                    .actor(ORCHESTRATOR_ACTOR),
                )?;
                task
            }
            CallbackStatus::Error => {
                let (code, message) = payload
                    .error
                    .as_ref()
                    .map(|e| (e.code.as_str(), e.message.as_str()))
                    .unwrap_or(("CALLBACK_ERROR", "Workflow reported an error"));
                let Some(task) = self.fail_task(task, code, message)? else {
                    return self.ignored_callback(&task_id);
                };
                CALLBACKS_RECEIVED.with_label_values(&["error"]).inc();
                self.log_event(
                    NewRequestEvent::new(
                        &task.request_id,
                        EventType::ProviderFailed,
                        format!("Workflow failed {}: {}", task.task_name, message),
                    )
                    .task(&task.id)
                    .metadata(provider_meta)
                    .actor(ORCHESTRATOR_ACTOR),
                )?;
                task
            }
        };

        Ok(CallbackAck {
            applied: true,
            task_status: task.status,
        })
    }

    /// Acknowledge a callback whose task moved on before it could be applied.
    fn ignored_callback(&self, task_id: &str) -> Result<CallbackAck, OrchestratorError> {
        CALLBACKS_RECEIVED.with_label_values(&["ignored"]).inc();
        let task = self
            .store
            .get_task(task_id)?
            .ok_or_else(|| OrchestratorError::TaskNotFound(task_id.to_string()))?;
        Ok(CallbackAck {
            applied: false,
            task_status: task.status,
        })
    }

    /// Fail in-progress tasks that exceeded their timeout. Returns how many.
    pub fn sweep_timeouts(&self, now: DateTime<Utc>) -> Result<usize, OrchestratorError> {
        let shortest = [
            AgentRole::Executive,
            AgentRole::TaskPlanner,
            AgentRole::Strategist,
            AgentRole::Copywriter,
            AgentRole::Producer,
            AgentRole::Qa,
        ]
        .iter()
        .map(|role| task_factory::timeout_seconds(*role))
        .min()
        .unwrap_or(0);
        let cutoff = now - chrono::Duration::seconds(shortest as i64);

        let mut swept = 0;
        for task in self.store.in_progress_tasks_started_before(cutoff)? {
            let Some(started_at) = task.started_at else {
                continue;
            };
            let elapsed = (now - started_at).num_seconds();
            if elapsed <= task.timeout_seconds as i64 {
                continue;
            }

            let request_id = task.request_id.clone();
            let timeout = task.timeout_seconds;
            let Some(task) = self.fail_task(
                task,
                "TASK_TIMEOUT",
                &format!("Task timed out after {timeout}s"),
            )?
            else {
                continue;
            };
            self.log_event(
                NewRequestEvent::new(
                    &request_id,
                    EventType::SystemError,
                    format!("{} timed out", task.task_name),
                )
                .task(&task.id)
                .metadata(json!({ "elapsed_seconds": elapsed, "timeout_seconds": timeout }))
                .actor(ORCHESTRATOR_ACTOR),
            )?;
            swept += 1;
        }

        if swept > 0 {
            self.timeouts_swept.fetch_add(swept as u64, Ordering::Relaxed);
            info!("Swept {} timed-out tasks", swept);
        }
        Ok(swept)
    }
}
