//! Pipeline storage trait.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use thiserror::Error;

use super::{
    ContentRequest, NewContentRequest, NewRequestEvent, RequestEvent, RequestStatus, RequestTask,
    TaskStatus,
};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Request not found: {0}")]
    RequestNotFound(String),

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    /// The row was changed by someone else since it was read.
    #[error("{entity} {id} is no longer {expected}")]
    Conflict {
        entity: &'static str,
        id: String,
        expected: String,
    },

    #[error("Database error: {0}")]
    Database(String),
}

impl From<rusqlite::Error> for PipelineError {
    fn from(e: rusqlite::Error) -> Self {
        PipelineError::Database(e.to_string())
    }
}

/// Filter for listing content requests.
#[derive(Debug, Clone)]
pub struct RequestFilter {
    pub owner_id: Option<String>,
    pub status: Option<RequestStatus>,
    pub campaign_id: Option<String>,
    pub limit: i64,
    pub offset: i64,
}

impl Default for RequestFilter {
    fn default() -> Self {
        Self {
            owner_id: None,
            status: None,
            campaign_id: None,
            limit: 50,
            offset: 0,
        }
    }
}

impl RequestFilter {
    pub fn for_owner(owner_id: impl Into<String>) -> Self {
        Self {
            owner_id: Some(owner_id.into()),
            ..Self::default()
        }
    }

    pub fn with_status(mut self, status: RequestStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_campaign(mut self, campaign_id: impl Into<String>) -> Self {
        self.campaign_id = Some(campaign_id.into());
        self
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_offset(mut self, offset: i64) -> Self {
        self.offset = offset;
        self
    }
}

/// Storage for content requests, their tasks and their event log.
///
/// Methods taking an `owner_id` only see that owner's rows. The unscoped
/// variants exist for the orchestrator and callback path.
pub trait PipelineStore: Send + Sync {
    fn create_request(&self, new: NewContentRequest) -> Result<ContentRequest, PipelineError>;

    fn get_request(&self, owner_id: &str, id: &str) -> Result<Option<ContentRequest>, PipelineError>;

    fn get_request_unscoped(&self, id: &str) -> Result<Option<ContentRequest>, PipelineError>;

    fn find_by_idempotency_key(
        &self,
        owner_id: &str,
        key: &str,
    ) -> Result<Option<ContentRequest>, PipelineError>;

    /// Drop the idempotency key of a request so the key can be reused.
    fn clear_idempotency_key(&self, id: &str) -> Result<(), PipelineError>;

    fn list_requests(&self, filter: &RequestFilter) -> Result<Vec<ContentRequest>, PipelineError>;

    /// Count matching requests, ignoring limit and offset.
    fn count_requests(&self, filter: &RequestFilter) -> Result<i64, PipelineError>;

    fn count_by_status(&self, owner_id: &str) -> Result<BTreeMap<RequestStatus, i64>, PipelineError>;

    /// Move a request from `from` to `to`.
    ///
    /// Fails with `Conflict` when the stored status is no longer `from`.
    fn update_status(
        &self,
        id: &str,
        from: RequestStatus,
        to: RequestStatus,
    ) -> Result<ContentRequest, PipelineError>;

    fn update_title(
        &self,
        owner_id: &str,
        id: &str,
        title: &str,
    ) -> Result<ContentRequest, PipelineError>;

    /// Record the final asset of a request.
    fn record_output(&self, id: &str, output_url: &str) -> Result<(), PipelineError>;

    /// Delete a request together with its tasks and events.
    fn delete_request(&self, owner_id: &str, id: &str) -> Result<ContentRequest, PipelineError>;

    fn insert_tasks(&self, tasks: &[RequestTask]) -> Result<(), PipelineError>;

    /// Tasks of a request ordered by sequence.
    fn list_tasks(&self, request_id: &str) -> Result<Vec<RequestTask>, PipelineError>;

    fn get_task(&self, task_id: &str) -> Result<Option<RequestTask>, PipelineError>;

    /// Persist the mutable fields of a task whose stored status is `expected`.
    ///
    /// Fails with `Conflict` when the task moved on in the meantime.
    fn save_task(&self, task: &RequestTask, expected: TaskStatus) -> Result<(), PipelineError>;

    /// Mark every pending or in-progress task of a request as skipped.
    fn skip_open_tasks(&self, request_id: &str) -> Result<usize, PipelineError>;

    /// In-progress tasks that started before `before`.
    fn in_progress_tasks_started_before(
        &self,
        before: DateTime<Utc>,
    ) -> Result<Vec<RequestTask>, PipelineError>;

    fn append_event(&self, event: NewRequestEvent) -> Result<RequestEvent, PipelineError>;

    fn list_events(
        &self,
        request_id: &str,
        limit: i64,
        offset: i64,
        newest_first: bool,
    ) -> Result<Vec<RequestEvent>, PipelineError>;
}
