//! Content request, task and event records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::validation::{check_length, FieldError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestType {
    /// Video with voiceover.
    VideoWithVo,
    /// Video with music only.
    VideoNoVo,
    Image,
}

impl RequestType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::VideoWithVo => "video_with_vo",
            Self::VideoNoVo => "video_no_vo",
            Self::Image => "image",
        }
    }

    pub fn has_voiceover(&self) -> bool {
        matches!(self, Self::VideoWithVo)
    }
}

impl fmt::Display for RequestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Intake,
    Draft,
    Production,
    Qa,
    Approval,
    Published,
    Cancelled,
}

impl RequestStatus {
    pub const ALL: [RequestStatus; 7] = [
        Self::Intake,
        Self::Draft,
        Self::Production,
        Self::Qa,
        Self::Approval,
        Self::Published,
        Self::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Intake => "intake",
            Self::Draft => "draft",
            Self::Production => "production",
            Self::Qa => "qa",
            Self::Approval => "approval",
            Self::Published => "published",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Published | Self::Cancelled)
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    /// Skipped because the request was cancelled or the step is not needed.
    Skipped,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }

    /// Completed or skipped: satisfies dependencies.
    pub fn is_done(&self) -> bool {
        matches!(self, Self::Completed | Self::Skipped)
    }

    /// Pending or in progress: still has work ahead.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Pending | Self::InProgress)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    Executive,
    TaskPlanner,
    Strategist,
    Copywriter,
    Producer,
    Qa,
}

impl AgentRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Executive => "executive",
            Self::TaskPlanner => "task_planner",
            Self::Strategist => "strategist",
            Self::Copywriter => "copywriter",
            Self::Producer => "producer",
            Self::Qa => "qa",
        }
    }
}

impl fmt::Display for AgentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderTier {
    Economy,
    #[default]
    Standard,
    Premium,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Created,
    StatusChange,
    TaskStarted,
    TaskCompleted,
    TaskFailed,
    AgentLog,
    ProviderDispatched,
    ProviderCompleted,
    ProviderFailed,
    UserAction,
    SystemAction,
    SystemError,
    RetryInitiated,
}

/// A content request moving through the production pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentRequest {
    pub id: String,
    pub owner_id: String,
    pub brand_id: String,
    pub campaign_id: Option<String>,
    pub title: String,
    pub request_type: RequestType,
    pub status: RequestStatus,

    // Creative requirements
    pub prompt: String,
    pub duration_seconds: Option<u32>,
    pub aspect_ratio: String,
    pub style_preset: String,
    pub shot_type: String,
    pub voice_id: Option<String>,

    // Provider settings
    pub preferred_provider: Option<String>,
    pub provider_tier: ProviderTier,

    // Script settings
    pub auto_script: bool,
    pub script_text: Option<String>,

    pub selected_kb_ids: Vec<String>,

    pub estimated_cost: Option<f64>,
    pub estimated_time_seconds: Option<u64>,
    pub actual_cost: f64,

    pub thumbnail_url: Option<String>,
    pub output_url: Option<String>,

    pub metadata: serde_json::Value,
    pub idempotency_key: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Everything needed to insert a new content request.
#[derive(Debug, Clone, PartialEq)]
pub struct NewContentRequest {
    pub owner_id: String,
    pub brand_id: String,
    pub campaign_id: Option<String>,
    pub title: String,
    pub request_type: RequestType,
    pub prompt: String,
    pub duration_seconds: Option<u32>,
    pub aspect_ratio: String,
    pub style_preset: String,
    pub shot_type: String,
    pub voice_id: Option<String>,
    pub preferred_provider: Option<String>,
    pub provider_tier: ProviderTier,
    pub auto_script: bool,
    pub script_text: Option<String>,
    pub selected_kb_ids: Vec<String>,
    pub estimated_cost: Option<f64>,
    pub estimated_time_seconds: Option<u64>,
    pub metadata: serde_json::Value,
    pub idempotency_key: Option<String>,
}

/// One unit of agent work within a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestTask {
    pub id: String,
    pub request_id: String,
    pub agent_role: AgentRole,
    pub task_name: String,
    pub task_key: String,
    pub description: String,
    pub status: TaskStatus,
    pub sequence_order: u32,
    pub depends_on: Vec<String>,
    pub input_data: serde_json::Value,
    pub output_data: Option<serde_json::Value>,
    pub output_url: Option<String>,
    pub error_message: Option<String>,
    pub error_code: Option<String>,
    pub retry_count: u32,
    pub max_retries: u32,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub timeout_seconds: u64,
    pub estimated_duration_seconds: u64,
    pub created_at: DateTime<Utc>,
}

/// Immutable audit entry for a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestEvent {
    pub id: String,
    pub request_id: String,
    pub task_id: Option<String>,
    pub event_type: EventType,
    pub description: String,
    pub metadata: serde_json::Value,
    pub actor: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// An event waiting to be appended.
#[derive(Debug, Clone, PartialEq)]
pub struct NewRequestEvent {
    pub request_id: String,
    pub task_id: Option<String>,
    pub event_type: EventType,
    pub description: String,
    pub metadata: serde_json::Value,
    pub actor: Option<String>,
}

impl NewRequestEvent {
    pub fn new(request_id: &str, event_type: EventType, description: impl Into<String>) -> Self {
        Self {
            request_id: request_id.to_string(),
            task_id: None,
            event_type,
            description: description.into(),
            metadata: serde_json::json!({}),
            actor: None,
        }
    }

    pub fn task(mut self, task_id: &str) -> Self {
        self.task_id = Some(task_id.to_string());
        self
    }

    pub fn metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }
}

// =============================================================================
// API input
// =============================================================================

pub const ASPECT_RATIOS: &[&str] = &["16:9", "9:16", "1:1", "4:5"];
pub const STYLE_PRESETS: &[&str] = &["Realistic", "Animated", "Cinematic", "3D", "Sketch"];
pub const SHOT_TYPES: &[&str] = &["Close-up", "Wide", "Medium", "POV", "Aerial"];

const MAX_DURATION_SECONDS: u32 = 300;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreativeRequirements {
    pub prompt: String,
    #[serde(default)]
    pub duration: Option<u32>,
    #[serde(default)]
    pub aspect_ratio: Option<String>,
    #[serde(default)]
    pub style_preset: Option<String>,
    #[serde(default)]
    pub shot_type: Option<String>,
    #[serde(default)]
    pub voice_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestSettings {
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub tier: Option<ProviderTier>,
    #[serde(default)]
    pub auto_script: Option<bool>,
    #[serde(default)]
    pub script_text: Option<String>,
    #[serde(default)]
    pub selected_kb_ids: Option<Vec<String>>,
}

/// Body of `POST /api/v1/requests`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRequestInput {
    pub brand_id: String,
    #[serde(default)]
    pub campaign_id: Option<String>,
    pub title: String,
    #[serde(rename = "type")]
    pub request_type: RequestType,
    pub requirements: CreativeRequirements,
    #[serde(default)]
    pub settings: Option<RequestSettings>,
}

impl CreateRequestInput {
    pub fn validate(&self) -> Result<(), Vec<FieldError>> {
        let mut errors = Vec::new();
        check_length(&mut errors, "brand_id", &self.brand_id, 1, 64);
        check_length(&mut errors, "title", &self.title, 1, 255);
        check_length(&mut errors, "requirements.prompt", &self.requirements.prompt, 1, 5000);

        if let Some(duration) = self.requirements.duration {
            if duration == 0 || duration > MAX_DURATION_SECONDS {
                errors.push(FieldError::new(
                    "requirements.duration",
                    format!("must be between 1 and {MAX_DURATION_SECONDS} seconds"),
                ));
            }
        }
        check_choice(&mut errors, "requirements.aspect_ratio", &self.requirements.aspect_ratio, ASPECT_RATIOS);
        check_choice(&mut errors, "requirements.style_preset", &self.requirements.style_preset, STYLE_PRESETS);
        check_choice(&mut errors, "requirements.shot_type", &self.requirements.shot_type, SHOT_TYPES);

        if let Some(settings) = &self.settings {
            let auto_script = settings.auto_script.unwrap_or(true);
            let script_empty = settings
                .script_text
                .as_deref()
                .map_or(true, |s| s.trim().is_empty());
            if !auto_script && script_empty && self.request_type.has_voiceover() {
                errors.push(FieldError::new(
                    "settings.script_text",
                    "is required when auto_script is false",
                ));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Resolve defaults into an insertable record for `owner_id`.
    pub fn into_new(self, owner_id: &str) -> NewContentRequest {
        let settings = self.settings.unwrap_or_default();
        let requirements = self.requirements;
        NewContentRequest {
            owner_id: owner_id.to_string(),
            brand_id: self.brand_id,
            campaign_id: self.campaign_id,
            title: self.title.trim().to_string(),
            request_type: self.request_type,
            prompt: requirements.prompt,
            duration_seconds: requirements.duration,
            aspect_ratio: requirements.aspect_ratio.unwrap_or_else(|| "16:9".to_string()),
            style_preset: requirements.style_preset.unwrap_or_else(|| "Realistic".to_string()),
            shot_type: requirements.shot_type.unwrap_or_else(|| "Medium".to_string()),
            voice_id: requirements.voice_id,
            preferred_provider: settings.provider,
            provider_tier: settings.tier.unwrap_or_default(),
            auto_script: settings.auto_script.unwrap_or(true),
            script_text: settings.script_text,
            selected_kb_ids: settings.selected_kb_ids.unwrap_or_default(),
            estimated_cost: None,
            estimated_time_seconds: None,
            metadata: serde_json::json!({}),
            idempotency_key: None,
        }
    }
}

fn check_choice(errors: &mut Vec<FieldError>, field: &str, value: &Option<String>, allowed: &[&str]) {
    if let Some(value) = value {
        if !allowed.contains(&value.as_str()) {
            errors.push(FieldError::new(
                field,
                format!("must be one of: {}", allowed.join(", ")),
            ));
        }
    }
}

/// Body of `PATCH /api/v1/requests/{id}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateRequestInput {
    #[serde(default)]
    pub title: Option<String>,
    /// Only `cancelled` is accepted.
    #[serde(default)]
    pub status: Option<RequestStatus>,
}

impl UpdateRequestInput {
    pub fn validate(&self) -> Result<(), Vec<FieldError>> {
        let mut errors = Vec::new();
        if self.title.is_none() && self.status.is_none() {
            errors.push(FieldError::new("body", "no fields to update"));
        }
        if let Some(title) = &self.title {
            check_length(&mut errors, "title", title, 1, 255);
        }
        if let Some(status) = self.status {
            if status != RequestStatus::Cancelled {
                errors.push(FieldError::new("status", "only \"cancelled\" can be set"));
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input() -> CreateRequestInput {
        serde_json::from_value(serde_json::json!({
            "brand_id": "brand-1",
            "title": "Spring launch teaser",
            "type": "video_with_vo",
            "requirements": { "prompt": "A sunrise over the product", "duration": 15 }
        }))
        .unwrap()
    }

    #[test]
    fn test_enum_wire_names() {
        assert_eq!(serde_json::to_value(RequestType::VideoNoVo).unwrap(), "video_no_vo");
        assert_eq!(serde_json::to_value(TaskStatus::InProgress).unwrap(), "in_progress");
        assert_eq!(serde_json::to_value(AgentRole::TaskPlanner).unwrap(), "task_planner");
        assert_eq!(serde_json::to_value(EventType::RetryInitiated).unwrap(), "retry_initiated");
        assert_eq!(RequestStatus::Qa.to_string(), "qa");
        assert_eq!(RequestType::VideoWithVo.to_string(), "video_with_vo");
    }

    #[test]
    fn test_status_predicates() {
        assert!(RequestStatus::Published.is_terminal());
        assert!(RequestStatus::Cancelled.is_terminal());
        assert!(!RequestStatus::Approval.is_terminal());
        assert!(TaskStatus::Skipped.is_done());
        assert!(!TaskStatus::Failed.is_done());
        assert!(TaskStatus::InProgress.is_open());
        assert!(!TaskStatus::Completed.is_open());
    }

    #[test]
    fn test_valid_input_resolves_defaults() {
        let input = input();
        assert!(input.validate().is_ok());

        let new = input.into_new("owner-1");
        assert_eq!(new.owner_id, "owner-1");
        assert_eq!(new.aspect_ratio, "16:9");
        assert_eq!(new.style_preset, "Realistic");
        assert_eq!(new.shot_type, "Medium");
        assert_eq!(new.provider_tier, ProviderTier::Standard);
        assert!(new.auto_script);
        assert_eq!(new.duration_seconds, Some(15));
        assert!(new.selected_kb_ids.is_empty());
    }

    #[test]
    fn test_invalid_input_reports_fields() {
        let mut input = input();
        input.title = " ".to_string();
        input.requirements.duration = Some(0);
        input.requirements.aspect_ratio = Some("21:9".to_string());

        let errors = input.validate().unwrap_err();
        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(
            fields,
            vec!["title", "requirements.duration", "requirements.aspect_ratio"]
        );
    }

    #[test]
    fn test_manual_script_requires_text_for_voiceover() {
        let mut input = input();
        input.settings = Some(RequestSettings {
            auto_script: Some(false),
            ..RequestSettings::default()
        });
        let errors = input.validate().unwrap_err();
        assert_eq!(errors[0].field, "settings.script_text");

        input.request_type = RequestType::VideoNoVo;
        assert!(input.validate().is_ok());
    }

    #[test]
    fn test_update_input_only_allows_cancel() {
        let cancel = UpdateRequestInput {
            title: None,
            status: Some(RequestStatus::Cancelled),
        };
        assert!(cancel.validate().is_ok());

        let publish = UpdateRequestInput {
            title: None,
            status: Some(RequestStatus::Published),
        };
        assert!(publish.validate().is_err());
        assert!(UpdateRequestInput::default().validate().is_err());
    }

    #[test]
    fn test_event_builder() {
        let event = NewRequestEvent::new("req-1", EventType::TaskStarted, "Started")
            .task("task-1")
            .metadata(serde_json::json!({"attempt": 1}))
            .actor("system:orchestrator");
        assert_eq!(event.task_id.as_deref(), Some("task-1"));
        assert_eq!(event.actor.as_deref(), Some("system:orchestrator"));
        assert_eq!(event.metadata["attempt"], 1);
    }
}
