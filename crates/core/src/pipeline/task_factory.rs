//! Task templates per request type and queries over a request's task list.

use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use std::collections::HashMap;

use super::{AgentRole, ContentRequest, RequestTask, RequestType, TaskStatus};

/// Blueprint for one task in a request type's workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskTemplate {
    pub role: AgentRole,
    pub name: &'static str,
    pub description: &'static str,
    pub sequence: u32,
    pub depends_on: Option<AgentRole>,
    pub estimated_seconds: u64,
    pub retryable: bool,
}

const fn template(
    role: AgentRole,
    name: &'static str,
    description: &'static str,
    sequence: u32,
    depends_on: Option<AgentRole>,
    estimated_seconds: u64,
) -> TaskTemplate {
    TaskTemplate {
        role,
        name,
        description,
        sequence,
        depends_on,
        estimated_seconds,
        retryable: true,
    }
}

const EXECUTIVE: TaskTemplate = template(
    AgentRole::Executive,
    "Intent Parsing & Validation",
    "Parse the brief and validate it against brand guidelines",
    1,
    None,
    5,
);

const QA_REVIEW: TaskTemplate = TaskTemplate {
    retryable: false,
    ..template(
        AgentRole::Qa,
        "Quality Assurance Review",
        "Review the output for brand alignment and technical quality",
        0,
        Some(AgentRole::Producer),
        10,
    )
};

const VIDEO_WITH_VO: [TaskTemplate; 6] = [
    EXECUTIVE,
    template(
        AgentRole::TaskPlanner,
        "Task Planning",
        "Break the request into a production plan",
        2,
        Some(AgentRole::Executive),
        10,
    ),
    template(
        AgentRole::Strategist,
        "Creative Strategy Generation",
        "Develop the creative concept, tone and visual direction",
        3,
        Some(AgentRole::TaskPlanner),
        30,
    ),
    template(
        AgentRole::Copywriter,
        "Script Writing",
        "Write the voiceover script and scene breakdown",
        4,
        Some(AgentRole::Strategist),
        45,
    ),
    template(
        AgentRole::Producer,
        "Video Generation",
        "Render the video and voiceover with the selected provider",
        5,
        Some(AgentRole::Copywriter),
        180,
    ),
    TaskTemplate {
        sequence: 6,
        ..QA_REVIEW
    },
];

const VIDEO_NO_VO: [TaskTemplate; 5] = [
    EXECUTIVE,
    template(
        AgentRole::TaskPlanner,
        "Task Planning",
        "Break the request into a production plan",
        2,
        Some(AgentRole::Executive),
        10,
    ),
    template(
        AgentRole::Strategist,
        "Visual Strategy Generation",
        "Develop the visual concept and shot list",
        3,
        Some(AgentRole::TaskPlanner),
        25,
    ),
    template(
        AgentRole::Producer,
        "Video Generation",
        "Render the video with background music",
        4,
        Some(AgentRole::Strategist),
        180,
    ),
    TaskTemplate {
        sequence: 5,
        estimated_seconds: 10,
        ..QA_REVIEW
    },
];

const IMAGE: [TaskTemplate; 4] = [
    EXECUTIVE,
    template(
        AgentRole::Strategist,
        "Visual Concept Generation",
        "Develop the image concept and composition",
        2,
        Some(AgentRole::Executive),
        20,
    ),
    template(
        AgentRole::Producer,
        "Image Generation",
        "Generate the image with the selected provider",
        3,
        Some(AgentRole::Strategist),
        30,
    ),
    TaskTemplate {
        sequence: 4,
        estimated_seconds: 5,
        ..QA_REVIEW
    },
];

pub fn templates(request_type: RequestType) -> &'static [TaskTemplate] {
    match request_type {
        RequestType::VideoWithVo => &VIDEO_WITH_VO,
        RequestType::VideoNoVo => &VIDEO_NO_VO,
        RequestType::Image => &IMAGE,
    }
}

/// Hard ceiling on how long a role may stay in progress.
pub fn timeout_seconds(role: AgentRole) -> u64 {
    match role {
        AgentRole::Executive | AgentRole::TaskPlanner | AgentRole::Qa => 300,
        AgentRole::Strategist | AgentRole::Copywriter => 1800,
        AgentRole::Producer => 7200,
    }
}

fn input_data(request: &ContentRequest, role: AgentRole) -> serde_json::Value {
    let mut data = json!({
        "request_id": request.id,
        "request_type": request.request_type,
        "brand_id": request.brand_id,
        "campaign_id": request.campaign_id,
        "prompt": request.prompt,
        "selected_kb_ids": request.selected_kb_ids,
    });

    let extra = match role {
        AgentRole::Executive => json!({
            "duration": request.duration_seconds,
            "aspect_ratio": request.aspect_ratio,
            "style_preset": request.style_preset,
        }),
        AgentRole::TaskPlanner => json!({
            "duration": request.duration_seconds,
            "aspect_ratio": request.aspect_ratio,
        }),
        AgentRole::Strategist => json!({
            "duration": request.duration_seconds,
            "style_preset": request.style_preset,
            "aspect_ratio": request.aspect_ratio,
        }),
        AgentRole::Copywriter => json!({
            "duration": request.duration_seconds,
            "voice_id": request.voice_id,
            "auto_script": request.auto_script,
            "script_text": request.script_text,
        }),
        AgentRole::Producer => json!({
            "duration": request.duration_seconds,
            "aspect_ratio": request.aspect_ratio,
            "shot_type": request.shot_type,
            "preferred_provider": request.preferred_provider,
            "provider_tier": request.provider_tier,
        }),
        AgentRole::Qa => json!({ "output_url": null }),
    };

    if let (Some(base), serde_json::Value::Object(extra)) = (data.as_object_mut(), extra) {
        base.extend(extra);
    }
    data
}

/// Instantiate the request type's template as pending tasks.
pub fn build_tasks(request: &ContentRequest, max_retries: u32) -> Vec<RequestTask> {
    let now = Utc::now();
    let templates = templates(request.request_type);
    let ids: HashMap<AgentRole, String> = templates
        .iter()
        .map(|t| (t.role, uuid::Uuid::new_v4().to_string()))
        .collect();

    templates
        .iter()
        .map(|t| RequestTask {
            id: ids[&t.role].clone(),
            request_id: request.id.clone(),
            agent_role: t.role,
            task_name: t.name.to_string(),
            task_key: t.role.as_str().to_string(),
            description: t.description.to_string(),
            status: TaskStatus::Pending,
            sequence_order: t.sequence,
            depends_on: t
                .depends_on
                .and_then(|role| ids.get(&role).cloned())
                .into_iter()
                .collect(),
            input_data: input_data(request, t.role),
            output_data: None,
            output_url: None,
            error_message: None,
            error_code: None,
            retry_count: 0,
            max_retries: if t.retryable { max_retries } else { 0 },
            started_at: None,
            completed_at: None,
            timeout_seconds: timeout_seconds(t.role),
            estimated_duration_seconds: t.estimated_seconds,
            created_at: now,
        })
        .collect()
}

/// First pending task, by sequence, whose dependencies are all done.
pub fn next_runnable(tasks: &[RequestTask]) -> Option<&RequestTask> {
    let mut sorted: Vec<&RequestTask> = tasks.iter().collect();
    sorted.sort_by_key(|t| t.sequence_order);

    sorted.into_iter().find(|task| {
        task.status == TaskStatus::Pending
            && task.depends_on.iter().all(|dep| {
                tasks
                    .iter()
                    .find(|t| &t.id == dep)
                    .is_some_and(|t| t.status.is_done())
            })
    })
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusSummary {
    pub total: usize,
    pub pending: usize,
    pub in_progress: usize,
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
}

pub fn status_summary(tasks: &[RequestTask]) -> StatusSummary {
    tasks.iter().fold(
        StatusSummary {
            total: tasks.len(),
            ..StatusSummary::default()
        },
        |mut acc, task| {
            match task.status {
                TaskStatus::Pending => acc.pending += 1,
                TaskStatus::InProgress => acc.in_progress += 1,
                TaskStatus::Completed => acc.completed += 1,
                TaskStatus::Failed => acc.failed += 1,
                TaskStatus::Skipped => acc.skipped += 1,
            }
            acc
        },
    )
}

pub fn all_complete(tasks: &[RequestTask]) -> bool {
    tasks.iter().all(|t| t.status.is_done())
}

pub fn has_failed(tasks: &[RequestTask]) -> bool {
    tasks.iter().any(|t| t.status == TaskStatus::Failed)
}

/// The task in progress, else the next runnable one.
pub fn current_task(tasks: &[RequestTask]) -> Option<&RequestTask> {
    tasks
        .iter()
        .find(|t| t.status == TaskStatus::InProgress)
        .or_else(|| next_runnable(tasks))
}

/// Share of tasks completed or skipped, 0..=100.
pub fn completion_percentage(tasks: &[RequestTask]) -> u8 {
    if tasks.is_empty() {
        return 0;
    }
    let done = tasks.iter().filter(|t| t.status.is_done()).count();
    ((done as f64 / tasks.len() as f64) * 100.0).round() as u8
}

pub fn estimated_total_duration(request_type: RequestType) -> u64 {
    templates(request_type)
        .iter()
        .map(|t| t.estimated_seconds)
        .sum()
}

pub fn estimated_duration(request_type: RequestType, role: AgentRole) -> Option<u64> {
    templates(request_type)
        .iter()
        .find(|t| t.role == role)
        .map(|t| t.estimated_seconds)
}
