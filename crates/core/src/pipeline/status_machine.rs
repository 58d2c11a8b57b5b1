//! Allowed status transitions and the task gates on the forward path.

use serde::Serialize;
use thiserror::Error;

use super::task_factory::templates;
use super::{AgentRole, RequestStatus, RequestTask, RequestType, TaskStatus};

/// Coarse grouping of statuses for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Planning,
    Execution,
    Review,
    Complete,
}

impl Stage {
    pub fn description(&self) -> &'static str {
        match self {
            Self::Planning => "Planning & Strategy",
            Self::Execution => "Production & Execution",
            Self::Review => "Quality Assurance & Review",
            Self::Complete => "Complete",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("Invalid transition: {from} → {to}. Allowed transitions: {allowed}")]
    NotAllowed {
        from: RequestStatus,
        to: RequestStatus,
        allowed: String,
    },

    #[error("Cannot transition to '{to}': blocking tasks: {}", blocking.join(", "))]
    Blocked {
        from: RequestStatus,
        to: RequestStatus,
        blocking: Vec<String>,
    },
}

const FORWARD: [RequestStatus; 5] = [
    RequestStatus::Intake,
    RequestStatus::Draft,
    RequestStatus::Production,
    RequestStatus::Qa,
    RequestStatus::Published,
];

pub fn allowed_transitions(from: RequestStatus) -> &'static [RequestStatus] {
    use RequestStatus::*;
    match from {
        Intake => &[Draft, Cancelled],
        Draft => &[Production, Cancelled],
        Production => &[Qa, Draft, Cancelled],
        Qa => &[Published, Production, Cancelled],
        Approval => &[Published, Draft, Cancelled],
        Published | Cancelled => &[],
    }
}

pub fn can_transition(from: RequestStatus, to: RequestStatus) -> bool {
    allowed_transitions(from).contains(&to)
}

pub fn next_status(current: RequestStatus) -> Option<RequestStatus> {
    let idx = FORWARD.iter().position(|s| *s == current)?;
    FORWARD.get(idx + 1).copied()
}

pub fn previous_status(current: RequestStatus) -> Option<RequestStatus> {
    let idx = FORWARD.iter().position(|s| *s == current)?;
    idx.checked_sub(1).map(|i| FORWARD[i])
}

pub fn stage(status: RequestStatus) -> Stage {
    match status {
        RequestStatus::Intake | RequestStatus::Draft => Stage::Planning,
        RequestStatus::Production => Stage::Execution,
        RequestStatus::Qa | RequestStatus::Approval => Stage::Review,
        RequestStatus::Published | RequestStatus::Cancelled => Stage::Complete,
    }
}

/// Roles whose tasks must complete before a request leaves `status` forward.
pub fn required_roles(status: RequestStatus) -> &'static [AgentRole] {
    match status {
        RequestStatus::Draft => &[AgentRole::Strategist, AgentRole::Copywriter],
        RequestStatus::Production => &[AgentRole::Producer],
        RequestStatus::Qa => &[AgentRole::Qa],
        _ => &[],
    }
}

/// Position on the forward path; approval sits between qa and published.
fn rank(status: RequestStatus) -> Option<u8> {
    match status {
        RequestStatus::Intake => Some(0),
        RequestStatus::Draft => Some(1),
        RequestStatus::Production => Some(2),
        RequestStatus::Qa => Some(3),
        RequestStatus::Approval => Some(4),
        RequestStatus::Published => Some(5),
        RequestStatus::Cancelled => None,
    }
}

fn is_forward(from: RequestStatus, to: RequestStatus) -> bool {
    matches!((rank(from), rank(to)), (Some(a), Some(b)) if b > a)
}

/// Unfinished work that blocks `from → to`.
///
/// Only forward moves are gated, and only on roles the request type's
/// template actually includes.
pub fn blocking_tasks(
    request_type: RequestType,
    from: RequestStatus,
    to: RequestStatus,
    tasks: &[RequestTask],
) -> Vec<String> {
    if !is_forward(from, to) {
        return Vec::new();
    }

    let template = templates(request_type);
    required_roles(from)
        .iter()
        .filter(|role| template.iter().any(|t| t.role == **role))
        .filter_map(|role| match tasks.iter().find(|t| t.agent_role == *role) {
            None => Some(format!("{role} (missing)")),
            Some(task) if task.status != TaskStatus::Completed => {
                Some(format!("{} ({})", task.task_name, task.status))
            }
            Some(_) => None,
        })
        .collect()
}

pub fn validate_transition(
    request_type: RequestType,
    from: RequestStatus,
    to: RequestStatus,
    tasks: &[RequestTask],
) -> Result<RequestStatus, TransitionError> {
    if !can_transition(from, to) {
        let allowed = allowed_transitions(from);
        return Err(TransitionError::NotAllowed {
            from,
            to,
            allowed: if allowed.is_empty() {
                "none".to_string()
            } else {
                allowed
                    .iter()
                    .map(|s| s.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            },
        });
    }

    let blocking = blocking_tasks(request_type, from, to, tasks);
    if !blocking.is_empty() {
        return Err(TransitionError::Blocked { from, to, blocking });
    }

    Ok(to)
}

/// Result of asking whether a request may move to its next forward status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdvanceCheck {
    pub can_advance: bool,
    pub next_status: Option<RequestStatus>,
    pub reason: Option<String>,
}

pub fn can_advance(
    request_type: RequestType,
    current: RequestStatus,
    tasks: &[RequestTask],
) -> AdvanceCheck {
    if current.is_terminal() {
        return AdvanceCheck {
            can_advance: false,
            next_status: None,
            reason: Some("Already at terminal state".to_string()),
        };
    }

    let Some(next) = next_status(current) else {
        return AdvanceCheck {
            can_advance: false,
            next_status: None,
            reason: Some("No next status defined".to_string()),
        };
    };

    match validate_transition(request_type, current, next, tasks) {
        Ok(_) => AdvanceCheck {
            can_advance: true,
            next_status: Some(next),
            reason: None,
        },
        Err(e) => AdvanceCheck {
            can_advance: false,
            next_status: Some(next),
            reason: Some(e.to_string()),
        },
    }
}

/// Statuses the orchestrator leaves on its own once their gates clear.
/// QA needs its own task outcome.
pub fn should_auto_advance(status: RequestStatus) -> bool {
    matches!(
        status,
        RequestStatus::Intake | RequestStatus::Draft | RequestStatus::Production
    )
}

/// Coarse completion implied by status alone.
pub fn completion_percentage(status: RequestStatus) -> u8 {
    match status {
        RequestStatus::Intake => 10,
        RequestStatus::Draft => 40,
        RequestStatus::Production => 70,
        RequestStatus::Qa => 90,
        RequestStatus::Approval => 95,
        RequestStatus::Published => 100,
        RequestStatus::Cancelled => 0,
    }
}

pub fn status_label(status: RequestStatus) -> &'static str {
    match status {
        RequestStatus::Intake => "Intake",
        RequestStatus::Draft => "Draft",
        RequestStatus::Production => "In Production",
        RequestStatus::Qa => "Quality Assurance",
        RequestStatus::Approval => "Pending Approval",
        RequestStatus::Published => "Published",
        RequestStatus::Cancelled => "Cancelled",
    }
}
