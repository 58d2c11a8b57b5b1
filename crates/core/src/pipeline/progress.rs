//! Duration-weighted progress for a request's tasks.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{AgentRole, RequestStatus, RequestTask, TaskStatus};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskProgress {
    pub id: String,
    pub task_key: String,
    pub task_name: String,
    pub agent_role: AgentRole,
    pub status: TaskStatus,
    pub sequence_order: u32,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Wall-clock seconds so far, or total if completed.
    pub duration_seconds: Option<i64>,
    pub estimated_duration_seconds: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressInfo {
    pub percentage: u8,
    pub completed: usize,
    pub total: usize,
    pub in_progress: usize,
    pub pending: usize,
    pub failed: usize,
    pub estimated_seconds_remaining: Option<u64>,
    pub current_phase: RequestStatus,
    pub tasks: Vec<TaskProgress>,
}

impl ProgressInfo {
    pub fn empty() -> Self {
        Self {
            percentage: 0,
            completed: 0,
            total: 0,
            in_progress: 0,
            pending: 0,
            failed: 0,
            estimated_seconds_remaining: None,
            current_phase: RequestStatus::Intake,
            tasks: Vec::new(),
        }
    }
}

fn default_duration(role: AgentRole) -> u64 {
    match role {
        AgentRole::Executive => 5,
        AgentRole::TaskPlanner => 10,
        AgentRole::Strategist => 30,
        AgentRole::Copywriter => 45,
        AgentRole::Producer => 180,
        AgentRole::Qa => 20,
    }
}

fn weight(task: &RequestTask) -> u64 {
    if task.estimated_duration_seconds > 0 {
        task.estimated_duration_seconds
    } else {
        default_duration(task.agent_role)
    }
}

fn phase_for(role: AgentRole) -> RequestStatus {
    match role {
        AgentRole::Executive | AgentRole::TaskPlanner => RequestStatus::Intake,
        AgentRole::Strategist | AgentRole::Copywriter => RequestStatus::Draft,
        AgentRole::Producer => RequestStatus::Production,
        AgentRole::Qa => RequestStatus::Qa,
    }
}

fn current_phase(tasks: &[RequestTask]) -> RequestStatus {
    if let Some(task) = tasks.iter().find(|t| t.status == TaskStatus::InProgress) {
        return phase_for(task.agent_role);
    }
    tasks
        .iter()
        .filter(|t| t.status == TaskStatus::Completed)
        .max_by_key(|t| t.sequence_order)
        .map(|t| phase_for(t.agent_role))
        .unwrap_or(RequestStatus::Intake)
}

fn task_progress(task: &RequestTask, now: DateTime<Utc>) -> TaskProgress {
    let duration_seconds = task.started_at.map(|started| {
        let end = task.completed_at.unwrap_or(now);
        (end - started).num_seconds()
    });

    TaskProgress {
        id: task.id.clone(),
        task_key: task.task_key.clone(),
        task_name: task.task_name.clone(),
        agent_role: task.agent_role,
        status: task.status,
        sequence_order: task.sequence_order,
        started_at: task.started_at,
        completed_at: task.completed_at,
        duration_seconds,
        estimated_duration_seconds: weight(task),
    }
}

/// Compute progress for `tasks` as of `now`.
pub fn compute_progress(tasks: &[RequestTask], now: DateTime<Utc>) -> ProgressInfo {
    if tasks.is_empty() {
        return ProgressInfo::empty();
    }

    let mut sorted: Vec<&RequestTask> = tasks.iter().collect();
    sorted.sort_by_key(|t| t.sequence_order);

    let count = |status: TaskStatus| tasks.iter().filter(|t| t.status == status).count();

    let total_weight: u64 = tasks.iter().map(weight).sum();
    // Halves are tracked in doubled units to stay in integers.
    let done_doubled: u64 = tasks
        .iter()
        .map(|t| match t.status {
            TaskStatus::Completed => weight(t) * 2,
            TaskStatus::InProgress => weight(t),
            _ => 0,
        })
        .sum();
    let remaining_doubled: u64 = tasks
        .iter()
        .map(|t| match t.status {
            TaskStatus::Pending => weight(t) * 2,
            TaskStatus::InProgress => weight(t),
            _ => 0,
        })
        .sum();

    let percentage = if total_weight == 0 {
        0
    } else {
        ((done_doubled as f64 / (total_weight * 2) as f64) * 100.0).round() as u8
    };
    let remaining = (remaining_doubled as f64 / 2.0).round() as u64;

    ProgressInfo {
        percentage,
        completed: count(TaskStatus::Completed),
        total: tasks.len(),
        in_progress: count(TaskStatus::InProgress),
        pending: count(TaskStatus::Pending),
        failed: count(TaskStatus::Failed),
        estimated_seconds_remaining: (remaining > 0).then_some(remaining),
        current_phase: current_phase(tasks),
        tasks: sorted.into_iter().map(|t| task_progress(t, now)).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::task_factory::build_tasks;
    use crate::pipeline::RequestType;
    use crate::testing::fixtures::content_request;
    use chrono::Duration;

    fn image_tasks() -> Vec<RequestTask> {
        build_tasks(&content_request(RequestType::Image), 3)
    }

    #[test]
    fn test_empty_tasks() {
        let progress = compute_progress(&[], Utc::now());
        assert_eq!(progress, ProgressInfo::empty());
        assert_eq!(progress.current_phase, RequestStatus::Intake);
    }

    #[test]
    fn test_weighted_percentage() {
        // image weights: executive 5, strategist 20, producer 30, qa 5 (total 60)
        let mut tasks = image_tasks();
        tasks[0].status = TaskStatus::Completed;
        tasks[1].status = TaskStatus::Completed;
        tasks[2].status = TaskStatus::InProgress;

        let progress = compute_progress(&tasks, Utc::now());
        // (5 + 20 + 15) / 60
        assert_eq!(progress.percentage, 67);
        // 15 left on producer plus 5 for qa
        assert_eq!(progress.estimated_seconds_remaining, Some(20));
        assert_eq!(progress.current_phase, RequestStatus::Production);
        assert_eq!(progress.completed, 2);
        assert_eq!(progress.in_progress, 1);
        assert_eq!(progress.pending, 1);
    }

    #[test]
    fn test_finished_has_no_remaining() {
        let mut tasks = image_tasks();
        for task in &mut tasks {
            task.status = TaskStatus::Completed;
        }
        let progress = compute_progress(&tasks, Utc::now());
        assert_eq!(progress.percentage, 100);
        assert_eq!(progress.estimated_seconds_remaining, None);
        assert_eq!(progress.current_phase, RequestStatus::Qa);
    }

    #[test]
    fn test_missing_estimate_uses_role_default() {
        let mut tasks = image_tasks();
        tasks[2].estimated_duration_seconds = 0;
        let progress = compute_progress(&tasks, Utc::now());
        assert_eq!(progress.tasks[2].estimated_duration_seconds, 180);
    }

    #[test]
    fn test_phase_falls_back_to_last_completed() {
        let mut tasks = image_tasks();
        tasks[1].status = TaskStatus::Completed;
        tasks[0].status = TaskStatus::Completed;
        let progress = compute_progress(&tasks, Utc::now());
        assert_eq!(progress.current_phase, RequestStatus::Draft);
    }

    #[test]
    fn test_task_durations() {
        let now = Utc::now();
        let mut tasks = image_tasks();
        tasks[0].started_at = Some(now - Duration::seconds(40));
        tasks[0].completed_at = Some(now - Duration::seconds(10));
        tasks[1].started_at = Some(now - Duration::seconds(7));

        let progress = compute_progress(&tasks, now);
        assert_eq!(progress.tasks[0].duration_seconds, Some(30));
        assert_eq!(progress.tasks[1].duration_seconds, Some(7));
        assert_eq!(progress.tasks[2].duration_seconds, None);
    }
}
