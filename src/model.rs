use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Backlog,
    Todo,
    InProgress,
    InReview,
    Done,
    Blocked,
    Cancelled,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Backlog => "backlog",
            Self::Todo => "todo",
            Self::InProgress => "in_progress",
            Self::InReview => "in_review",
            Self::Done => "done",
            Self::Blocked => "blocked",
            Self::Cancelled => "cancelled",
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    Active,
    Paused,
    Completed,
    Archived,
}

impl ProjectStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Archived => "archived",
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalType {
    LongTerm,
    MediumTerm,
    ShortTerm,
    Milestone,
}

impl GoalType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LongTerm => "long_term",
            Self::MediumTerm => "medium_term",
            Self::ShortTerm => "short_term",
            Self::Milestone => "milestone",
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalStatus {
    Active,
    Paused,
    Completed,
    Cancelled,
}

impl GoalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }
}

/// What happens to the children of a deleted task or goal.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    /// Delete the whole subtree.
    Cascade,
    /// Promote direct children to the deleted node's parent.
    #[default]
    Reparent,
}

impl Disposition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cascade => "cascade",
            Self::Reparent => "reparent",
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProjectInput {
    pub name: String,
    pub description: Option<String>,
    pub priority: Priority,
    pub start_date: Option<NaiveDate>,
    pub target_end_date: Option<NaiveDate>,
}

/// Date changes for a project. The outer `None` keeps the stored value, `Some(None)`
/// clears it.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ProjectDates {
    pub start_date: Option<Option<NaiveDate>>,
    pub target_end_date: Option<Option<NaiveDate>>,
    pub actual_end_date: Option<Option<NaiveDate>>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TaskInput {
    pub title: String,
    /// Inherited from the parent task when omitted.
    pub project_id: Option<i64>,
    pub parent_task_id: Option<i64>,
    pub status: TaskStatus,
    pub estimated_hours: Option<f64>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GoalInput {
    pub title: String,
    pub description: Option<String>,
    pub parent_goal_id: Option<i64>,
    pub goal_type: GoalType,
    pub target_date: Option<NaiveDate>,
}

#[derive(Clone, Debug, Default)]
pub struct GoalFilter {
    pub parent_goal_id: Option<i64>,
    /// Only goals without a parent. Ignored when `parent_goal_id` is set.
    pub roots_only: bool,
    pub goal_type: Option<GoalType>,
    pub status: Option<GoalStatus>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ProjectStats {
    pub project_id: i64,
    pub project_name: String,
    pub total_tasks: u64,
    pub completed_tasks: u64,
    pub in_progress_tasks: u64,
    pub todo_tasks: u64,
    pub blocked_tasks: u64,
    pub completion_percentage: f64,
    pub total_estimated_hours: f64,
    pub total_actual_hours: f64,
    pub linked_goals: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ProjectSummary {
    pub id: i64,
    pub name: String,
    pub status: String,
    pub priority: String,
    pub total_tasks: u64,
    pub completed_tasks: u64,
    pub completion_percentage: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TaskMetrics {
    pub task_id: i64,
    pub title: String,
    pub status: String,
    pub estimated_hours: Option<f64>,
    pub actual_hours: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Hours from creation to completion, two decimals.
    pub cycle_time_hours: Option<f64>,
    /// Actual hours relative to the estimate, in percent.
    pub effort_variance_percent: Option<f64>,
    pub over_estimated: Option<bool>,
    pub under_estimated: Option<bool>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GoalSummary {
    pub id: i64,
    pub parent_goal_id: Option<i64>,
    pub title: String,
    pub goal_type: String,
    pub status: String,
    pub progress: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GoalNode {
    pub id: i64,
    pub title: String,
    pub goal_type: String,
    pub status: String,
    pub progress: f64,
    pub level: u32,
    pub children: Vec<GoalNode>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GoalHierarchy {
    pub goal: GoalSummary,
    pub ancestors: Vec<GoalSummary>,
    pub descendants: Vec<GoalNode>,
    pub depth: usize,
    pub total_descendants: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GoalDetail {
    pub id: i64,
    pub parent_goal_id: Option<i64>,
    pub title: String,
    pub goal_type: String,
    pub status: String,
    pub progress: f64,
    pub manual_progress: f64,
    pub subgoal_count: u64,
    pub linked_projects: Vec<LinkedProject>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LinkedProject {
    pub project_id: i64,
    pub name: String,
    pub weight: f64,
    pub completion_percentage: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TaskSummary {
    pub id: i64,
    pub project_id: i64,
    pub parent_task_id: Option<i64>,
    pub title: String,
    pub status: String,
    pub estimated_hours: Option<f64>,
    pub actual_hours: Option<f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TaskNode {
    pub id: i64,
    pub title: String,
    pub status: String,
    pub level: u32,
    pub subtask_count: usize,
    pub children: Vec<TaskNode>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TaskHierarchy {
    pub task: TaskSummary,
    pub ancestors: Vec<TaskSummary>,
    pub descendants: Vec<TaskNode>,
    pub depth: usize,
    pub total_descendants: usize,
}

#[cfg(test)]
mod tests {
    use super::{Disposition, TaskStatus};

    #[test]
    fn task_status_serializes_as_stored() {
        let value = serde_json::to_value(TaskStatus::InProgress).expect("serialize");
        assert_eq!(value, TaskStatus::InProgress.as_str());
    }

    #[test]
    fn disposition_defaults_to_reparent() {
        assert_eq!(Disposition::default(), Disposition::Reparent);
    }
}
