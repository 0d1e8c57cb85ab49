//! Derived progress values. Nothing here is stored; every call reads current task
//! states.

use sea_orm::{
    ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect,
};

use crate::entities::{goal, goal_project, project, task};
use crate::error::AppError;
use crate::model::{ProjectStats, TaskMetrics, TaskStatus};

/// Rounds to one decimal place for display.
pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Share of the project's tasks that are done, in percent. A project without tasks is
/// 0% complete.
pub async fn completion_percentage<C: ConnectionTrait>(
    db: &C,
    project_id: i64,
) -> Result<f64, AppError> {
    let total = task::Entity::find()
        .filter(task::Column::ProjectId.eq(project_id))
        .count(db)
        .await?;
    if total == 0 {
        return Ok(0.0);
    }
    let done = task::Entity::find()
        .filter(task::Column::ProjectId.eq(project_id))
        .filter(task::Column::Status.eq(TaskStatus::Done.as_str()))
        .count(db)
        .await?;
    Ok(100.0 * done as f64 / total as f64)
}

pub async fn project_stats<C: ConnectionTrait>(
    db: &C,
    project_id: i64,
) -> Result<ProjectStats, AppError> {
    let project = project::Entity::find_by_id(project_id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("project id {project_id}")))?;

    let rows: Vec<(String, Option<f64>, Option<f64>)> = task::Entity::find()
        .select_only()
        .column(task::Column::Status)
        .column(task::Column::EstimatedHours)
        .column(task::Column::ActualHours)
        .filter(task::Column::ProjectId.eq(project_id))
        .into_tuple()
        .all(db)
        .await?;
    let linked_goals = goal_project::Entity::find()
        .filter(goal_project::Column::ProjectId.eq(project_id))
        .count(db)
        .await?;

    let count = |status: TaskStatus| {
        rows.iter()
            .filter(|(value, _, _)| value.as_str() == status.as_str())
            .count() as u64
    };
    let total_tasks = rows.len() as u64;
    let completed_tasks = count(TaskStatus::Done);
    let completion = if total_tasks == 0 {
        0.0
    } else {
        100.0 * completed_tasks as f64 / total_tasks as f64
    };

    Ok(ProjectStats {
        project_id,
        project_name: project.name,
        total_tasks,
        completed_tasks,
        in_progress_tasks: count(TaskStatus::InProgress),
        todo_tasks: count(TaskStatus::Todo),
        blocked_tasks: count(TaskStatus::Blocked),
        completion_percentage: round1(completion),
        total_estimated_hours: rows.iter().filter_map(|(_, estimated, _)| *estimated).sum(),
        total_actual_hours: rows.iter().filter_map(|(_, _, actual)| *actual).sum(),
        linked_goals,
    })
}

/// Cycle time and effort variance of one task. A variance beyond ten percent either
/// way flags the estimate.
pub fn task_metrics(task: &task::Model) -> TaskMetrics {
    let cycle_time_hours = task.completed_at.map(|completed| {
        let seconds = (completed - task.created_at).num_seconds() as f64;
        (seconds / 3600.0 * 100.0).round() / 100.0
    });
    let effort_variance_percent = match (task.estimated_hours, task.actual_hours) {
        (Some(estimated), Some(actual)) if estimated > 0.0 && actual > 0.0 => {
            Some(round1((actual - estimated) / estimated * 100.0))
        }
        _ => None,
    };

    TaskMetrics {
        task_id: task.id,
        title: task.title.clone(),
        status: task.status.clone(),
        estimated_hours: task.estimated_hours,
        actual_hours: task.actual_hours,
        created_at: task.created_at,
        completed_at: task.completed_at,
        cycle_time_hours,
        effort_variance_percent,
        over_estimated: effort_variance_percent.map(|variance| variance < -10.0),
        under_estimated: effort_variance_percent.map(|variance| variance > 10.0),
    }
}

/// Progress of a goal, unrounded.
pub async fn goal_progress<C: ConnectionTrait>(db: &C, goal_id: i64) -> Result<f64, AppError> {
    let goal = goal::Entity::find_by_id(goal_id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("goal id {goal_id}")))?;
    goal_progress_for(db, &goal).await
}

/// Weighted mean of the linked projects' completion, or the goal's manual value when
/// it has no links. Weights are relative and need not sum to 1.
pub async fn goal_progress_for<C: ConnectionTrait>(
    db: &C,
    goal: &goal::Model,
) -> Result<f64, AppError> {
    let links = goal_project::Entity::find()
        .filter(goal_project::Column::GoalId.eq(goal.id))
        .order_by_asc(goal_project::Column::ProjectId)
        .all(db)
        .await?;
    if links.is_empty() {
        return Ok(goal.progress_percentage);
    }

    let total_weight: f64 = links.iter().map(|link| link.weight).sum();
    if total_weight <= 0.0 {
        return Ok(goal.progress_percentage);
    }

    let mut weighted = 0.0;
    for link in &links {
        weighted += completion_percentage(db, link.project_id).await? * link.weight;
    }
    Ok(weighted / total_weight)
}
