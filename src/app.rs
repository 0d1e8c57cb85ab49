use std::collections::HashMap;

use chrono::{NaiveDate, Utc};
use log::{info, warn};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DatabaseTransaction,
    EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};

use crate::entities::{goal, goal_project, project, task};
use crate::error::AppError;
use crate::hierarchy::{
    count_descendants, goal_ancestor_chain, goal_parent_map, goal_subtree, task_ancestor_chain,
    task_parent_map, task_subtree, would_create_cycle,
};
use crate::model::{
    Disposition, GoalDetail, GoalFilter, GoalHierarchy, GoalInput, GoalNode, GoalStatus,
    GoalSummary, LinkedProject, ProjectDates, ProjectInput, ProjectStats, ProjectStatus,
    ProjectSummary, TaskHierarchy, TaskInput, TaskMetrics, TaskNode, TaskStatus, TaskSummary,
};
use crate::progress::{self, round1};

pub const MIN_LINK_WEIGHT: f64 = 0.01;
pub const MAX_LINK_WEIGHT: f64 = 1.0;

pub struct App {
    db: DatabaseConnection,
}

/// Result of deleting a task or goal.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DeleteOutcome {
    /// Every removed id, the target first.
    pub deleted: Vec<i64>,
    /// Children moved up to `new_parent` (reparent disposition only).
    pub reparented: Vec<i64>,
    pub new_parent: Option<i64>,
}

impl App {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    // Projects

    pub async fn add_project(&self, input: ProjectInput) -> Result<project::Model, AppError> {
        ensure_non_empty("project name", &input.name)?;
        ensure_date_order(
            "target end date",
            input.start_date,
            input.target_end_date,
        )?;

        let txn = self.db.begin().await?;
        let result: Result<project::Model, AppError> = async {
            let name = input.name.trim().to_string();
            let existing = project::Entity::find()
                .filter(project::Column::Name.eq(name.as_str()))
                .count(&txn)
                .await?;
            if existing > 0 {
                return Err(AppError::Constraint(format!(
                    "project name '{name}' is already in use"
                )));
            }

            let now = Utc::now();
            let active = project::ActiveModel {
                name: Set(name),
                description: Set(input.description),
                status: Set(ProjectStatus::Active.as_str().to_string()),
                priority: Set(input.priority.as_str().to_string()),
                start_date: Set(input.start_date),
                target_end_date: Set(input.target_end_date),
                actual_end_date: Set(None),
                created_at: Set(now),
                updated_at: Set(now),
                ..Default::default()
            };
            let insert = project::Entity::insert(active).exec(&txn).await?;
            project::Entity::find_by_id(insert.last_insert_id)
                .one(&txn)
                .await?
                .ok_or_else(|| AppError::NotFound("project not found after insert".to_string()))
        }
        .await;

        let created = finalize_transaction(txn, result).await?;
        info!(
            "event=project_create module=app status=ok project_id={}",
            created.id
        );
        Ok(created)
    }

    pub async fn get_project(&self, id: i64) -> Result<project::Model, AppError> {
        find_project(&self.db, id).await
    }

    /// Applies the given date changes; see [`ProjectDates`] for keep versus clear.
    pub async fn update_project_dates(
        &self,
        id: i64,
        dates: ProjectDates,
    ) -> Result<project::Model, AppError> {
        let txn = self.db.begin().await?;
        let result: Result<project::Model, AppError> = async {
            let current = find_project(&txn, id).await?;
            let start = dates.start_date.unwrap_or(current.start_date);
            let target = dates.target_end_date.unwrap_or(current.target_end_date);
            let actual = dates.actual_end_date.unwrap_or(current.actual_end_date);
            ensure_date_order("target end date", start, target)?;
            ensure_date_order("actual end date", start, actual)?;

            let mut active: project::ActiveModel = current.into();
            active.start_date = Set(start);
            active.target_end_date = Set(target);
            active.actual_end_date = Set(actual);
            active.updated_at = Set(Utc::now());
            Ok(active.update(&txn).await?)
        }
        .await;

        finalize_transaction(txn, result).await
    }

    pub async fn update_project_status(
        &self,
        id: i64,
        status: ProjectStatus,
    ) -> Result<project::Model, AppError> {
        let current = find_project(&self.db, id).await?;
        let mut active: project::ActiveModel = current.into();
        active.status = Set(status.as_str().to_string());
        active.updated_at = Set(Utc::now());
        Ok(active.update(&self.db).await?)
    }

    /// Deletes a project together with its tasks and goal links. Returns the number of
    /// tasks removed.
    pub async fn delete_project(&self, id: i64) -> Result<u64, AppError> {
        let txn = self.db.begin().await?;
        let result: Result<u64, AppError> = async {
            find_project(&txn, id).await?;
            goal_project::Entity::delete_many()
                .filter(goal_project::Column::ProjectId.eq(id))
                .exec(&txn)
                .await?;
            let tasks = task::Entity::delete_many()
                .filter(task::Column::ProjectId.eq(id))
                .exec(&txn)
                .await?;
            project::Entity::delete_by_id(id).exec(&txn).await?;
            Ok(tasks.rows_affected)
        }
        .await;

        let removed = finalize_transaction(txn, result).await?;
        info!("event=project_delete module=app status=ok project_id={id} tasks_deleted={removed}");
        Ok(removed)
    }

    /// Every project with its task counts, most recently updated first.
    pub async fn list_projects(
        &self,
        status: Option<ProjectStatus>,
    ) -> Result<Vec<ProjectSummary>, AppError> {
        let mut query = project::Entity::find();
        if let Some(status) = status {
            query = query.filter(project::Column::Status.eq(status.as_str()));
        }
        let projects = query
            .order_by_desc(project::Column::UpdatedAt)
            .order_by_asc(project::Column::Id)
            .all(&self.db)
            .await?;

        let mut summaries = Vec::with_capacity(projects.len());
        for project in projects {
            let stats = progress::project_stats(&self.db, project.id).await?;
            summaries.push(ProjectSummary {
                id: project.id,
                name: project.name,
                status: project.status,
                priority: project.priority,
                total_tasks: stats.total_tasks,
                completed_tasks: stats.completed_tasks,
                completion_percentage: stats.completion_percentage,
            });
        }
        Ok(summaries)
    }

    pub async fn completion_percentage(&self, project_id: i64) -> Result<f64, AppError> {
        find_project(&self.db, project_id).await?;
        progress::completion_percentage(&self.db, project_id).await
    }

    pub async fn project_stats(&self, project_id: i64) -> Result<ProjectStats, AppError> {
        progress::project_stats(&self.db, project_id).await
    }

    // Tasks

    pub async fn add_task(&self, input: TaskInput) -> Result<task::Model, AppError> {
        ensure_non_empty("task title", &input.title)?;
        ensure_hours("estimated hours", input.estimated_hours)?;

        let txn = self.db.begin().await?;
        let result: Result<task::Model, AppError> = async {
            let parent = match input.parent_task_id {
                Some(parent_id) => Some(
                    find_task(&txn, parent_id)
                        .await
                        .map_err(missing_as(format!("parent task id {parent_id}")))?,
                ),
                None => None,
            };
            let project_id = match (input.project_id, parent.as_ref()) {
                (Some(project_id), Some(parent)) if parent.project_id != project_id => {
                    return Err(AppError::Validation(format!(
                        "parent task id {} belongs to project id {}, not project id {project_id}",
                        parent.id, parent.project_id
                    )));
                }
                (Some(project_id), _) => project_id,
                (None, Some(parent)) => parent.project_id,
                (None, None) => {
                    return Err(AppError::Validation(
                        "task needs a project id or a parent task id".to_string(),
                    ));
                }
            };
            find_project(&txn, project_id).await?;

            let now = Utc::now();
            let active = task::ActiveModel {
                project_id: Set(project_id),
                parent_task_id: Set(input.parent_task_id),
                title: Set(input.title.trim().to_string()),
                status: Set(input.status.as_str().to_string()),
                estimated_hours: Set(input.estimated_hours),
                actual_hours: Set(None),
                completed_at: Set((input.status == TaskStatus::Done).then_some(now)),
                created_at: Set(now),
                updated_at: Set(now),
                ..Default::default()
            };
            let insert = task::Entity::insert(active).exec(&txn).await?;
            find_task(&txn, insert.last_insert_id).await
        }
        .await;

        let created = finalize_transaction(txn, result).await?;
        info!(
            "event=task_create module=app status=ok task_id={} project_id={} parent_id={:?}",
            created.id, created.project_id, created.parent_task_id
        );
        Ok(created)
    }

    /// Tasks of one project in id order, optionally narrowed to a status.
    pub async fn list_tasks(
        &self,
        project_id: i64,
        status: Option<TaskStatus>,
    ) -> Result<Vec<TaskSummary>, AppError> {
        find_project(&self.db, project_id).await?;
        let mut query = task::Entity::find().filter(task::Column::ProjectId.eq(project_id));
        if let Some(status) = status {
            query = query.filter(task::Column::Status.eq(status.as_str()));
        }
        let tasks = query.order_by_asc(task::Column::Id).all(&self.db).await?;
        Ok(tasks.iter().map(task_summary).collect())
    }

    pub async fn task_metrics(&self, task_id: i64) -> Result<TaskMetrics, AppError> {
        let task = find_task(&self.db, task_id).await?;
        Ok(progress::task_metrics(&task))
    }

    pub async fn get_task(&self, id: i64) -> Result<task::Model, AppError> {
        find_task(&self.db, id).await
    }

    /// Changes a task's status. Entering `done` stamps `completed_at`; leaving it
    /// clears the stamp.
    pub async fn update_task_status(
        &self,
        id: i64,
        status: TaskStatus,
    ) -> Result<task::Model, AppError> {
        let txn = self.db.begin().await?;
        let result: Result<task::Model, AppError> = async {
            let current = find_task(&txn, id).await?;
            let was_done = current.status == TaskStatus::Done.as_str();
            let now = Utc::now();
            let completed_at = match (was_done, status == TaskStatus::Done) {
                (false, true) => Some(now),
                (true, true) => current.completed_at,
                (_, false) => None,
            };

            let mut active: task::ActiveModel = current.into();
            active.status = Set(status.as_str().to_string());
            active.completed_at = Set(completed_at);
            active.updated_at = Set(now);
            Ok(active.update(&txn).await?)
        }
        .await;

        finalize_transaction(txn, result).await
    }

    pub async fn update_task_hours(
        &self,
        id: i64,
        estimated_hours: Option<f64>,
        actual_hours: Option<f64>,
    ) -> Result<task::Model, AppError> {
        ensure_hours("estimated hours", estimated_hours)?;
        ensure_hours("actual hours", actual_hours)?;
        let current = find_task(&self.db, id).await?;
        let mut active: task::ActiveModel = current.into();
        if estimated_hours.is_some() {
            active.estimated_hours = Set(estimated_hours);
        }
        if actual_hours.is_some() {
            active.actual_hours = Set(actual_hours);
        }
        active.updated_at = Set(Utc::now());
        Ok(active.update(&self.db).await?)
    }

    pub async fn task_would_create_cycle(
        &self,
        task_id: i64,
        proposed_parent_id: i64,
    ) -> Result<bool, AppError> {
        let task = find_task(&self.db, task_id).await?;
        let parent = find_task(&self.db, proposed_parent_id)
            .await
            .map_err(missing_as(format!("parent task id {proposed_parent_id}")))?;
        ensure_same_project(&task, &parent)?;
        let parents = task_parent_map(&self.db, task.project_id).await?;
        Ok(would_create_cycle(&parents, task_id, proposed_parent_id))
    }

    /// Moves a task under `new_parent_id`, or to the project root when `None`.
    pub async fn reassign_task_parent(
        &self,
        task_id: i64,
        new_parent_id: Option<i64>,
    ) -> Result<task::Model, AppError> {
        let txn = self.db.begin().await?;
        let result: Result<task::Model, AppError> = async {
            let current = find_task(&txn, task_id).await?;
            if let Some(parent_id) = new_parent_id {
                if parent_id == task_id {
                    return Err(AppError::Validation(format!(
                        "task id {task_id} cannot be its own parent"
                    )));
                }
                let parent = find_task(&txn, parent_id)
                    .await
                    .map_err(missing_as(format!("parent task id {parent_id}")))?;
                ensure_same_project(&current, &parent)?;
                let parents = task_parent_map(&txn, current.project_id).await?;
                if would_create_cycle(&parents, task_id, parent_id) {
                    return Err(AppError::Validation(format!(
                        "moving task id {task_id} under task id {parent_id} would create cycle"
                    )));
                }
            }

            let mut active: task::ActiveModel = current.into();
            active.parent_task_id = Set(new_parent_id);
            active.updated_at = Set(Utc::now());
            Ok(active.update(&txn).await?)
        }
        .await;

        match finalize_transaction(txn, result).await {
            Ok(updated) => {
                info!(
                    "event=task_reparent module=app status=ok task_id={task_id} parent_id={new_parent_id:?}"
                );
                Ok(updated)
            }
            Err(err) => {
                warn!(
                    "event=task_reparent module=app status=rejected task_id={task_id} parent_id={new_parent_id:?} error_kind={}",
                    err.kind()
                );
                Err(err)
            }
        }
    }

    pub async fn delete_task(
        &self,
        task_id: i64,
        disposition: Disposition,
    ) -> Result<DeleteOutcome, AppError> {
        let txn = self.db.begin().await?;
        let result: Result<DeleteOutcome, AppError> = async {
            let target = find_task(&txn, task_id).await?;
            let now = Utc::now();
            let outcome = match disposition {
                Disposition::Cascade => {
                    let index = task_parent_map(&txn, target.project_id)
                        .await?
                        .children_index();
                    let mut deleted = vec![task_id];
                    deleted.extend(index.descendant_ids(task_id));
                    task::Entity::delete_many()
                        .filter(task::Column::Id.is_in(deleted.clone()))
                        .exec(&txn)
                        .await?;
                    DeleteOutcome {
                        deleted,
                        ..Default::default()
                    }
                }
                Disposition::Reparent => {
                    let children = child_task_ids(&txn, task_id).await?;
                    if !children.is_empty() {
                        task::Entity::update_many()
                            .col_expr(
                                task::Column::ParentTaskId,
                                Expr::value(target.parent_task_id),
                            )
                            .col_expr(task::Column::UpdatedAt, Expr::value(now))
                            .filter(task::Column::ParentTaskId.eq(task_id))
                            .exec(&txn)
                            .await?;
                    }
                    task::Entity::delete_by_id(task_id).exec(&txn).await?;
                    DeleteOutcome {
                        deleted: vec![task_id],
                        reparented: children,
                        new_parent: target.parent_task_id,
                    }
                }
            };
            Ok(outcome)
        }
        .await;

        let outcome = finalize_transaction(txn, result).await?;
        info!(
            "event=task_delete module=app status=ok task_id={task_id} disposition={} deleted={} reparented={}",
            disposition.as_str(),
            outcome.deleted.len(),
            outcome.reparented.len()
        );
        Ok(outcome)
    }

    pub async fn task_ancestors(&self, task_id: i64) -> Result<Vec<TaskSummary>, AppError> {
        let task = find_task(&self.db, task_id).await?;
        let chain = task_ancestor_chain(&self.db, &task).await?;
        Ok(chain.iter().map(task_summary).collect())
    }

    pub async fn task_descendants(&self, task_id: i64) -> Result<Vec<TaskNode>, AppError> {
        let task = find_task(&self.db, task_id).await?;
        self.task_descendants_of(&task).await
    }

    async fn task_descendants_of(&self, task: &task::Model) -> Result<Vec<TaskNode>, AppError> {
        let (index, rows) = task_subtree(&self.db, task).await?;
        Ok(index.build(task.id, |id, level, children| {
            let (title, status) = rows
                .get(&id)
                .map(|row| (row.title.clone(), row.status.clone()))
                .unwrap_or_default();
            TaskNode {
                id,
                title,
                status,
                level,
                subtask_count: children.len(),
                children,
            }
        }))
    }

    pub async fn task_hierarchy(&self, task_id: i64) -> Result<TaskHierarchy, AppError> {
        let task = find_task(&self.db, task_id).await?;
        let ancestors: Vec<TaskSummary> = task_ancestor_chain(&self.db, &task)
            .await?
            .iter()
            .map(task_summary)
            .collect();
        let descendants = self.task_descendants_of(&task).await?;
        Ok(TaskHierarchy {
            task: task_summary(&task),
            depth: ancestors.len(),
            total_descendants: count_descendants(&descendants),
            ancestors,
            descendants,
        })
    }

    // Goals

    pub async fn add_goal(&self, input: GoalInput) -> Result<goal::Model, AppError> {
        ensure_non_empty("goal title", &input.title)?;

        let txn = self.db.begin().await?;
        let result: Result<goal::Model, AppError> = async {
            if let Some(parent_id) = input.parent_goal_id {
                find_goal(&txn, parent_id)
                    .await
                    .map_err(missing_as(format!("parent goal id {parent_id}")))?;
            }
            let now = Utc::now();
            let active = goal::ActiveModel {
                parent_goal_id: Set(input.parent_goal_id),
                title: Set(input.title.trim().to_string()),
                description: Set(input.description),
                goal_type: Set(input.goal_type.as_str().to_string()),
                status: Set(GoalStatus::Active.as_str().to_string()),
                progress_percentage: Set(0.0),
                target_date: Set(input.target_date),
                created_at: Set(now),
                updated_at: Set(now),
                ..Default::default()
            };
            let insert = goal::Entity::insert(active).exec(&txn).await?;
            find_goal(&txn, insert.last_insert_id).await
        }
        .await;

        let created = finalize_transaction(txn, result).await?;
        info!(
            "event=goal_create module=app status=ok goal_id={} parent_id={:?}",
            created.id, created.parent_goal_id
        );
        Ok(created)
    }

    pub async fn get_goal(&self, id: i64) -> Result<goal::Model, AppError> {
        find_goal(&self.db, id).await
    }

    pub async fn list_goals(&self, filter: GoalFilter) -> Result<Vec<GoalSummary>, AppError> {
        let mut query = goal::Entity::find();
        if let Some(parent_id) = filter.parent_goal_id {
            query = query.filter(goal::Column::ParentGoalId.eq(parent_id));
        } else if filter.roots_only {
            query = query.filter(goal::Column::ParentGoalId.is_null());
        }
        if let Some(goal_type) = filter.goal_type {
            query = query.filter(goal::Column::GoalType.eq(goal_type.as_str()));
        }
        if let Some(status) = filter.status {
            query = query.filter(goal::Column::Status.eq(status.as_str()));
        }
        let goals = query.order_by_asc(goal::Column::Id).all(&self.db).await?;

        let mut summaries = Vec::with_capacity(goals.len());
        for goal in &goals {
            summaries.push(self.goal_summary(goal).await?);
        }
        Ok(summaries)
    }

    /// Unrounded goal progress, recomputed from current task states.
    pub async fn goal_progress(&self, goal_id: i64) -> Result<f64, AppError> {
        progress::goal_progress(&self.db, goal_id).await
    }

    pub async fn goal_detail(&self, goal_id: i64) -> Result<GoalDetail, AppError> {
        let goal = find_goal(&self.db, goal_id).await?;
        let progress = progress::goal_progress_for(&self.db, &goal).await?;
        let subgoal_count = goal::Entity::find()
            .filter(goal::Column::ParentGoalId.eq(goal_id))
            .count(&self.db)
            .await?;

        let links = goal_project::Entity::find()
            .filter(goal_project::Column::GoalId.eq(goal_id))
            .order_by_asc(goal_project::Column::ProjectId)
            .all(&self.db)
            .await?;
        let mut linked_projects = Vec::with_capacity(links.len());
        for link in links {
            let project = find_project(&self.db, link.project_id).await?;
            let completion = progress::completion_percentage(&self.db, link.project_id).await?;
            linked_projects.push(LinkedProject {
                project_id: link.project_id,
                name: project.name,
                weight: link.weight,
                completion_percentage: round1(completion),
            });
        }

        Ok(GoalDetail {
            id: goal.id,
            parent_goal_id: goal.parent_goal_id,
            title: goal.title,
            goal_type: goal.goal_type,
            status: goal.status,
            progress: round1(progress),
            manual_progress: goal.progress_percentage,
            subgoal_count,
            linked_projects,
        })
    }

    /// Stores the manual progress value used while the goal has no linked projects.
    pub async fn set_goal_progress(
        &self,
        goal_id: i64,
        value: f64,
    ) -> Result<goal::Model, AppError> {
        if !(0.0..=100.0).contains(&value) {
            return Err(AppError::Validation(format!(
                "goal progress must be between 0 and 100, got {value}"
            )));
        }
        let current = find_goal(&self.db, goal_id).await?;
        let mut active: goal::ActiveModel = current.into();
        active.progress_percentage = Set(value);
        active.updated_at = Set(Utc::now());
        Ok(active.update(&self.db).await?)
    }

    pub async fn update_goal_status(
        &self,
        goal_id: i64,
        status: GoalStatus,
    ) -> Result<goal::Model, AppError> {
        let current = find_goal(&self.db, goal_id).await?;
        let mut active: goal::ActiveModel = current.into();
        active.status = Set(status.as_str().to_string());
        active.updated_at = Set(Utc::now());
        Ok(active.update(&self.db).await?)
    }

    pub async fn goal_would_create_cycle(
        &self,
        goal_id: i64,
        proposed_parent_id: i64,
    ) -> Result<bool, AppError> {
        find_goal(&self.db, goal_id).await?;
        find_goal(&self.db, proposed_parent_id)
            .await
            .map_err(missing_as(format!("parent goal id {proposed_parent_id}")))?;
        let parents = goal_parent_map(&self.db).await?;
        Ok(would_create_cycle(&parents, goal_id, proposed_parent_id))
    }

    /// Moves a goal under `new_parent_id`, or to the top level when `None`.
    pub async fn reassign_goal_parent(
        &self,
        goal_id: i64,
        new_parent_id: Option<i64>,
    ) -> Result<goal::Model, AppError> {
        let txn = self.db.begin().await?;
        let result: Result<goal::Model, AppError> = async {
            let current = find_goal(&txn, goal_id).await?;
            if let Some(parent_id) = new_parent_id {
                if parent_id == goal_id {
                    return Err(AppError::Validation(format!(
                        "goal id {goal_id} cannot be its own parent"
                    )));
                }
                find_goal(&txn, parent_id)
                    .await
                    .map_err(missing_as(format!("parent goal id {parent_id}")))?;
                let parents = goal_parent_map(&txn).await?;
                if would_create_cycle(&parents, goal_id, parent_id) {
                    return Err(AppError::Validation(format!(
                        "moving goal id {goal_id} under goal id {parent_id} would create cycle"
                    )));
                }
            }

            let mut active: goal::ActiveModel = current.into();
            active.parent_goal_id = Set(new_parent_id);
            active.updated_at = Set(Utc::now());
            Ok(active.update(&txn).await?)
        }
        .await;

        match finalize_transaction(txn, result).await {
            Ok(updated) => {
                info!(
                    "event=goal_reparent module=app status=ok goal_id={goal_id} parent_id={new_parent_id:?}"
                );
                Ok(updated)
            }
            Err(err) => {
                warn!(
                    "event=goal_reparent module=app status=rejected goal_id={goal_id} parent_id={new_parent_id:?} error_kind={}",
                    err.kind()
                );
                Err(err)
            }
        }
    }

    pub async fn delete_goal(
        &self,
        goal_id: i64,
        disposition: Disposition,
    ) -> Result<DeleteOutcome, AppError> {
        let txn = self.db.begin().await?;
        let result: Result<DeleteOutcome, AppError> = async {
            let target = find_goal(&txn, goal_id).await?;
            let outcome = match disposition {
                Disposition::Cascade => {
                    let index = goal_parent_map(&txn).await?.children_index();
                    let mut deleted = vec![goal_id];
                    deleted.extend(index.descendant_ids(goal_id));
                    goal_project::Entity::delete_many()
                        .filter(goal_project::Column::GoalId.is_in(deleted.clone()))
                        .exec(&txn)
                        .await?;
                    goal::Entity::delete_many()
                        .filter(goal::Column::Id.is_in(deleted.clone()))
                        .exec(&txn)
                        .await?;
                    DeleteOutcome {
                        deleted,
                        ..Default::default()
                    }
                }
                Disposition::Reparent => {
                    let children = child_goal_ids(&txn, goal_id).await?;
                    if !children.is_empty() {
                        goal::Entity::update_many()
                            .col_expr(
                                goal::Column::ParentGoalId,
                                Expr::value(target.parent_goal_id),
                            )
                            .col_expr(goal::Column::UpdatedAt, Expr::value(Utc::now()))
                            .filter(goal::Column::ParentGoalId.eq(goal_id))
                            .exec(&txn)
                            .await?;
                    }
                    goal_project::Entity::delete_many()
                        .filter(goal_project::Column::GoalId.eq(goal_id))
                        .exec(&txn)
                        .await?;
                    goal::Entity::delete_by_id(goal_id).exec(&txn).await?;
                    DeleteOutcome {
                        deleted: vec![goal_id],
                        reparented: children,
                        new_parent: target.parent_goal_id,
                    }
                }
            };
            Ok(outcome)
        }
        .await;

        let outcome = finalize_transaction(txn, result).await?;
        info!(
            "event=goal_delete module=app status=ok goal_id={goal_id} disposition={} deleted={} reparented={}",
            disposition.as_str(),
            outcome.deleted.len(),
            outcome.reparented.len()
        );
        Ok(outcome)
    }

    pub async fn link_project(
        &self,
        goal_id: i64,
        project_id: i64,
        weight: f64,
    ) -> Result<goal_project::Model, AppError> {
        if !(MIN_LINK_WEIGHT..=MAX_LINK_WEIGHT).contains(&weight) {
            return Err(AppError::Validation(format!(
                "link weight must be between {MIN_LINK_WEIGHT} and {MAX_LINK_WEIGHT}, got {weight}"
            )));
        }

        let txn = self.db.begin().await?;
        let result: Result<goal_project::Model, AppError> = async {
            let goal = find_goal(&txn, goal_id).await?;
            let project = find_project(&txn, project_id).await?;
            let existing = goal_project::Entity::find_by_id((goal_id, project_id))
                .one(&txn)
                .await?;
            if existing.is_some() {
                return Err(AppError::Constraint(format!(
                    "project '{}' (id {project_id}) is already linked to goal '{}' (id {goal_id})",
                    project.name, goal.title
                )));
            }
            let active = goal_project::ActiveModel {
                goal_id: Set(goal_id),
                project_id: Set(project_id),
                weight: Set(weight),
            };
            Ok(active.insert(&txn).await?)
        }
        .await;

        let link = finalize_transaction(txn, result).await?;
        info!(
            "event=goal_link module=app status=ok goal_id={goal_id} project_id={project_id} weight={weight}"
        );
        Ok(link)
    }

    pub async fn unlink_project(&self, goal_id: i64, project_id: i64) -> Result<(), AppError> {
        let result = goal_project::Entity::delete_by_id((goal_id, project_id))
            .exec(&self.db)
            .await?;
        if result.rows_affected == 0 {
            return Err(AppError::NotFound(format!(
                "no link between goal id {goal_id} and project id {project_id}"
            )));
        }
        info!("event=goal_unlink module=app status=ok goal_id={goal_id} project_id={project_id}");
        Ok(())
    }

    pub async fn goal_ancestors(&self, goal_id: i64) -> Result<Vec<GoalSummary>, AppError> {
        let goal = find_goal(&self.db, goal_id).await?;
        self.goal_ancestors_of(&goal).await
    }

    async fn goal_ancestors_of(&self, goal: &goal::Model) -> Result<Vec<GoalSummary>, AppError> {
        let chain = goal_ancestor_chain(&self.db, goal).await?;
        let mut ancestors = Vec::with_capacity(chain.len());
        for ancestor in &chain {
            ancestors.push(self.goal_summary(ancestor).await?);
        }
        Ok(ancestors)
    }

    pub async fn goal_descendants(&self, goal_id: i64) -> Result<Vec<GoalNode>, AppError> {
        find_goal(&self.db, goal_id).await?;
        self.goal_descendants_of(goal_id).await
    }

    async fn goal_descendants_of(&self, goal_id: i64) -> Result<Vec<GoalNode>, AppError> {
        let (index, rows) = goal_subtree(&self.db, goal_id).await?;
        let mut progress_by_id = HashMap::with_capacity(rows.len());
        for (id, row) in &rows {
            let value = progress::goal_progress_for(&self.db, row).await?;
            progress_by_id.insert(*id, round1(value));
        }

        Ok(index.build(goal_id, |id, level, children| {
            let row = rows.get(&id);
            GoalNode {
                id,
                title: row.map(|row| row.title.clone()).unwrap_or_default(),
                goal_type: row.map(|row| row.goal_type.clone()).unwrap_or_default(),
                status: row.map(|row| row.status.clone()).unwrap_or_default(),
                progress: progress_by_id.get(&id).copied().unwrap_or_default(),
                level,
                children,
            }
        }))
    }

    pub async fn goal_hierarchy(&self, goal_id: i64) -> Result<GoalHierarchy, AppError> {
        let goal = find_goal(&self.db, goal_id).await?;
        let ancestors = self.goal_ancestors_of(&goal).await?;
        let descendants = self.goal_descendants_of(goal_id).await?;
        Ok(GoalHierarchy {
            goal: self.goal_summary(&goal).await?,
            depth: ancestors.len(),
            total_descendants: count_descendants(&descendants),
            ancestors,
            descendants,
        })
    }

    async fn goal_summary(&self, goal: &goal::Model) -> Result<GoalSummary, AppError> {
        let value = progress::goal_progress_for(&self.db, goal).await?;
        Ok(GoalSummary {
            id: goal.id,
            parent_goal_id: goal.parent_goal_id,
            title: goal.title.clone(),
            goal_type: goal.goal_type.clone(),
            status: goal.status.clone(),
            progress: round1(value),
        })
    }
}

async fn find_project<C: ConnectionTrait>(db: &C, id: i64) -> Result<project::Model, AppError> {
    project::Entity::find_by_id(id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("project id {id}")))
}

async fn find_task<C: ConnectionTrait>(db: &C, id: i64) -> Result<task::Model, AppError> {
    task::Entity::find_by_id(id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("task id {id}")))
}

async fn find_goal<C: ConnectionTrait>(db: &C, id: i64) -> Result<goal::Model, AppError> {
    goal::Entity::find_by_id(id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("goal id {id}")))
}

async fn child_task_ids<C: ConnectionTrait>(db: &C, parent_id: i64) -> Result<Vec<i64>, AppError> {
    Ok(task::Entity::find()
        .filter(task::Column::ParentTaskId.eq(parent_id))
        .order_by_asc(task::Column::Id)
        .all(db)
        .await?
        .into_iter()
        .map(|row| row.id)
        .collect())
}

async fn child_goal_ids<C: ConnectionTrait>(db: &C, parent_id: i64) -> Result<Vec<i64>, AppError> {
    Ok(goal::Entity::find()
        .filter(goal::Column::ParentGoalId.eq(parent_id))
        .order_by_asc(goal::Column::Id)
        .all(db)
        .await?
        .into_iter()
        .map(|row| row.id)
        .collect())
}

/// Rewords a not-found error, leaving other failures untouched.
fn missing_as(label: String) -> impl FnOnce(AppError) -> AppError {
    move |err| match err {
        AppError::NotFound(_) => AppError::NotFound(label),
        other => other,
    }
}

fn ensure_same_project(task: &task::Model, parent: &task::Model) -> Result<(), AppError> {
    if parent.project_id != task.project_id {
        return Err(AppError::Validation(format!(
            "parent task id {} belongs to project id {}, task id {} belongs to project id {}",
            parent.id, parent.project_id, task.id, task.project_id
        )));
    }
    Ok(())
}

fn task_summary(task: &task::Model) -> TaskSummary {
    TaskSummary {
        id: task.id,
        project_id: task.project_id,
        parent_task_id: task.parent_task_id,
        title: task.title.clone(),
        status: task.status.clone(),
        estimated_hours: task.estimated_hours,
        actual_hours: task.actual_hours,
    }
}

async fn finalize_transaction<T>(
    txn: DatabaseTransaction,
    result: Result<T, AppError>,
) -> Result<T, AppError> {
    match result {
        Ok(value) => {
            txn.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = txn.rollback().await {
                return Err(rollback_err.into());
            }
            Err(err)
        }
    }
}

fn ensure_non_empty(label: &str, value: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::Validation(format!("{label} cannot be empty")));
    }
    Ok(())
}

fn ensure_hours(label: &str, value: Option<f64>) -> Result<(), AppError> {
    match value {
        Some(hours) if hours.is_nan() || hours < 0.0 => Err(AppError::Validation(format!(
            "{label} must be zero or more, got {hours}"
        ))),
        _ => Ok(()),
    }
}

fn ensure_date_order(
    label: &str,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
) -> Result<(), AppError> {
    if let (Some(start), Some(end)) = (start, end) {
        if end < start {
            return Err(AppError::Validation(format!(
                "{label} {end} is before start date {start}"
            )));
        }
    }
    Ok(())
}
