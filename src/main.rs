mod app;
mod cli;
mod db;
mod entities;
mod error;
mod hierarchy;
mod logging;
mod model;
mod progress;
mod util;

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::Parser;
use log::debug;
use serde::Serialize;

use crate::app::{App, DeleteOutcome};
use crate::cli::{
    CheckMove, Cli, Command, GoalAdd, GoalCommand, GoalLink, GoalList, GoalMove, GoalRemove,
    GoalSetProgress, GoalShow, GoalStatusSet, GoalTree, GoalUnlink, ProjectAdd, ProjectCommand,
    ProjectCompletion, ProjectDatesArgs, ProjectList, ProjectRemove, ProjectShow,
    ProjectStatusSet, TaskAdd, TaskCommand, TaskHours, TaskList, TaskMetricsArgs, TaskMove,
    TaskRemove, TaskShow, TaskStatusSet, TaskTree,
};
use crate::error::AppError;
use crate::model::{GoalFilter, GoalInput, ProjectDates, ProjectInput, TaskInput};
use crate::progress::round1;
use crate::util::{
    format_goal_detail, format_goal_hierarchy, format_goal_list, format_goal_nodes,
    format_project_detail, format_project_list, format_task_detail, format_task_hierarchy,
    format_task_list, format_task_metrics, format_task_nodes,
};

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), AppError> {
    let Cli {
        db: db_flag,
        log_level,
        command,
    } = Cli::parse();
    let _logger = logging::init_logging(log_level.as_deref())?;

    let db_path = resolve_db_path(db_flag)?;
    db::ensure_parent_dir(&db_path)?;
    let mut lock = db::open_lock(&db_path)?;
    let _guard = lock.write()?;

    let db = db::connect(&db_path).await?;
    db::ensure_schema(&db).await?;
    let app = App::new(db);
    debug!("event=command_start module=main db={}", db_path.display());

    match command {
        Command::Project(command) => handle_project(&app, command).await,
        Command::Task(command) => handle_task(&app, command).await,
        Command::Goal(command) => handle_goal(&app, command).await,
    }
}

fn resolve_db_path(flag: Option<PathBuf>) -> Result<PathBuf, AppError> {
    if let Some(path) = flag {
        return Ok(path);
    }
    match std::env::var_os("HOME") {
        Some(home) => Ok(db::resolve_db_path(&PathBuf::from(home))),
        None => Err(AppError::Validation(
            "unable to resolve database path; pass --db or set GOALPATH_DB".to_string(),
        )),
    }
}

async fn handle_project(app: &App, command: ProjectCommand) -> Result<(), AppError> {
    match command {
        ProjectCommand::Add(args) => handle_project_add(app, args).await,
        ProjectCommand::List(args) => handle_project_list(app, args).await,
        ProjectCommand::Show(args) => handle_project_show(app, args).await,
        ProjectCommand::Completion(args) => handle_project_completion(app, args).await,
        ProjectCommand::Status(args) => handle_project_status(app, args).await,
        ProjectCommand::Dates(args) => handle_project_dates(app, args).await,
        ProjectCommand::Remove(args) => handle_project_remove(app, args).await,
    }
}

async fn handle_task(app: &App, command: TaskCommand) -> Result<(), AppError> {
    match command {
        TaskCommand::Add(args) => handle_task_add(app, args).await,
        TaskCommand::List(args) => handle_task_list(app, args).await,
        TaskCommand::Show(args) => handle_task_show(app, args).await,
        TaskCommand::Metrics(args) => handle_task_metrics(app, args).await,
        TaskCommand::Status(args) => handle_task_status(app, args).await,
        TaskCommand::Hours(args) => handle_task_hours(app, args).await,
        TaskCommand::Move(args) => handle_task_move(app, args).await,
        TaskCommand::CheckMove(args) => handle_task_check_move(app, args).await,
        TaskCommand::Remove(args) => handle_task_remove(app, args).await,
        TaskCommand::Ancestors(args) => handle_task_ancestors(app, args).await,
        TaskCommand::Descendants(args) => handle_task_descendants(app, args).await,
        TaskCommand::Tree(args) => handle_task_tree(app, args).await,
    }
}

async fn handle_goal(app: &App, command: GoalCommand) -> Result<(), AppError> {
    match command {
        GoalCommand::Add(args) => handle_goal_add(app, args).await,
        GoalCommand::List(args) => handle_goal_list(app, args).await,
        GoalCommand::Show(args) => handle_goal_show(app, args).await,
        GoalCommand::Progress(args) => handle_goal_progress(app, args).await,
        GoalCommand::SetProgress(args) => handle_goal_set_progress(app, args).await,
        GoalCommand::Status(args) => handle_goal_status(app, args).await,
        GoalCommand::Move(args) => handle_goal_move(app, args).await,
        GoalCommand::CheckMove(args) => handle_goal_check_move(app, args).await,
        GoalCommand::Remove(args) => handle_goal_remove(app, args).await,
        GoalCommand::Link(args) => handle_goal_link(app, args).await,
        GoalCommand::Unlink(args) => handle_goal_unlink(app, args).await,
        GoalCommand::Ancestors(args) => handle_goal_ancestors(app, args).await,
        GoalCommand::Descendants(args) => handle_goal_descendants(app, args).await,
        GoalCommand::Tree(args) => handle_goal_tree(app, args).await,
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), AppError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_cycle_check(kind: &str, args: &CheckMove, cycle: bool) {
    if cycle {
        println!(
            "Moving {kind} ID: {} under {kind} ID: {} would create cycle.",
            args.id, args.parent
        );
    } else {
        println!(
            "{} ID: {} under {kind} ID: {} would not create a cycle.",
            capitalize(kind),
            args.id,
            args.parent
        );
    }
}

/// `--clear-*` wins over keeping the stored date; clap rejects passing both.
fn date_change(value: Option<NaiveDate>, clear: bool) -> Option<Option<NaiveDate>> {
    if clear {
        Some(None)
    } else {
        value.map(Some)
    }
}

fn capitalize(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn print_delete_outcome(kind: &str, outcome: &DeleteOutcome) {
    if outcome.deleted.len() > 1 {
        println!(
            "Removed {kind} ID: {} and {} descendant(s).",
            outcome.deleted[0],
            outcome.deleted.len() - 1
        );
        return;
    }
    let Some(id) = outcome.deleted.first() else {
        return;
    };
    println!("Removed {kind} ID: {id}.");
    if !outcome.reparented.is_empty() {
        let target = outcome
            .new_parent
            .map(|parent| format!("{kind} ID: {parent}"))
            .unwrap_or_else(|| "the root".to_string());
        println!(
            "Moved {} child {kind}(s) to {target}.",
            outcome.reparented.len()
        );
    }
}

async fn handle_project_add(app: &App, args: ProjectAdd) -> Result<(), AppError> {
    let project = app
        .add_project(ProjectInput {
            name: args.name,
            description: args.description,
            priority: args.priority.into(),
            start_date: args.start,
            target_end_date: args.target_end,
        })
        .await?;
    println!("Created project ID: {}: {}", project.id, project.name);
    Ok(())
}

async fn handle_project_list(app: &App, args: ProjectList) -> Result<(), AppError> {
    let projects = app.list_projects(args.status.map(Into::into)).await?;
    if args.json {
        return print_json(&projects);
    }
    if projects.is_empty() {
        println!("No projects found.");
        return Ok(());
    }
    println!("{}", format_project_list(&projects));
    Ok(())
}

async fn handle_project_show(app: &App, args: ProjectShow) -> Result<(), AppError> {
    let project = app.get_project(args.id).await?;
    let stats = app.project_stats(args.id).await?;
    if args.json {
        return print_json(&stats);
    }
    println!("{}", format_project_detail(&project, &stats));
    Ok(())
}

async fn handle_project_completion(app: &App, args: ProjectCompletion) -> Result<(), AppError> {
    let completion = app.completion_percentage(args.id).await?;
    println!("Project ID: {} is {:.1}% complete.", args.id, round1(completion));
    Ok(())
}

async fn handle_project_status(app: &App, args: ProjectStatusSet) -> Result<(), AppError> {
    let project = app.update_project_status(args.id, args.status.into()).await?;
    println!("Project ID: {} is now {}.", project.id, project.status);
    Ok(())
}

async fn handle_project_dates(app: &App, args: ProjectDatesArgs) -> Result<(), AppError> {
    let project = app
        .update_project_dates(
            args.id,
            ProjectDates {
                start_date: date_change(args.start, args.clear_start),
                target_end_date: date_change(args.target_end, args.clear_target_end),
                actual_end_date: date_change(args.actual_end, args.clear_actual_end),
            },
        )
        .await?;
    println!("Updated project ID: {}: {}", project.id, project.name);
    Ok(())
}

async fn handle_project_remove(app: &App, args: ProjectRemove) -> Result<(), AppError> {
    let removed = app.delete_project(args.id).await?;
    println!("Removed project ID: {} and {removed} task(s).", args.id);
    Ok(())
}

async fn handle_task_add(app: &App, args: TaskAdd) -> Result<(), AppError> {
    let task = app
        .add_task(TaskInput {
            title: args.title,
            project_id: args.project,
            parent_task_id: args.parent,
            status: args.status.into(),
            estimated_hours: args.estimate,
        })
        .await?;
    match task.parent_task_id {
        Some(parent) => println!(
            "Created task ID: {} under task ID: {parent} (project ID: {})",
            task.id, task.project_id
        ),
        None => println!(
            "Created task ID: {} (project ID: {})",
            task.id, task.project_id
        ),
    }
    Ok(())
}

async fn handle_task_list(app: &App, args: TaskList) -> Result<(), AppError> {
    let tasks = app
        .list_tasks(args.project, args.status.map(Into::into))
        .await?;
    if args.json {
        return print_json(&tasks);
    }
    if tasks.is_empty() {
        println!("No tasks found in project ID: {}.", args.project);
        return Ok(());
    }
    println!("{}", format_task_list(&tasks));
    Ok(())
}

async fn handle_task_show(app: &App, args: TaskShow) -> Result<(), AppError> {
    let task = app.get_task(args.id).await?;
    println!("{}", format_task_detail(&task));
    Ok(())
}

async fn handle_task_metrics(app: &App, args: TaskMetricsArgs) -> Result<(), AppError> {
    let metrics = app.task_metrics(args.id).await?;
    if args.json {
        return print_json(&metrics);
    }
    println!("{}", format_task_metrics(&metrics));
    Ok(())
}

async fn handle_task_status(app: &App, args: TaskStatusSet) -> Result<(), AppError> {
    let task = app.update_task_status(args.id, args.status.into()).await?;
    println!("Task ID: {} is now {}.", task.id, task.status);
    Ok(())
}

async fn handle_task_hours(app: &App, args: TaskHours) -> Result<(), AppError> {
    let task = app
        .update_task_hours(args.id, args.estimate, args.actual)
        .await?;
    println!("Updated task ID: {}.", task.id);
    Ok(())
}

async fn handle_task_move(app: &App, args: TaskMove) -> Result<(), AppError> {
    let parent = if args.root { None } else { args.parent };
    let task = app.reassign_task_parent(args.id, parent).await?;
    match task.parent_task_id {
        Some(parent) => println!("Moved task ID: {} under task ID: {parent}.", task.id),
        None => println!("Moved task ID: {} to the root.", task.id),
    }
    Ok(())
}

async fn handle_task_check_move(app: &App, args: CheckMove) -> Result<(), AppError> {
    let cycle = app.task_would_create_cycle(args.id, args.parent).await?;
    print_cycle_check("task", &args, cycle);
    Ok(())
}

async fn handle_task_ancestors(app: &App, args: TaskTree) -> Result<(), AppError> {
    let ancestors = app.task_ancestors(args.id).await?;
    if args.json {
        return print_json(&ancestors);
    }
    if ancestors.is_empty() {
        println!("Task ID: {} is a root task.", args.id);
        return Ok(());
    }
    for ancestor in &ancestors {
        println!("[{}] {} (task id {})", ancestor.status, ancestor.title, ancestor.id);
    }
    Ok(())
}

async fn handle_task_descendants(app: &App, args: TaskTree) -> Result<(), AppError> {
    let descendants = app.task_descendants(args.id).await?;
    if args.json {
        return print_json(&descendants);
    }
    if descendants.is_empty() {
        println!("Task ID: {} has no subtasks.", args.id);
        return Ok(());
    }
    println!("{}", format_task_nodes(&descendants));
    Ok(())
}

async fn handle_task_remove(app: &App, args: TaskRemove) -> Result<(), AppError> {
    let outcome = app.delete_task(args.id, args.children.into()).await?;
    print_delete_outcome("task", &outcome);
    Ok(())
}

async fn handle_task_tree(app: &App, args: TaskTree) -> Result<(), AppError> {
    let hierarchy = app.task_hierarchy(args.id).await?;
    if args.json {
        return print_json(&hierarchy);
    }
    println!("{}", format_task_hierarchy(&hierarchy));
    Ok(())
}

async fn handle_goal_add(app: &App, args: GoalAdd) -> Result<(), AppError> {
    let goal = app
        .add_goal(GoalInput {
            title: args.title,
            description: args.description,
            parent_goal_id: args.parent,
            goal_type: args.goal_type.into(),
            target_date: args.target,
        })
        .await?;
    println!("Created goal ID: {}: {}", goal.id, goal.title);
    Ok(())
}

async fn handle_goal_list(app: &App, args: GoalList) -> Result<(), AppError> {
    let goals = app
        .list_goals(GoalFilter {
            parent_goal_id: args.parent,
            roots_only: args.roots,
            goal_type: args.goal_type.map(Into::into),
            status: args.status.map(Into::into),
        })
        .await?;
    if args.json {
        return print_json(&goals);
    }
    if goals.is_empty() {
        println!("No goals found.");
        return Ok(());
    }
    println!("{}", format_goal_list(&goals));
    Ok(())
}

async fn handle_goal_show(app: &App, args: GoalShow) -> Result<(), AppError> {
    let detail = app.goal_detail(args.id).await?;
    if args.json {
        return print_json(&detail);
    }
    println!("{}", format_goal_detail(&detail));
    Ok(())
}

async fn handle_goal_progress(app: &App, args: GoalShow) -> Result<(), AppError> {
    let goal = app.get_goal(args.id).await?;
    let progress = app.goal_progress(goal.id).await?;
    if args.json {
        return print_json(&serde_json::json!({
            "goal_id": goal.id,
            "title": goal.title,
            "progress": progress,
        }));
    }
    println!("Goal ID: {} progress: {:.1}%", goal.id, round1(progress));
    Ok(())
}

async fn handle_goal_set_progress(app: &App, args: GoalSetProgress) -> Result<(), AppError> {
    let goal = app.set_goal_progress(args.id, args.value).await?;
    let effective = app.goal_progress(goal.id).await?;
    println!(
        "Goal ID: {} manual progress set to {:.1}% (effective {:.1}%).",
        goal.id,
        goal.progress_percentage,
        round1(effective)
    );
    Ok(())
}

async fn handle_goal_status(app: &App, args: GoalStatusSet) -> Result<(), AppError> {
    let goal = app.update_goal_status(args.id, args.status.into()).await?;
    println!("Goal ID: {} is now {}.", goal.id, goal.status);
    Ok(())
}

async fn handle_goal_move(app: &App, args: GoalMove) -> Result<(), AppError> {
    let parent = if args.root { None } else { args.parent };
    let goal = app.reassign_goal_parent(args.id, parent).await?;
    match goal.parent_goal_id {
        Some(parent) => println!("Moved goal ID: {} under goal ID: {parent}.", goal.id),
        None => println!("Moved goal ID: {} to the root.", goal.id),
    }
    Ok(())
}

async fn handle_goal_check_move(app: &App, args: CheckMove) -> Result<(), AppError> {
    let cycle = app.goal_would_create_cycle(args.id, args.parent).await?;
    print_cycle_check("goal", &args, cycle);
    Ok(())
}

async fn handle_goal_remove(app: &App, args: GoalRemove) -> Result<(), AppError> {
    let outcome = app.delete_goal(args.id, args.children.into()).await?;
    print_delete_outcome("goal", &outcome);
    Ok(())
}

async fn handle_goal_link(app: &App, args: GoalLink) -> Result<(), AppError> {
    let link = app
        .link_project(args.goal_id, args.project_id, args.weight)
        .await?;
    println!(
        "Linked project ID: {} to goal ID: {} with weight {}.",
        link.project_id, link.goal_id, link.weight
    );
    Ok(())
}

async fn handle_goal_unlink(app: &App, args: GoalUnlink) -> Result<(), AppError> {
    app.unlink_project(args.goal_id, args.project_id).await?;
    println!(
        "Unlinked project ID: {} from goal ID: {}.",
        args.project_id, args.goal_id
    );
    Ok(())
}

async fn handle_goal_ancestors(app: &App, args: GoalTree) -> Result<(), AppError> {
    let ancestors = app.goal_ancestors(args.id).await?;
    if args.json {
        return print_json(&ancestors);
    }
    if ancestors.is_empty() {
        println!("Goal ID: {} is a top-level goal.", args.id);
        return Ok(());
    }
    for ancestor in &ancestors {
        println!(
            "[{}] {} (goal id {}) {:.1}%",
            ancestor.goal_type, ancestor.title, ancestor.id, ancestor.progress
        );
    }
    Ok(())
}

async fn handle_goal_descendants(app: &App, args: GoalTree) -> Result<(), AppError> {
    let descendants = app.goal_descendants(args.id).await?;
    if args.json {
        return print_json(&descendants);
    }
    if descendants.is_empty() {
        println!("Goal ID: {} has no subgoals.", args.id);
        return Ok(());
    }
    println!("{}", format_goal_nodes(&descendants));
    Ok(())
}

async fn handle_goal_tree(app: &App, args: GoalTree) -> Result<(), AppError> {
    let hierarchy = app.goal_hierarchy(args.id).await?;
    if args.json {
        return print_json(&hierarchy);
    }
    println!("{}", format_goal_hierarchy(&hierarchy));
    Ok(())
}
