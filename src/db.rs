use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::Instant;

use log::{debug, info};
use sea_orm::sea_query::Index;
use sea_orm::{ConnectionTrait, Database, DatabaseBackend, DatabaseConnection, Schema, Statement};
use url::Url;

use crate::entities::{goal, goal_project, project, task};
use crate::error::AppError;

pub const DB_FILE_NAME: &str = "goalpath.db";

pub fn resolve_data_dir(home: &Path) -> PathBuf {
    home.join(".goalpath")
}

pub fn resolve_db_path(home: &Path) -> PathBuf {
    resolve_data_dir(home).join(DB_FILE_NAME)
}

pub fn ensure_parent_dir(path: &Path) -> Result<(), AppError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

/// Exclusive lock file held for the whole command, so parent checks and the writes
/// that depend on them never interleave across processes.
pub fn open_lock(path: &Path) -> Result<fd_lock::RwLock<File>, AppError> {
    let lock_path = path.with_extension("lock");
    let file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .read(true)
        .write(true)
        .open(lock_path)?;
    Ok(fd_lock::RwLock::new(file))
}

pub async fn connect(path: &Path) -> Result<DatabaseConnection, AppError> {
    let started_at = Instant::now();
    let mut url = Url::from_file_path(path)
        .map_err(|_| AppError::Validation(format!("invalid sqlite path: {}", path.display())))?;
    url.set_query(Some("mode=rwc"));
    let sqlite_url = url.as_str().replacen("file://", "sqlite://", 1);
    let db = Database::connect(&sqlite_url).await?;
    info!(
        "event=db_open module=db status=ok path={} duration_ms={}",
        path.display(),
        started_at.elapsed().as_millis()
    );
    Ok(db)
}

pub async fn ensure_schema(db: &DatabaseConnection) -> Result<(), AppError> {
    db.execute(Statement::from_string(
        DatabaseBackend::Sqlite,
        "PRAGMA foreign_keys = ON;",
    ))
    .await?;

    let builder = db.get_database_backend();
    let schema = Schema::new(builder);

    let mut project_stmt = schema.create_table_from_entity(project::Entity);
    project_stmt.if_not_exists();
    db.execute(builder.build(&project_stmt)).await?;

    let mut task_stmt = schema.create_table_from_entity(task::Entity);
    task_stmt.if_not_exists();
    db.execute(builder.build(&task_stmt)).await?;

    let mut goal_stmt = schema.create_table_from_entity(goal::Entity);
    goal_stmt.if_not_exists();
    db.execute(builder.build(&goal_stmt)).await?;

    let mut link_stmt = schema.create_table_from_entity(goal_project::Entity);
    link_stmt.if_not_exists();
    db.execute(builder.build(&link_stmt)).await?;

    let mut task_project_index = Index::create()
        .name("idx_tasks_project")
        .table(task::Entity)
        .col(task::Column::ProjectId)
        .to_owned();
    task_project_index.if_not_exists();
    db.execute(builder.build(&task_project_index)).await?;

    let mut task_parent_index = Index::create()
        .name("idx_tasks_parent")
        .table(task::Entity)
        .col(task::Column::ParentTaskId)
        .to_owned();
    task_parent_index.if_not_exists();
    db.execute(builder.build(&task_parent_index)).await?;

    let mut goal_parent_index = Index::create()
        .name("idx_goals_parent")
        .table(goal::Entity)
        .col(goal::Column::ParentGoalId)
        .to_owned();
    goal_parent_index.if_not_exists();
    db.execute(builder.build(&goal_parent_index)).await?;

    let mut link_project_index = Index::create()
        .name("idx_goal_projects_project")
        .table(goal_project::Entity)
        .col(goal_project::Column::ProjectId)
        .to_owned();
    link_project_index.if_not_exists();
    db.execute(builder.build(&link_project_index)).await?;

    debug!("event=schema_ready module=db status=ok");
    Ok(())
}
