use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::model::{Disposition, GoalStatus, GoalType, Priority, ProjectStatus, TaskStatus};

#[derive(Parser, Debug)]
#[command(
    name = "goalpath",
    version,
    about = "Track projects, task trees and goal hierarchies with SQLite"
)]
pub struct Cli {
    #[arg(
        long,
        global = true,
        value_name = "PATH",
        env = "GOALPATH_DB",
        help = "SQLite database file (defaults to ~/.goalpath/goalpath.db)"
    )]
    pub db: Option<PathBuf>,
    #[arg(
        long,
        global = true,
        value_name = "LEVEL",
        env = "GOALPATH_LOG",
        help = "Log level written to stderr: trace|debug|info|warn|error|off"
    )]
    pub log_level: Option<String>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    #[command(subcommand)]
    Project(ProjectCommand),
    #[command(subcommand)]
    Task(TaskCommand),
    #[command(subcommand)]
    Goal(GoalCommand),
}

#[derive(Subcommand, Debug)]
pub enum ProjectCommand {
    Add(ProjectAdd),
    List(ProjectList),
    Show(ProjectShow),
    Completion(ProjectCompletion),
    Status(ProjectStatusSet),
    Dates(ProjectDatesArgs),
    Remove(ProjectRemove),
}

#[derive(Subcommand, Debug)]
pub enum TaskCommand {
    Add(TaskAdd),
    List(TaskList),
    Show(TaskShow),
    Metrics(TaskMetricsArgs),
    Status(TaskStatusSet),
    Hours(TaskHours),
    Move(TaskMove),
    #[command(name = "check-move")]
    CheckMove(CheckMove),
    Remove(TaskRemove),
    Ancestors(TaskTree),
    Descendants(TaskTree),
    Tree(TaskTree),
}

#[derive(Subcommand, Debug)]
pub enum GoalCommand {
    Add(GoalAdd),
    List(GoalList),
    Show(GoalShow),
    Progress(GoalShow),
    #[command(name = "set-progress")]
    SetProgress(GoalSetProgress),
    Status(GoalStatusSet),
    Move(GoalMove),
    #[command(name = "check-move")]
    CheckMove(CheckMove),
    Remove(GoalRemove),
    Link(GoalLink),
    Unlink(GoalUnlink),
    Ancestors(GoalTree),
    Descendants(GoalTree),
    Tree(GoalTree),
}

#[derive(Args, Debug)]
pub struct ProjectAdd {
    pub name: String,
    #[arg(long)]
    pub description: Option<String>,
    #[arg(long, value_enum, default_value = "medium")]
    pub priority: PriorityArg,
    #[arg(long, value_name = "YYYY-MM-DD")]
    pub start: Option<NaiveDate>,
    #[arg(long, value_name = "YYYY-MM-DD")]
    pub target_end: Option<NaiveDate>,
}

#[derive(Args, Debug)]
pub struct ProjectList {
    #[arg(long, value_enum)]
    pub status: Option<ProjectStatusArg>,
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct ProjectShow {
    pub id: i64,
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct ProjectCompletion {
    pub id: i64,
}

#[derive(Args, Debug)]
pub struct ProjectStatusSet {
    pub id: i64,
    #[arg(value_enum)]
    pub status: ProjectStatusArg,
}

#[derive(Args, Debug)]
pub struct ProjectDatesArgs {
    pub id: i64,
    #[arg(long, value_name = "YYYY-MM-DD", conflicts_with = "clear_start")]
    pub start: Option<NaiveDate>,
    #[arg(long, value_name = "YYYY-MM-DD", conflicts_with = "clear_target_end")]
    pub target_end: Option<NaiveDate>,
    #[arg(long, value_name = "YYYY-MM-DD", conflicts_with = "clear_actual_end")]
    pub actual_end: Option<NaiveDate>,
    #[arg(long)]
    pub clear_start: bool,
    #[arg(long)]
    pub clear_target_end: bool,
    #[arg(long)]
    pub clear_actual_end: bool,
}

#[derive(Args, Debug)]
pub struct ProjectRemove {
    pub id: i64,
}

#[derive(Args, Debug)]
pub struct TaskAdd {
    pub title: String,
    #[arg(long, required_unless_present = "parent")]
    pub project: Option<i64>,
    #[arg(long, help = "Parent task id; the project is inherited when --project is omitted")]
    pub parent: Option<i64>,
    #[arg(long, value_enum, default_value = "todo")]
    pub status: TaskStatusArg,
    #[arg(long, value_name = "HOURS")]
    pub estimate: Option<f64>,
}

#[derive(Args, Debug)]
pub struct TaskList {
    #[arg(long)]
    pub project: i64,
    #[arg(long, value_enum)]
    pub status: Option<TaskStatusArg>,
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct TaskShow {
    pub id: i64,
}

#[derive(Args, Debug)]
pub struct TaskMetricsArgs {
    pub id: i64,
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct TaskStatusSet {
    pub id: i64,
    #[arg(value_enum)]
    pub status: TaskStatusArg,
}

#[derive(Args, Debug)]
pub struct TaskHours {
    pub id: i64,
    #[arg(long, value_name = "HOURS")]
    pub estimate: Option<f64>,
    #[arg(long, value_name = "HOURS")]
    pub actual: Option<f64>,
}

#[derive(Args, Debug)]
pub struct TaskMove {
    pub id: i64,
    #[arg(long, conflicts_with = "root", required_unless_present = "root")]
    pub parent: Option<i64>,
    #[arg(long, help = "Detach the task to the top of its project")]
    pub root: bool,
}

#[derive(Args, Debug)]
pub struct CheckMove {
    pub id: i64,
    #[arg(help = "Candidate parent id")]
    pub parent: i64,
}

#[derive(Args, Debug)]
pub struct TaskRemove {
    pub id: i64,
    #[arg(long, value_enum, default_value = "reparent")]
    pub children: DispositionArg,
}

#[derive(Args, Debug)]
pub struct TaskTree {
    pub id: i64,
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct GoalAdd {
    pub title: String,
    #[arg(long)]
    pub description: Option<String>,
    #[arg(long)]
    pub parent: Option<i64>,
    #[arg(long = "type", value_enum, default_value = "short-term")]
    pub goal_type: GoalTypeArg,
    #[arg(long, value_name = "YYYY-MM-DD")]
    pub target: Option<NaiveDate>,
}

#[derive(Args, Debug)]
pub struct GoalList {
    #[arg(long, conflicts_with = "roots", help = "Only direct subgoals of this goal")]
    pub parent: Option<i64>,
    #[arg(long, help = "Only top-level goals")]
    pub roots: bool,
    #[arg(long = "type", value_enum)]
    pub goal_type: Option<GoalTypeArg>,
    #[arg(long, value_enum)]
    pub status: Option<GoalStatusArg>,
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct GoalShow {
    pub id: i64,
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct GoalSetProgress {
    pub id: i64,
    #[arg(help = "Manual progress between 0 and 100")]
    pub value: f64,
}

#[derive(Args, Debug)]
pub struct GoalStatusSet {
    pub id: i64,
    #[arg(value_enum)]
    pub status: GoalStatusArg,
}

#[derive(Args, Debug)]
pub struct GoalMove {
    pub id: i64,
    #[arg(long, conflicts_with = "root", required_unless_present = "root")]
    pub parent: Option<i64>,
    #[arg(long, help = "Detach the goal to the top level")]
    pub root: bool,
}

#[derive(Args, Debug)]
pub struct GoalRemove {
    pub id: i64,
    #[arg(long, value_enum, default_value = "reparent")]
    pub children: DispositionArg,
}

#[derive(Args, Debug)]
pub struct GoalLink {
    pub goal_id: i64,
    pub project_id: i64,
    #[arg(long, default_value_t = 1.0)]
    pub weight: f64,
}

#[derive(Args, Debug)]
pub struct GoalUnlink {
    pub goal_id: i64,
    pub project_id: i64,
}

#[derive(Args, Debug)]
pub struct GoalTree {
    pub id: i64,
    #[arg(long)]
    pub json: bool,
}

#[derive(ValueEnum, Clone, Debug)]
pub enum PriorityArg {
    Low,
    Medium,
    High,
    Critical,
}

impl From<PriorityArg> for Priority {
    fn from(value: PriorityArg) -> Self {
        match value {
            PriorityArg::Low => Priority::Low,
            PriorityArg::Medium => Priority::Medium,
            PriorityArg::High => Priority::High,
            PriorityArg::Critical => Priority::Critical,
        }
    }
}

#[derive(ValueEnum, Clone, Debug)]
#[value(rename_all = "snake_case")]
pub enum TaskStatusArg {
    Backlog,
    Todo,
    InProgress,
    InReview,
    Done,
    Blocked,
    Cancelled,
}

impl From<TaskStatusArg> for TaskStatus {
    fn from(value: TaskStatusArg) -> Self {
        match value {
            TaskStatusArg::Backlog => TaskStatus::Backlog,
            TaskStatusArg::Todo => TaskStatus::Todo,
            TaskStatusArg::InProgress => TaskStatus::InProgress,
            TaskStatusArg::InReview => TaskStatus::InReview,
            TaskStatusArg::Done => TaskStatus::Done,
            TaskStatusArg::Blocked => TaskStatus::Blocked,
            TaskStatusArg::Cancelled => TaskStatus::Cancelled,
        }
    }
}

#[derive(ValueEnum, Clone, Debug)]
pub enum ProjectStatusArg {
    Active,
    Paused,
    Completed,
    Archived,
}

impl From<ProjectStatusArg> for ProjectStatus {
    fn from(value: ProjectStatusArg) -> Self {
        match value {
            ProjectStatusArg::Active => ProjectStatus::Active,
            ProjectStatusArg::Paused => ProjectStatus::Paused,
            ProjectStatusArg::Completed => ProjectStatus::Completed,
            ProjectStatusArg::Archived => ProjectStatus::Archived,
        }
    }
}

#[derive(ValueEnum, Clone, Debug)]
pub enum GoalStatusArg {
    Active,
    Paused,
    Completed,
    Cancelled,
}

impl From<GoalStatusArg> for GoalStatus {
    fn from(value: GoalStatusArg) -> Self {
        match value {
            GoalStatusArg::Active => GoalStatus::Active,
            GoalStatusArg::Paused => GoalStatus::Paused,
            GoalStatusArg::Completed => GoalStatus::Completed,
            GoalStatusArg::Cancelled => GoalStatus::Cancelled,
        }
    }
}

#[derive(ValueEnum, Clone, Debug)]
pub enum GoalTypeArg {
    LongTerm,
    MediumTerm,
    ShortTerm,
    Milestone,
}

impl From<GoalTypeArg> for GoalType {
    fn from(value: GoalTypeArg) -> Self {
        match value {
            GoalTypeArg::LongTerm => GoalType::LongTerm,
            GoalTypeArg::MediumTerm => GoalType::MediumTerm,
            GoalTypeArg::ShortTerm => GoalType::ShortTerm,
            GoalTypeArg::Milestone => GoalType::Milestone,
        }
    }
}

#[derive(ValueEnum, Clone, Debug)]
pub enum DispositionArg {
    /// Delete the whole subtree.
    Cascade,
    /// Move direct children up to the deleted node's parent.
    Reparent,
}

impl From<DispositionArg> for Disposition {
    fn from(value: DispositionArg) -> Self {
        match value {
            DispositionArg::Cascade => Disposition::Cascade,
            DispositionArg::Reparent => Disposition::Reparent,
        }
    }
}
