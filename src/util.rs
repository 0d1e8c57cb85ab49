use chrono::{DateTime, NaiveDate, Utc};

use crate::entities::{project, task};
use crate::model::{
    GoalDetail, GoalHierarchy, GoalNode, GoalSummary, ProjectStats, ProjectSummary,
    TaskHierarchy, TaskMetrics, TaskNode, TaskSummary,
};

fn has_text(value: &Option<String>) -> bool {
    value
        .as_deref()
        .map(|text| !text.trim().is_empty())
        .unwrap_or(false)
}

pub fn format_datetime(dt: DateTime<Utc>) -> String {
    dt.format("%Y-%m-%d %H:%M").to_string()
}

fn format_date(date: Option<NaiveDate>) -> String {
    date.map(|date| date.to_string())
        .unwrap_or_else(|| "-".to_string())
}

pub fn format_project_detail(project: &project::Model, stats: &ProjectStats) -> String {
    let mut output = String::new();
    output.push_str(&format!("Project ID: {}\n", project.id));
    output.push_str(&format!("Name: {}\n", project.name));
    if has_text(&project.description) {
        output.push_str(&format!(
            "Description: {}\n",
            project.description.as_deref().unwrap_or("")
        ));
    }
    output.push_str(&format!("Status: {}\n", project.status));
    output.push_str(&format!("Priority: {}\n", project.priority));
    output.push_str(&format!(
        "Dates: start {} / target {} / actual {}\n",
        format_date(project.start_date),
        format_date(project.target_end_date),
        format_date(project.actual_end_date)
    ));
    output.push_str(&format!("Created: {}\n", format_datetime(project.created_at)));
    output.push('\n');
    output.push_str(&format!(
        "Tasks: {} total, {} done, {} in progress, {} todo, {} blocked\n",
        stats.total_tasks,
        stats.completed_tasks,
        stats.in_progress_tasks,
        stats.todo_tasks,
        stats.blocked_tasks
    ));
    output.push_str(&format!(
        "Hours: {} estimated, {} actual\n",
        stats.total_estimated_hours, stats.total_actual_hours
    ));
    output.push_str(&format!("Linked goals: {}\n", stats.linked_goals));
    output.push_str(&format!("Completion: {:.1}%", stats.completion_percentage));
    output
}

pub fn format_project_list(projects: &[ProjectSummary]) -> String {
    projects
        .iter()
        .map(|project| {
            format!(
                "[{}] {} (project id {}) {}/{} tasks {:.1}%",
                project.status,
                project.name,
                project.id,
                project.completed_tasks,
                project.total_tasks,
                project.completion_percentage
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn format_task_list(tasks: &[TaskSummary]) -> String {
    tasks
        .iter()
        .map(|task| {
            let parent = task
                .parent_task_id
                .map(|parent| format!(" parent {parent}"))
                .unwrap_or_default();
            format!("[{}] {} (task id {}{parent})", task.status, task.title, task.id)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn format_task_metrics(metrics: &TaskMetrics) -> String {
    let hours = |value: Option<f64>| {
        value
            .map(|hours| hours.to_string())
            .unwrap_or_else(|| "-".to_string())
    };
    let mut output = String::new();
    output.push_str(&format!("Task ID: {}\n", metrics.task_id));
    output.push_str(&format!("Title: {}\n", metrics.title));
    output.push_str(&format!("Status: {}\n", metrics.status));
    output.push_str(&format!(
        "Hours: {} estimated, {} actual\n",
        hours(metrics.estimated_hours),
        hours(metrics.actual_hours)
    ));
    match metrics.cycle_time_hours {
        Some(cycle) => output.push_str(&format!("Cycle time: {cycle:.2}h\n")),
        None => output.push_str("Cycle time: (not completed)\n"),
    }
    match metrics.effort_variance_percent {
        Some(variance) => {
            let verdict = if metrics.under_estimated == Some(true) {
                " (under-estimated)"
            } else if metrics.over_estimated == Some(true) {
                " (over-estimated)"
            } else {
                ""
            };
            output.push_str(&format!("Effort variance: {variance:+.1}%{verdict}"));
        }
        None => output.push_str("Effort variance: (needs estimated and actual hours)"),
    }
    output
}

pub fn format_goal_list(goals: &[GoalSummary]) -> String {
    goals
        .iter()
        .map(|goal| {
            let parent = goal
                .parent_goal_id
                .map(|parent| format!(" parent {parent}"))
                .unwrap_or_default();
            format!(
                "[{}] {} (goal id {}{parent}) {} {:.1}%",
                goal.goal_type, goal.title, goal.id, goal.status, goal.progress
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn format_task_detail(task: &task::Model) -> String {
    let mut output = String::new();
    output.push_str(&format!("Task ID: {}\n", task.id));
    output.push_str(&format!("Project ID: {}\n", task.project_id));
    match task.parent_task_id {
        Some(parent) => output.push_str(&format!("Parent task ID: {parent}\n")),
        None => output.push_str("Parent task ID: (root)\n"),
    }
    output.push_str(&format!("Title: {}\n", task.title));
    output.push_str(&format!("Status: {}\n", task.status));
    if let Some(hours) = task.estimated_hours {
        output.push_str(&format!("Estimated hours: {hours}\n"));
    }
    if let Some(hours) = task.actual_hours {
        output.push_str(&format!("Actual hours: {hours}\n"));
    }
    if let Some(completed) = task.completed_at {
        output.push_str(&format!("Completed: {}\n", format_datetime(completed)));
    }
    output.push_str(&format!("Created: {}\n", format_datetime(task.created_at)));
    output.push_str(&format!("Updated: {}", format_datetime(task.updated_at)));
    output
}

pub fn format_goal_detail(detail: &GoalDetail) -> String {
    let mut output = String::new();
    output.push_str(&format!("Goal ID: {}\n", detail.id));
    match detail.parent_goal_id {
        Some(parent) => output.push_str(&format!("Parent goal ID: {parent}\n")),
        None => output.push_str("Parent goal ID: (root)\n"),
    }
    output.push_str(&format!("Title: {}\n", detail.title));
    output.push_str(&format!("Type: {}\n", detail.goal_type));
    output.push_str(&format!("Status: {}\n", detail.status));
    output.push_str(&format!("Progress: {:.1}%\n", detail.progress));
    output.push_str(&format!("Subgoals: {}\n", detail.subgoal_count));
    output.push('\n');
    if detail.linked_projects.is_empty() {
        output.push_str(&format!(
            "Linked projects: (none, manual progress {:.1}%)",
            detail.manual_progress
        ));
        return output;
    }
    output.push_str("Linked projects:\n");
    for link in &detail.linked_projects {
        output.push_str(&format!(
            "- {} (project id {}) weight {} completion {:.1}%\n",
            link.name, link.project_id, link.weight, link.completion_percentage
        ));
    }
    output.trim_end().to_string()
}

pub fn format_goal_hierarchy(hierarchy: &GoalHierarchy) -> String {
    let mut output = String::new();
    for (depth, ancestor) in hierarchy.ancestors.iter().enumerate() {
        output.push_str(&format!(
            "{}^ [{}] {} (goal id {}) {:.1}%\n",
            "  ".repeat(depth),
            ancestor.goal_type,
            ancestor.title,
            ancestor.id,
            ancestor.progress
        ));
    }
    let goal = &hierarchy.goal;
    output.push_str(&format!(
        "{}* [{}] {} (goal id {}) {:.1}%\n",
        "  ".repeat(hierarchy.depth),
        goal.goal_type,
        goal.title,
        goal.id,
        goal.progress
    ));
    push_goal_nodes(&mut output, &hierarchy.descendants, hierarchy.depth);
    output.push_str(&format!(
        "Depth: {}, descendants: {}",
        hierarchy.depth, hierarchy.total_descendants
    ));
    output
}

pub fn format_goal_nodes(nodes: &[GoalNode]) -> String {
    let mut output = String::new();
    push_goal_nodes(&mut output, nodes, 0);
    output.trim_end().to_string()
}

fn push_goal_nodes(output: &mut String, nodes: &[GoalNode], base: usize) {
    for node in nodes {
        output.push_str(&format!(
            "{}- [{}] {} (goal id {}) {:.1}%\n",
            "  ".repeat(base + node.level as usize),
            node.goal_type,
            node.title,
            node.id,
            node.progress
        ));
        push_goal_nodes(output, &node.children, base);
    }
}

pub fn format_task_hierarchy(hierarchy: &TaskHierarchy) -> String {
    let mut output = String::new();
    for (depth, ancestor) in hierarchy.ancestors.iter().enumerate() {
        output.push_str(&format!(
            "{}^ [{}] {} (task id {})\n",
            "  ".repeat(depth),
            ancestor.status,
            ancestor.title,
            ancestor.id
        ));
    }
    let task = &hierarchy.task;
    output.push_str(&format!(
        "{}* [{}] {} (task id {})\n",
        "  ".repeat(hierarchy.depth),
        task.status,
        task.title,
        task.id
    ));
    push_task_nodes(&mut output, &hierarchy.descendants, hierarchy.depth);
    output.push_str(&format!(
        "Depth: {}, descendants: {}",
        hierarchy.depth, hierarchy.total_descendants
    ));
    output
}

pub fn format_task_nodes(nodes: &[TaskNode]) -> String {
    let mut output = String::new();
    push_task_nodes(&mut output, nodes, 0);
    output.trim_end().to_string()
}

fn push_task_nodes(output: &mut String, nodes: &[TaskNode], base: usize) {
    for node in nodes {
        output.push_str(&format!(
            "{}- [{}] {} (task id {})\n",
            "  ".repeat(base + node.level as usize),
            node.status,
            node.title,
            node.id
        ));
        push_task_nodes(output, &node.children, base);
    }
}
