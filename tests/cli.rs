use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

use sea_orm::{ConnectionTrait, Database, DatabaseBackend, Statement};
use serde_json::Value;
use tempfile::TempDir;
use url::Url;

fn bin_path() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_goalpath"))
}

fn db_path(dir: &TempDir) -> PathBuf {
    dir.path().join("goalpath.db")
}

fn run_cmd(dir: &TempDir, args: &[&str]) -> Output {
    Command::new(bin_path())
        .arg("--db")
        .arg(db_path(dir))
        .args(args)
        .env_remove("GOALPATH_DB")
        .env_remove("GOALPATH_LOG")
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .expect("run command")
}

fn output_stdout(output: Output) -> String {
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8(output.stdout).expect("stdout utf8")
}

fn output_stderr(output: Output) -> String {
    assert!(!output.status.success(), "command unexpectedly succeeded");
    assert_eq!(output.status.code(), Some(1));
    String::from_utf8(output.stderr).expect("stderr utf8")
}

fn parse_created_id(stdout: &str, kind: &str) -> i64 {
    let prefix = format!("Created {kind} ID: ");
    let rest = stdout
        .trim()
        .strip_prefix(prefix.as_str())
        .unwrap_or_else(|| panic!("unexpected {kind} output: {stdout}"));
    let id_str = rest
        .split(|ch: char| ch == ':' || ch.is_whitespace())
        .next()
        .expect("id");
    id_str.parse().expect("id parse")
}

fn create_project(dir: &TempDir, name: &str) -> i64 {
    let stdout = output_stdout(run_cmd(dir, &["project", "add", name]));
    parse_created_id(&stdout, "project")
}

fn add_task(dir: &TempDir, project_id: i64, parent: Option<i64>, status: &str) -> i64 {
    let project = project_id.to_string();
    let parent = parent.map(|id| id.to_string());
    let mut args = vec!["task", "add", "Task", "--project", project.as_str()];
    if let Some(parent) = parent.as_deref() {
        args.extend(["--parent", parent]);
    }
    args.extend(["--status", status]);
    let stdout = output_stdout(run_cmd(dir, &args));
    parse_created_id(&stdout, "task")
}

fn add_goal(dir: &TempDir, title: &str, parent: Option<i64>) -> i64 {
    let parent = parent.map(|id| id.to_string());
    let mut args = vec!["goal", "add", title];
    if let Some(parent) = parent.as_deref() {
        args.extend(["--parent", parent]);
    }
    let stdout = output_stdout(run_cmd(dir, &args));
    parse_created_id(&stdout, "goal")
}

fn json_output(dir: &TempDir, args: &[&str]) -> Value {
    let stdout = output_stdout(run_cmd(dir, args));
    serde_json::from_str(&stdout).expect("json output")
}

async fn execute_sql(path: &Path, sql: &str) {
    let mut url = Url::from_file_path(path).expect("db url");
    url.set_query(Some("mode=rwc"));
    let sqlite_url = url.as_str().replacen("file://", "sqlite://", 1);
    let db = Database::connect(&sqlite_url).await.expect("connect");
    db.execute(Statement::from_string(DatabaseBackend::Sqlite, sql))
        .await
        .expect("execute sql");
}

#[test]
fn weighted_goal_progress_end_to_end() {
    let dir = TempDir::new().expect("temp dir");
    let alpha = create_project(&dir, "Alpha");
    let beta = create_project(&dir, "Beta");
    for idx in 0..5 {
        add_task(&dir, alpha, None, if idx < 3 { "done" } else { "todo" });
        add_task(&dir, beta, None, if idx < 1 { "done" } else { "in_progress" });
    }
    let goal = add_goal(&dir, "Launch", None);
    let goal_str = goal.to_string();
    output_stdout(run_cmd(
        &dir,
        &["goal", "link", &goal_str, &alpha.to_string(), "--weight", "0.6"],
    ));
    output_stdout(run_cmd(
        &dir,
        &["goal", "link", &goal_str, &beta.to_string(), "--weight", "0.4"],
    ));

    let stdout = output_stdout(run_cmd(&dir, &["goal", "progress", &goal_str]));
    assert_eq!(stdout.trim(), format!("Goal ID: {goal} progress: 44.0%"));

    let detail = json_output(&dir, &["goal", "show", &goal_str, "--json"]);
    assert_eq!(detail["progress"].as_f64(), Some(44.0));
    assert_eq!(detail["linked_projects"].as_array().map(Vec::len), Some(2));

    let stats = json_output(&dir, &["project", "show", &beta.to_string(), "--json"]);
    assert_eq!(stats["total_tasks"].as_u64(), Some(5));
    assert_eq!(stats["in_progress_tasks"].as_u64(), Some(4));
    assert_eq!(stats["completion_percentage"].as_f64(), Some(20.0));
}

#[test]
fn manual_progress_used_without_links() {
    let dir = TempDir::new().expect("temp dir");
    let goal = add_goal(&dir, "Read more", None).to_string();
    output_stdout(run_cmd(&dir, &["goal", "set-progress", &goal, "35"]));
    let stdout = output_stdout(run_cmd(&dir, &["goal", "progress", &goal]));
    assert!(stdout.contains("progress: 35.0%"), "stdout: {stdout}");
    let progress = json_output(&dir, &["goal", "progress", &goal, "--json"]);
    assert_eq!(progress["title"].as_str(), Some("Read more"));
    assert_eq!(progress["progress"].as_f64(), Some(35.0));

    let stderr = output_stderr(run_cmd(&dir, &["goal", "set-progress", &goal, "120"]));
    assert!(stderr.starts_with("Error: Invalid input:"), "stderr: {stderr}");
}

#[test]
fn empty_project_is_zero_percent_complete() {
    let dir = TempDir::new().expect("temp dir");
    let project = create_project(&dir, "Empty").to_string();
    let stdout = output_stdout(run_cmd(&dir, &["project", "completion", &project]));
    assert_eq!(stdout.trim(), format!("Project ID: {project} is 0.0% complete."));
}

#[test]
fn task_move_rejects_cycles_and_self_parent() {
    let dir = TempDir::new().expect("temp dir");
    let project = create_project(&dir, "Tree");
    let a = add_task(&dir, project, None, "todo");
    let b = add_task(&dir, project, Some(a), "todo");
    let c = add_task(&dir, project, Some(b), "todo");
    let (a_str, c_str) = (a.to_string(), c.to_string());

    let stdout = output_stdout(run_cmd(&dir, &["task", "check-move", &a_str, &c_str]));
    assert!(stdout.contains("would create cycle"), "stdout: {stdout}");
    let stdout = output_stdout(run_cmd(&dir, &["task", "check-move", &c_str, &a_str]));
    assert!(stdout.contains("would not create a cycle"), "stdout: {stdout}");

    let stderr = output_stderr(run_cmd(&dir, &["task", "move", &a_str, "--parent", &c_str]));
    assert!(stderr.contains("would create cycle"), "stderr: {stderr}");
    let stderr = output_stderr(run_cmd(&dir, &["task", "move", &c_str, "--parent", &c_str]));
    assert!(stderr.contains("own parent"), "stderr: {stderr}");

    let tree = json_output(&dir, &["task", "tree", &a_str, "--json"]);
    assert_eq!(tree["depth"].as_u64(), Some(0));
    assert_eq!(tree["total_descendants"].as_u64(), Some(2));

    output_stdout(run_cmd(&dir, &["task", "move", &c_str, "--root"]));
    let ancestors = json_output(&dir, &["task", "ancestors", &c_str, "--json"]);
    assert_eq!(ancestors.as_array().map(Vec::len), Some(0));
}

#[test]
fn task_remove_reparents_by_default() {
    let dir = TempDir::new().expect("temp dir");
    let project = create_project(&dir, "Tree");
    let p = add_task(&dir, project, None, "todo");
    let t = add_task(&dir, project, Some(p), "todo");
    let c1 = add_task(&dir, project, Some(t), "todo");
    let c2 = add_task(&dir, project, Some(t), "todo");

    let stdout = output_stdout(run_cmd(&dir, &["task", "remove", &t.to_string()]));
    assert!(stdout.contains(&format!("Removed task ID: {t}.")), "stdout: {stdout}");
    assert!(
        stdout.contains(&format!("Moved 2 child task(s) to task ID: {p}.")),
        "stdout: {stdout}"
    );

    let descendants = json_output(&dir, &["task", "descendants", &p.to_string(), "--json"]);
    let ids: Vec<i64> = descendants
        .as_array()
        .expect("array")
        .iter()
        .filter_map(|node| node["id"].as_i64())
        .collect();
    assert_eq!(ids, vec![c1, c2]);
}

#[test]
fn goal_remove_cascade_drops_subtree() {
    let dir = TempDir::new().expect("temp dir");
    let root = add_goal(&dir, "Root", None);
    let mid = add_goal(&dir, "Mid", Some(root));
    let leaf = add_goal(&dir, "Leaf", Some(mid));
    let project = create_project(&dir, "Linked");
    output_stdout(run_cmd(
        &dir,
        &["goal", "link", &leaf.to_string(), &project.to_string()],
    ));

    let stdout = output_stdout(run_cmd(
        &dir,
        &["goal", "remove", &mid.to_string(), "--children", "cascade"],
    ));
    assert!(
        stdout.contains(&format!("Removed goal ID: {mid} and 1 descendant(s).")),
        "stdout: {stdout}"
    );

    let stderr = output_stderr(run_cmd(&dir, &["goal", "show", &leaf.to_string()]));
    assert!(stderr.contains("Not found"), "stderr: {stderr}");
    let tree = json_output(&dir, &["goal", "tree", &root.to_string(), "--json"]);
    assert_eq!(tree["total_descendants"].as_u64(), Some(0));
}

#[test]
fn goal_tree_reports_ancestors_and_depth() {
    let dir = TempDir::new().expect("temp dir");
    let root = add_goal(&dir, "Root", None);
    let mid = add_goal(&dir, "Mid", Some(root));
    let leaf = add_goal(&dir, "Leaf", Some(mid));

    let tree = json_output(&dir, &["goal", "tree", &leaf.to_string(), "--json"]);
    assert_eq!(tree["depth"].as_u64(), Some(2));
    let ancestors: Vec<i64> = tree["ancestors"]
        .as_array()
        .expect("ancestors")
        .iter()
        .filter_map(|goal| goal["id"].as_i64())
        .collect();
    assert_eq!(ancestors, vec![root, mid]);

    let stdout = output_stdout(run_cmd(&dir, &["goal", "tree", &root.to_string()]));
    let lines: Vec<&str> = stdout.lines().collect();
    assert!(lines[0].starts_with("* [short_term] Root"), "stdout: {stdout}");
    assert!(lines[1].starts_with("  - [short_term] Mid"), "stdout: {stdout}");
    assert!(lines[2].starts_with("    - [short_term] Leaf"), "stdout: {stdout}");

    let stderr = output_stderr(run_cmd(
        &dir,
        &["goal", "move", &root.to_string(), "--parent", &leaf.to_string()],
    ));
    assert!(stderr.contains("would create cycle"), "stderr: {stderr}");
}

#[test]
fn duplicate_link_is_a_conflict() {
    let dir = TempDir::new().expect("temp dir");
    let goal = add_goal(&dir, "Goal", None).to_string();
    let project = create_project(&dir, "P").to_string();
    output_stdout(run_cmd(&dir, &["goal", "link", &goal, &project, "--weight", "0.5"]));
    let stderr = output_stderr(run_cmd(&dir, &["goal", "link", &goal, &project]));
    assert!(stderr.starts_with("Error: Conflict:"), "stderr: {stderr}");

    let stderr = output_stderr(run_cmd(
        &dir,
        &["goal", "link", &goal, &project, "--weight", "1.5"],
    ));
    assert!(stderr.contains("link weight"), "stderr: {stderr}");

    output_stdout(run_cmd(&dir, &["goal", "unlink", &goal, &project]));
    let stderr = output_stderr(run_cmd(&dir, &["goal", "unlink", &goal, &project]));
    assert!(stderr.contains("Not found"), "stderr: {stderr}");
}

#[test]
fn task_status_validation_and_completion_stamp() {
    let dir = TempDir::new().expect("temp dir");
    let project = create_project(&dir, "P");
    let task = add_task(&dir, project, None, "todo").to_string();

    let output = run_cmd(&dir, &["task", "status", &task, "finished"]);
    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8(output.stderr).expect("stderr utf8");
    assert!(stderr.contains("in_progress"), "stderr: {stderr}");

    output_stdout(run_cmd(&dir, &["task", "status", &task, "done"]));
    let stdout = output_stdout(run_cmd(&dir, &["task", "show", &task]));
    assert!(stdout.contains("Completed: "), "stdout: {stdout}");

    output_stdout(run_cmd(&dir, &["task", "status", &task, "in_review"]));
    let stdout = output_stdout(run_cmd(&dir, &["task", "show", &task]));
    assert!(!stdout.contains("Completed: "), "stdout: {stdout}");
}

#[test]
fn subtask_inherits_project_from_parent() {
    let dir = TempDir::new().expect("temp dir");
    let project = create_project(&dir, "P");
    let parent = add_task(&dir, project, None, "todo");
    let stdout = output_stdout(run_cmd(
        &dir,
        &["task", "add", "Child", "--parent", &parent.to_string()],
    ));
    assert!(
        stdout.contains(&format!("(project ID: {project})")),
        "stdout: {stdout}"
    );
}

#[test]
fn project_remove_cascades_tasks() {
    let dir = TempDir::new().expect("temp dir");
    let project = create_project(&dir, "Doomed");
    let parent = add_task(&dir, project, None, "todo");
    add_task(&dir, project, Some(parent), "done");

    let stdout = output_stdout(run_cmd(&dir, &["project", "remove", &project.to_string()]));
    assert!(stdout.contains("and 2 task(s)"), "stdout: {stdout}");
    let stderr = output_stderr(run_cmd(&dir, &["task", "show", &parent.to_string()]));
    assert!(stderr.contains(&format!("task id {parent}")), "stderr: {stderr}");
}

#[test]
fn looping_ancestor_chain_is_reported() {
    let dir = TempDir::new().expect("temp dir");
    let first = add_goal(&dir, "First", None);
    let second = add_goal(&dir, "Second", Some(first));

    let runtime = tokio::runtime::Runtime::new().expect("runtime");
    runtime.block_on(execute_sql(
        &db_path(&dir),
        &format!("UPDATE goals SET parent_goal_id = {second} WHERE id = {first}"),
    ));

    let stderr = output_stderr(run_cmd(&dir, &["goal", "ancestors", &second.to_string()]));
    assert!(stderr.contains("loops through"), "stderr: {stderr}");
}

#[test]
fn missing_entities_report_not_found() {
    let dir = TempDir::new().expect("temp dir");
    let stderr = output_stderr(run_cmd(&dir, &["project", "show", "42"]));
    assert_eq!(stderr.trim(), "Error: Not found: project id 42");
    let stderr = output_stderr(run_cmd(&dir, &["goal", "tree", "7"]));
    assert_eq!(stderr.trim(), "Error: Not found: goal id 7");
}

#[test]
fn check_move_resolves_candidate_parent() {
    let dir = TempDir::new().expect("temp dir");
    let first = create_project(&dir, "First");
    let second = create_project(&dir, "Second");
    let task = add_task(&dir, first, None, "todo").to_string();
    let foreign = add_task(&dir, second, None, "todo").to_string();

    let stderr = output_stderr(run_cmd(&dir, &["task", "check-move", &task, &foreign]));
    assert!(stderr.contains("belongs to project"), "stderr: {stderr}");
    let stderr = output_stderr(run_cmd(&dir, &["task", "move", &task, "--parent", &foreign]));
    assert!(stderr.contains("belongs to project"), "stderr: {stderr}");

    let stderr = output_stderr(run_cmd(&dir, &["task", "check-move", &task, "99"]));
    assert_eq!(stderr.trim(), "Error: Not found: parent task id 99");
    let goal = add_goal(&dir, "Goal", None).to_string();
    let stderr = output_stderr(run_cmd(&dir, &["goal", "check-move", &goal, "99"]));
    assert_eq!(stderr.trim(), "Error: Not found: parent goal id 99");
}

#[test]
fn zero_weight_links_fall_back_to_manual_progress() {
    let dir = TempDir::new().expect("temp dir");
    let project = create_project(&dir, "Done");
    add_task(&dir, project, None, "done");
    let goal = add_goal(&dir, "Read more", None);
    output_stdout(run_cmd(&dir, &["goal", "set-progress", &goal.to_string(), "35"]));

    let runtime = tokio::runtime::Runtime::new().expect("runtime");
    runtime.block_on(execute_sql(
        &db_path(&dir),
        &format!(
            "INSERT INTO goal_projects (goal_id, project_id, weight) VALUES ({goal}, {project}, 0.0)"
        ),
    ));

    let stdout = output_stdout(run_cmd(&dir, &["goal", "progress", &goal.to_string()]));
    assert_eq!(stdout.trim(), format!("Goal ID: {goal} progress: 35.0%"));
}

#[test]
fn list_commands_filter_and_report_progress() {
    let dir = TempDir::new().expect("temp dir");
    let alpha = create_project(&dir, "Alpha");
    let beta = create_project(&dir, "Beta");
    add_task(&dir, alpha, None, "done");
    add_task(&dir, alpha, None, "blocked");
    output_stdout(run_cmd(&dir, &["project", "status", &beta.to_string(), "paused"]));

    let projects = json_output(&dir, &["project", "list", "--json"]);
    assert_eq!(projects.as_array().map(Vec::len), Some(2));
    let paused = json_output(&dir, &["project", "list", "--status", "paused", "--json"]);
    assert_eq!(paused[0]["id"].as_i64(), Some(beta));
    assert_eq!(paused.as_array().map(Vec::len), Some(1));
    let stdout = output_stdout(run_cmd(&dir, &["project", "list", "--status", "active"]));
    assert!(
        stdout.contains(&format!("[active] Alpha (project id {alpha}) 1/2 tasks 50.0%")),
        "stdout: {stdout}"
    );
    let stdout = output_stdout(run_cmd(&dir, &["project", "list", "--status", "archived"]));
    assert_eq!(stdout.trim(), "No projects found.");

    let blocked = json_output(
        &dir,
        &["task", "list", "--project", &alpha.to_string(), "--status", "blocked", "--json"],
    );
    assert_eq!(blocked.as_array().map(Vec::len), Some(1));
    assert_eq!(blocked[0]["status"].as_str(), Some("blocked"));

    let root = add_goal(&dir, "Root", None);
    let child = add_goal(&dir, "Child", Some(root));
    output_stdout(run_cmd(
        &dir,
        &["goal", "link", &child.to_string(), &alpha.to_string()],
    ));
    let children = json_output(&dir, &["goal", "list", "--parent", &root.to_string(), "--json"]);
    assert_eq!(children.as_array().map(Vec::len), Some(1));
    assert_eq!(children[0]["id"].as_i64(), Some(child));
    assert_eq!(children[0]["progress"].as_f64(), Some(50.0));
    let roots = json_output(&dir, &["goal", "list", "--roots", "--json"]);
    assert_eq!(roots[0]["id"].as_i64(), Some(root));
    assert_eq!(roots.as_array().map(Vec::len), Some(1));
}

#[test]
fn task_metrics_report_effort_variance() {
    let dir = TempDir::new().expect("temp dir");
    let project = create_project(&dir, "P");
    let task = add_task(&dir, project, None, "in_progress").to_string();
    output_stdout(run_cmd(
        &dir,
        &["task", "hours", &task, "--estimate", "4", "--actual", "5"],
    ));

    let stdout = output_stdout(run_cmd(&dir, &["task", "metrics", &task]));
    assert!(stdout.contains("Cycle time: (not completed)"), "stdout: {stdout}");
    assert!(stdout.contains("+25.0% (under-estimated)"), "stdout: {stdout}");

    output_stdout(run_cmd(&dir, &["task", "status", &task, "done"]));
    let metrics = json_output(&dir, &["task", "metrics", &task, "--json"]);
    assert!(metrics["cycle_time_hours"].as_f64().is_some());
    assert_eq!(metrics["effort_variance_percent"].as_f64(), Some(25.0));
    assert_eq!(metrics["under_estimated"].as_bool(), Some(true));

    let stats = json_output(&dir, &["project", "show", &project.to_string(), "--json"]);
    assert_eq!(stats["total_estimated_hours"].as_f64(), Some(4.0));
    assert_eq!(stats["total_actual_hours"].as_f64(), Some(5.0));
}

#[test]
fn project_dates_can_be_cleared() {
    let dir = TempDir::new().expect("temp dir");
    let project = create_project(&dir, "Dated").to_string();
    output_stdout(run_cmd(
        &dir,
        &["project", "dates", &project, "--start", "2024-03-01", "--target-end", "2024-06-01"],
    ));
    output_stdout(run_cmd(&dir, &["project", "dates", &project, "--clear-target-end"]));

    let stdout = output_stdout(run_cmd(&dir, &["project", "show", &project]));
    assert!(
        stdout.contains("Dates: start 2024-03-01 / target - / actual -"),
        "stdout: {stdout}"
    );

    let output = run_cmd(
        &dir,
        &["project", "dates", &project, "--start", "2024-03-02", "--clear-start"],
    );
    assert_eq!(output.status.code(), Some(2));
}
