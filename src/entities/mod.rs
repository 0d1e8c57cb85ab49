pub mod goal;
pub mod goal_project;
pub mod project;
pub mod task;
