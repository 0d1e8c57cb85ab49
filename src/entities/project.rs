use sea_orm::entity::prelude::*;

use super::{goal_project, task};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "projects")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    #[sea_orm(unique)]
    pub name: String,
    pub description: Option<String>,
    pub status: String,
    pub priority: String,
    pub start_date: Option<Date>,
    pub target_end_date: Option<Date>,
    pub actual_end_date: Option<Date>,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter)]
pub enum Relation {
    Task,
    GoalProject,
}

impl RelationTrait for Relation {
    fn def(&self) -> RelationDef {
        match self {
            Self::Task => Entity::has_many(task::Entity).into(),
            Self::GoalProject => Entity::has_many(goal_project::Entity).into(),
        }
    }
}

impl Related<task::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Task.def()
    }
}

impl Related<goal_project::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::GoalProject.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
