use sea_orm::entity::prelude::*;
use sea_orm::sea_query::ForeignKeyAction;

use super::goal_project;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "goals")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub parent_goal_id: Option<i64>,
    pub title: String,
    pub description: Option<String>,
    pub goal_type: String,
    pub status: String,
    /// Manual progress, only meaningful while the goal has no linked projects.
    pub progress_percentage: f64,
    pub target_date: Option<Date>,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter)]
pub enum Relation {
    ParentGoal,
    GoalProject,
}

impl RelationTrait for Relation {
    fn def(&self) -> RelationDef {
        match self {
            Self::ParentGoal => Entity::belongs_to(Entity)
                .from(Column::ParentGoalId)
                .to(Column::Id)
                .on_delete(ForeignKeyAction::SetNull)
                .into(),
            Self::GoalProject => Entity::has_many(goal_project::Entity).into(),
        }
    }
}

impl Related<goal_project::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::GoalProject.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
