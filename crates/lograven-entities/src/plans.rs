use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use lograven_core::DBDateTime;

use super::types::PlanLimit;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "plans")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub name: String,
    /// Monthly event limit. NULL for unlimited/custom plans.
    pub events_per_month: Option<i64>,
    pub created_at: DBDateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::projects::Entity")]
    Projects,
}

impl Related<super::projects::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Projects.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn limit(&self) -> PlanLimit {
        PlanLimit::from_column(self.events_per_month)
    }
}
