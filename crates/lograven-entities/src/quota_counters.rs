use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use lograven_core::DBDateTime;

/// Events admitted for a project during one billing period.
///
/// Rows are created lazily by the first admitted event of a period and only
/// ever touched through the conditional upsert in the quota tracker.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "quota_counters")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub project_id: i32,
    /// `YYYY-MM`
    pub period: String,
    pub event_count: i64,
    /// Plan limit at the time of the last admission, NULL when unlimited
    pub event_limit: Option<i64>,
    pub updated_at: DBDateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::projects::Entity",
        from = "Column::ProjectId",
        to = "super::projects::Column::Id",
        on_update = "NoAction",
        on_delete = "Cascade"
    )]
    Projects,
}

impl Related<super::projects::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Projects.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
