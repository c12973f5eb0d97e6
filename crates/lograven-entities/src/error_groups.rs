use async_trait::async_trait;
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue::Set, ConnectionTrait, DbErr};
use serde::{Deserialize, Serialize};
use lograven_core::{DBDateTime, GroupSummary};

use super::types::GroupStatus;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "error_groups")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub project_id: i32,

    // Unique together with project_id
    pub fingerprint: String,

    // Representative values, taken from the first event
    pub error_type: String,
    #[sea_orm(column_type = "Text")]
    pub message: String,

    pub status: GroupStatus,
    pub assignee: Option<String>,

    pub total_count: i64,
    pub first_seen: DBDateTime,
    pub last_seen: DBDateTime,

    pub created_at: DBDateTime,
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
    #[sea_orm(has_many = "super::error_events::Entity")]
    ErrorEvents,
}

impl Related<super::projects::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Projects.def()
    }
}

impl Related<super::error_events::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ErrorEvents.def()
    }
}

#[async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C>(mut self, _db: &C, insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        let now = chrono::Utc::now();
        if insert && self.created_at.is_not_set() {
            self.created_at = Set(now);
        }
        self.updated_at = Set(now);
        Ok(self)
    }
}

impl From<&Model> for GroupSummary {
    fn from(group: &Model) -> Self {
        GroupSummary {
            id: group.id,
            project_id: group.project_id,
            fingerprint: group.fingerprint.clone(),
            error_type: group.error_type.clone(),
            message: group.message.clone(),
            status: group.status.as_str().to_string(),
            count: group.total_count,
            first_seen: group.first_seen,
            last_seen: group.last_seen,
            assignee: group.assignee.clone(),
        }
    }
}
