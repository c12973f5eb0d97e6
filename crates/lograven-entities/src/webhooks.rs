use async_trait::async_trait;
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue::Set, ConnectionTrait, DbErr};
use serde::{Deserialize, Serialize};
use lograven_core::DBDateTime;

use super::types::GroupStatus;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "webhooks")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub project_id: i32,
    pub url: String,
    /// HMAC signing key. Deliveries are unsigned when absent.
    #[serde(skip_serializing)]
    pub secret: Option<String>,
    /// JSON array of subscribed event types
    #[sea_orm(column_type = "Text")]
    pub events: String,
    /// JSON array of group statuses, NULL matches any status
    #[sea_orm(column_type = "Text", nullable)]
    pub status_filter: Option<String>,
    pub enabled: bool,
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
    #[sea_orm(has_many = "super::webhook_deliveries::Entity")]
    Deliveries,
}

impl Related<super::projects::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Projects.def()
    }
}

impl Related<super::webhook_deliveries::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Deliveries.def()
    }
}

#[async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C>(mut self, _db: &C, insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        let now = chrono::Utc::now();
        if insert {
            if self.created_at.is_not_set() {
                self.created_at = Set(now);
            }
            if self.enabled.is_not_set() {
                self.enabled = Set(true);
            }
        }
        self.updated_at = Set(now);
        Ok(self)
    }
}

impl Model {
    /// Subscribed event type names. Malformed JSON subscribes to nothing.
    pub fn event_types(&self) -> Vec<String> {
        serde_json::from_str(&self.events).unwrap_or_default()
    }

    /// `None` when the webhook accepts groups in any status
    pub fn statuses(&self) -> Option<Vec<GroupStatus>> {
        self.status_filter
            .as_deref()
            .map(|raw| serde_json::from_str(raw).unwrap_or_default())
    }
}
