use async_trait::async_trait;
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue::Set, ConnectionTrait, DbErr};
use serde::{Deserialize, Serialize};
use lograven_core::DBDateTime;

use super::types::DeliveryStatus;

/// One delivery attempt.
///
/// Retries never edit an existing row: they append a new one with the same
/// `correlation_id`, the next `attempt_number`, the same `request_body` and
/// the `first_sent_at` of the first attempt.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "webhook_deliveries")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub webhook_id: i32,
    pub correlation_id: String,
    pub attempt_number: i32,
    pub event_type: String,
    /// Id of the error event that triggered the delivery
    pub event_id: i32,
    pub status: DeliveryStatus,
    /// Exact bytes that were POSTed
    #[sea_orm(column_type = "Text")]
    pub request_body: String,
    pub success: bool,
    pub status_code: Option<i32>,
    #[sea_orm(column_type = "Text", nullable)]
    pub response_body: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub error_message: Option<String>,
    pub first_sent_at: Option<DBDateTime>,
    pub sent_at: Option<DBDateTime>,
    pub response_at: Option<DBDateTime>,
    pub created_at: DBDateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::webhooks::Entity",
        from = "Column::WebhookId",
        to = "super::webhooks::Column::Id",
        on_update = "NoAction",
        on_delete = "Cascade"
    )]
    Webhook,
}

impl Related<super::webhooks::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Webhook.def()
    }
}

#[async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C>(mut self, _db: &C, insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        if insert {
            if self.created_at.is_not_set() {
                self.created_at = Set(chrono::Utc::now());
            }
            if self.status.is_not_set() {
                self.status = Set(DeliveryStatus::Pending);
            }
            if self.success.is_not_set() {
                self.success = Set(false);
            }
            if self.attempt_number.is_not_set() {
                self.attempt_number = Set(1);
            }
        }

        Ok(self)
    }
}
