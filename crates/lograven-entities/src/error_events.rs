use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use lograven_core::{DBDateTime, EventSummary};

/// One raw occurrence. Rows are written once by ingestion and never updated.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "error_events")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    pub project_id: i32,
    pub error_group_id: i32,
    pub fingerprint: String,
    pub timestamp: DBDateTime,

    pub error_type: String,
    #[sea_orm(column_type = "Text")]
    pub message: String,
    #[sea_orm(column_type = "Text", nullable)]
    pub stack_trace: Option<String>,
    /// Stack trace after source-map resolution, when a mapping was found
    #[sea_orm(column_type = "Text", nullable)]
    pub mapped_stack_trace: Option<String>,

    // Request
    pub url: Option<String>,
    pub method: Option<String>,
    pub path: Option<String>,
    pub status_code: Option<i32>,
    pub user_agent: Option<String>,

    // Device / browser
    pub browser: Option<String>,
    pub browser_version: Option<String>,
    pub os: Option<String>,
    pub os_version: Option<String>,
    pub device_type: Option<String>,

    pub environment: Option<String>,
    pub release: Option<String>,

    /// Flat key/value bags, see `lograven_core::TagMap`
    #[sea_orm(column_type = "Json", nullable)]
    pub user_context: Option<Json>,
    #[sea_orm(column_type = "Json", nullable)]
    pub tags: Option<Json>,

    pub created_at: DBDateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::error_groups::Entity",
        from = "Column::ErrorGroupId",
        to = "super::error_groups::Column::Id",
        on_update = "NoAction",
        on_delete = "Cascade"
    )]
    ErrorGroups,
    #[sea_orm(
        belongs_to = "super::projects::Entity",
        from = "Column::ProjectId",
        to = "super::projects::Column::Id",
        on_update = "NoAction",
        on_delete = "Cascade"
    )]
    Projects,
}

impl Related<super::error_groups::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ErrorGroups.def()
    }
}

impl Related<super::projects::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Projects.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl From<&Model> for EventSummary {
    fn from(event: &Model) -> Self {
        EventSummary {
            id: event.id,
            error_type: event.error_type.clone(),
            message: event.message.clone(),
            timestamp: event.timestamp,
            environment: event.environment.clone(),
            release: event.release.clone(),
            url: event.url.clone(),
        }
    }
}
