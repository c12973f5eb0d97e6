use chrono::Utc;
use lograven_core::{billing_period, PaginationParams, UtcDateTime};
use lograven_database::DbConnection;
use lograven_entities::types::{GroupStatus, PlanLimit};
use lograven_entities::{error_events, error_groups, plans, projects, quota_counters};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;
use utoipa::ToSchema;

use super::types::ErrorTrackingError;

/// Human-driven changes to a group. `None` leaves the field alone;
/// `assignee: Some(None)` clears the assignee.
#[derive(Debug, Clone, Default)]
pub struct GroupUpdate {
    pub status: Option<GroupStatus>,
    pub assignee: Option<Option<String>>,
}

/// Event usage of a project in one billing period
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct QuotaUsage {
    pub project_id: i32,
    /// `YYYY-MM`
    pub period: String,
    pub event_count: i64,
    /// Monthly limit, or `"unlimited"`
    #[schema(value_type = Object)]
    pub limit: PlanLimit,
    /// `None` on unlimited plans
    pub remaining: Option<i64>,
}

/// Read side of error tracking, used by the dashboard
pub struct ErrorQueryService {
    db: Arc<DbConnection>,
}

impl ErrorQueryService {
    pub fn new(db: Arc<DbConnection>) -> Self {
        Self { db }
    }

    /// Groups of a project, most recently seen first
    pub async fn list_groups(
        &self,
        project_id: i32,
        status: Option<GroupStatus>,
        pagination: PaginationParams,
    ) -> Result<(Vec<error_groups::Model>, u64), ErrorTrackingError> {
        let (page, page_size) = pagination.normalize();

        let mut query =
            error_groups::Entity::find().filter(error_groups::Column::ProjectId.eq(project_id));
        if let Some(status) = status {
            query = query.filter(error_groups::Column::Status.eq(status));
        }
        let query = query
            .order_by_desc(error_groups::Column::LastSeen)
            .order_by_desc(error_groups::Column::Id);

        let paginator = query.paginate(self.db.as_ref(), page_size);
        let total = paginator.num_items().await?;
        let groups = paginator.fetch_page(page - 1).await?;

        Ok((groups, total))
    }

    pub async fn get_group(
        &self,
        project_id: i32,
        group_id: i32,
    ) -> Result<error_groups::Model, ErrorTrackingError> {
        error_groups::Entity::find_by_id(group_id)
            .filter(error_groups::Column::ProjectId.eq(project_id))
            .one(self.db.as_ref())
            .await?
            .ok_or(ErrorTrackingError::GroupNotFound)
    }

    /// Events of one group, newest first
    pub async fn list_events(
        &self,
        project_id: i32,
        group_id: i32,
        pagination: PaginationParams,
    ) -> Result<(Vec<error_events::Model>, u64), ErrorTrackingError> {
        // 404 for groups of other projects rather than an empty page
        self.get_group(project_id, group_id).await?;

        let (page, page_size) = pagination.normalize();
        let paginator = error_events::Entity::find()
            .filter(error_events::Column::ErrorGroupId.eq(group_id))
            .filter(error_events::Column::ProjectId.eq(project_id))
            .order_by_desc(error_events::Column::Timestamp)
            .order_by_desc(error_events::Column::Id)
            .paginate(self.db.as_ref(), page_size);
        let total = paginator.num_items().await?;
        let events = paginator.fetch_page(page - 1).await?;

        Ok((events, total))
    }

    /// Status and assignee transitions made by a person
    ///
    /// Counters and timestamps are owned by ingestion and are never touched
    /// here.
    pub async fn update_group(
        &self,
        project_id: i32,
        group_id: i32,
        update: GroupUpdate,
    ) -> Result<error_groups::Model, ErrorTrackingError> {
        let group = self.get_group(project_id, group_id).await?;
        let previous_status = group.status;

        let mut active: error_groups::ActiveModel = group.into();
        if let Some(status) = update.status {
            active.status = Set(status);
        }
        if let Some(assignee) = update.assignee {
            active.assignee = Set(assignee.filter(|a| !a.trim().is_empty()));
        }

        let updated = active.update(self.db.as_ref()).await?;
        if updated.status != previous_status {
            info!(
                project_id,
                group_id,
                from = %previous_status,
                to = %updated.status,
                "Error group status changed"
            );
        }
        Ok(updated)
    }

    /// Usage in the current billing period
    pub async fn usage(&self, project_id: i32) -> Result<QuotaUsage, ErrorTrackingError> {
        self.usage_at(project_id, Utc::now()).await
    }

    pub async fn usage_at(
        &self,
        project_id: i32,
        at: UtcDateTime,
    ) -> Result<QuotaUsage, ErrorTrackingError> {
        let (_, plan) = projects::Entity::find_by_id(project_id)
            .find_also_related(plans::Entity)
            .one(self.db.as_ref())
            .await?
            .ok_or(ErrorTrackingError::ProjectNotFound)?;
        let limit = plan.map(|p| p.limit()).unwrap_or(PlanLimit::Unlimited);

        let period = billing_period(at);
        let event_count = quota_counters::Entity::find()
            .filter(quota_counters::Column::ProjectId.eq(project_id))
            .filter(quota_counters::Column::Period.eq(period.as_str()))
            .one(self.db.as_ref())
            .await?
            .map(|counter| counter.event_count)
            .unwrap_or(0);

        let remaining = limit
            .to_column()
            .map(|max| (max - event_count).max(0));

        Ok(QuotaUsage {
            project_id,
            period,
            event_count,
            limit,
            remaining,
        })
    }
}
