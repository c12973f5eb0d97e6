//! Per-project, per-billing-period admission control
//!
//! A counter row per `(project_id, period)` is created by the first admitted
//! event of the period. Admission is a single conditional upsert:
//!
//! ```sql
//! INSERT INTO quota_counters (...) VALUES (..., 1, ...)
//! ON CONFLICT (project_id, period) DO UPDATE
//!     SET event_count = quota_counters.event_count + 1, ...
//!     WHERE quota_counters.event_count < :limit
//! RETURNING event_count
//! ```
//!
//! No returned row means the limit was already reached and nothing was
//! counted, so rejected events never consume quota and concurrent admits
//! cannot overshoot.

use chrono::Utc;
use lograven_core::{billing_period, UtcDateTime};
use lograven_database::DbConnection;
use lograven_entities::types::PlanLimit;
use lograven_entities::{plans, projects, quota_counters};
use sea_orm::sea_query::{Expr, OnConflict, Query};
use sea_orm::{ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter};
use std::sync::Arc;
use tracing::debug;

use super::types::{is_foreign_key_violation, IngestError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Counted; `count` is the period total including this event
    Admitted { count: i64 },
    /// Not counted; the period already holds `current` of `limit` events
    Rejected { current: i64, limit: i64 },
}

impl Admission {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Admission::Admitted { .. })
    }
}

pub struct QuotaTracker {
    db: Arc<DbConnection>,
}

impl QuotaTracker {
    pub fn new(db: Arc<DbConnection>) -> Self {
        Self { db }
    }

    /// Admit one event for `project_id` against its plan's monthly limit
    ///
    /// The period is derived from `received_at` so a request that straddles
    /// a month boundary is counted in one period only.
    pub async fn try_admit(
        &self,
        project_id: i32,
        received_at: UtcDateTime,
    ) -> Result<Admission, IngestError> {
        let (_, plan) = projects::Entity::find_by_id(project_id)
            .find_also_related(plans::Entity)
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| IngestError::NotFound(format!("project {}", project_id)))?;
        let limit = plan
            .map(|p| p.limit())
            .ok_or_else(|| IngestError::NotFound(format!("plan of project {}", project_id)))?;

        Self::try_admit_in(self.db.as_ref(), project_id, limit, received_at).await
    }

    /// Same as [`try_admit`](Self::try_admit) with the limit already known,
    /// on any connection or open transaction
    pub async fn try_admit_in<C>(
        conn: &C,
        project_id: i32,
        limit: PlanLimit,
        received_at: UtcDateTime,
    ) -> Result<Admission, IngestError>
    where
        C: ConnectionTrait,
    {
        let period = billing_period(received_at);

        if let PlanLimit::Limited(max) = limit {
            if max <= 0 {
                let current = Self::current_count_in(conn, project_id, &period).await?;
                return Ok(Admission::Rejected {
                    current,
                    limit: max.max(0),
                });
            }
        }

        let mut on_conflict = OnConflict::columns([
            quota_counters::Column::ProjectId,
            quota_counters::Column::Period,
        ]);
        on_conflict
            .value(
                quota_counters::Column::EventCount,
                Expr::col((quota_counters::Entity, quota_counters::Column::EventCount)).add(1),
            )
            .value(
                quota_counters::Column::EventLimit,
                Expr::cust("excluded.event_limit"),
            )
            .value(
                quota_counters::Column::UpdatedAt,
                Expr::cust("excluded.updated_at"),
            );
        if let PlanLimit::Limited(max) = limit {
            on_conflict.action_and_where(
                Expr::col((quota_counters::Entity, quota_counters::Column::EventCount)).lt(max),
            );
        }

        let mut insert = Query::insert();
        insert
            .into_table(quota_counters::Entity)
            .columns([
                quota_counters::Column::ProjectId,
                quota_counters::Column::Period,
                quota_counters::Column::EventCount,
                quota_counters::Column::EventLimit,
                quota_counters::Column::UpdatedAt,
            ])
            .values([
                project_id.into(),
                period.clone().into(),
                1i64.into(),
                limit.to_column().into(),
                Utc::now().into(),
            ])
            .map_err(|e| DbErr::Custom(e.to_string()))?
            .on_conflict(on_conflict)
            .returning_col(quota_counters::Column::EventCount);

        let statement = conn.get_database_backend().build(&insert);
        let row = conn.query_one(statement).await.map_err(|e| {
            if is_foreign_key_violation(&e) {
                IngestError::NotFound(format!("project {}", project_id))
            } else {
                IngestError::from(e)
            }
        })?;

        match row {
            Some(row) => {
                let count: i64 = row.try_get("", "event_count")?;
                Ok(Admission::Admitted { count })
            }
            None => {
                let current = Self::current_count_in(conn, project_id, &period).await?;
                let limit = limit.to_column().unwrap_or(current);
                debug!(project_id, period = %period, current, limit, "Event quota reached");
                Ok(Admission::Rejected { current, limit })
            }
        }
    }

    /// Counter row for the period containing `at`, if any event was admitted
    pub async fn counter(
        &self,
        project_id: i32,
        at: UtcDateTime,
    ) -> Result<Option<quota_counters::Model>, DbErr> {
        quota_counters::Entity::find()
            .filter(quota_counters::Column::ProjectId.eq(project_id))
            .filter(quota_counters::Column::Period.eq(billing_period(at)))
            .one(self.db.as_ref())
            .await
    }

    async fn current_count_in<C>(conn: &C, project_id: i32, period: &str) -> Result<i64, DbErr>
    where
        C: ConnectionTrait,
    {
        Ok(quota_counters::Entity::find()
            .filter(quota_counters::Column::ProjectId.eq(project_id))
            .filter(quota_counters::Column::Period.eq(period))
            .one(conn)
            .await?
            .map(|counter| counter.event_count)
            .unwrap_or(0))
    }
}
