//! Fingerprint to error-group upsert
//!
//! The only hot row in the system. Every write goes through one
//! `INSERT ... ON CONFLICT (project_id, fingerprint) DO UPDATE` statement so
//! concurrent ingestion of the same fingerprint can never create a second
//! group or lose an increment.

use chrono::Utc;
use lograven_core::UtcDateTime;
use lograven_database::DbConnection;
use lograven_entities::error_groups;
use lograven_entities::types::GroupStatus;
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{ConnectionTrait, DbErr, EntityTrait, Set};
use std::sync::Arc;
use tracing::debug;

use super::types::{is_foreign_key_violation, IngestError};

/// `last_seen` never moves backwards, whatever order events arrive in
const LAST_SEEN_MAX: &str = "CASE WHEN excluded.last_seen > error_groups.last_seen \
     THEN excluded.last_seen ELSE error_groups.last_seen END";

/// What the group store needs to know about the event being folded in
#[derive(Debug, Clone, Copy)]
pub struct GroupSeed<'a> {
    pub error_type: &'a str,
    pub message: &'a str,
    pub seen_at: UtcDateTime,
}

pub struct GroupStore {
    db: Arc<DbConnection>,
}

impl GroupStore {
    pub fn new(db: Arc<DbConnection>) -> Self {
        Self { db }
    }

    pub async fn upsert_group(
        &self,
        project_id: i32,
        fingerprint: &str,
        seed: GroupSeed<'_>,
    ) -> Result<(error_groups::Model, bool), IngestError> {
        Self::upsert_group_in(self.db.as_ref(), project_id, fingerprint, seed).await
    }

    /// Create the group for `(project_id, fingerprint)` or count one more
    /// occurrence on it
    ///
    /// Returns the group as stored after the write and whether this call
    /// created it. A new group starts `open` with `count = 1` and
    /// `first_seen = last_seen = seed.seen_at`. An existing group gets
    /// `count + 1` and `last_seen = max(last_seen, seed.seen_at)`; its
    /// representative type, message and status stay untouched.
    pub async fn upsert_group_in<C>(
        conn: &C,
        project_id: i32,
        fingerprint: &str,
        seed: GroupSeed<'_>,
    ) -> Result<(error_groups::Model, bool), IngestError>
    where
        C: ConnectionTrait,
    {
        if fingerprint.is_empty() {
            return Err(IngestError::InvalidPayload(
                "fingerprint must not be empty".to_string(),
            ));
        }

        let now = Utc::now();
        let group = error_groups::ActiveModel {
            project_id: Set(project_id),
            fingerprint: Set(fingerprint.to_string()),
            error_type: Set(seed.error_type.to_string()),
            message: Set(seed.message.to_string()),
            status: Set(GroupStatus::Open),
            assignee: Set(None),
            total_count: Set(1),
            first_seen: Set(seed.seen_at),
            last_seen: Set(seed.seen_at),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };

        let on_conflict = OnConflict::columns([
            error_groups::Column::ProjectId,
            error_groups::Column::Fingerprint,
        ])
        .value(
            error_groups::Column::TotalCount,
            Expr::col((error_groups::Entity, error_groups::Column::TotalCount)).add(1),
        )
        .value(error_groups::Column::LastSeen, Expr::cust(LAST_SEEN_MAX))
        .value(
            error_groups::Column::UpdatedAt,
            Expr::cust("excluded.updated_at"),
        )
        .to_owned();

        let stored = error_groups::Entity::insert(group)
            .on_conflict(on_conflict)
            .exec_with_returning(conn)
            .await
            .map_err(|e| map_upsert_error(e, project_id))?;

        let is_new = stored.total_count == 1;
        debug!(
            project_id,
            group_id = stored.id,
            count = stored.total_count,
            is_new,
            "Upserted error group"
        );
        Ok((stored, is_new))
    }
}

fn map_upsert_error(err: DbErr, project_id: i32) -> IngestError {
    if is_foreign_key_violation(&err) {
        return IngestError::NotFound(format!("project {}", project_id));
    }
    IngestError::from(err)
}
