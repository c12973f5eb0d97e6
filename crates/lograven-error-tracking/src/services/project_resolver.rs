use lograven_database::DbConnection;
use lograven_entities::types::PlanLimit;
use lograven_entities::{plans, projects};
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter};
use std::sync::Arc;

use super::types::IngestError;

/// A project looked up by DSN together with its plan's event allowance
#[derive(Debug, Clone)]
pub struct ResolvedProject {
    pub project: projects::Model,
    pub limit: PlanLimit,
}

pub struct ProjectResolver {
    db: Arc<DbConnection>,
}

impl ProjectResolver {
    pub fn new(db: Arc<DbConnection>) -> Self {
        Self { db }
    }

    /// Unknown, empty or plan-less DSNs are all `Unauthorized`
    pub async fn resolve(&self, dsn: &str) -> Result<ResolvedProject, IngestError> {
        Self::resolve_in(self.db.as_ref(), dsn).await
    }

    pub async fn resolve_in<C>(conn: &C, dsn: &str) -> Result<ResolvedProject, IngestError>
    where
        C: ConnectionTrait,
    {
        let dsn = dsn.trim();
        if dsn.is_empty() {
            return Err(IngestError::Unauthorized);
        }

        let (project, plan) = projects::Entity::find()
            .filter(projects::Column::Dsn.eq(dsn))
            .find_also_related(plans::Entity)
            .one(conn)
            .await?
            .ok_or(IngestError::Unauthorized)?;
        let plan = plan.ok_or(IngestError::Unauthorized)?;

        Ok(ResolvedProject {
            limit: plan.limit(),
            project,
        })
    }
}
