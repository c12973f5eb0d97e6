//! Test utilities for database integration tests
//!
//! Every `TestDatabase` is a private SQLite database with all migrations
//! applied, so tests can run in parallel without sharing state.
//!
//! The default one lives in memory and its pool is capped at one connection:
//! an in-memory database only lives as long as the connection that created
//! it. Code under test that opens a transaction must do all of its work
//! through that transaction. `TestDatabase::file_backed` keeps the database in
//! a temporary directory instead, so several pooled connections can hold
//! transactions at the same time.

use crate::DbConnection;
use lograven_entities::types::PlanLimit;
use lograven_entities::{plans, projects, webhooks};
use lograven_migrations::Migrator;
use sea_orm::*;
use sea_orm_migration::MigratorTrait;
use std::sync::Arc;
use std::time::Duration;

pub struct TestDatabase {
    pub db: Arc<DbConnection>,
    _dir: Option<tempfile::TempDir>,
}

impl TestDatabase {
    /// Fresh database without schema
    pub async fn new() -> anyhow::Result<Self> {
        let mut opt = ConnectOptions::new("sqlite::memory:".to_owned());
        opt.max_connections(1)
            .min_connections(1)
            .acquire_timeout(Duration::from_secs(30))
            .sqlx_logging(false);

        let db = Database::connect(opt)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to open in-memory database: {}", e))?;

        Ok(Self {
            db: Arc::new(db),
            _dir: None,
        })
    }

    /// Fresh on-disk database with every migration applied and a pool of
    /// `max_connections`, removed on drop
    pub async fn file_backed(max_connections: u32) -> anyhow::Result<Self> {
        let dir = tempfile::tempdir()?;
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("lograven.db").display());

        let mut opt = ConnectOptions::new(url);
        opt.max_connections(max_connections)
            .min_connections(1)
            .acquire_timeout(Duration::from_secs(30))
            .sqlx_logging(false);

        let db = Database::connect(opt)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to open file-backed database: {}", e))?;
        Migrator::up(&db, None)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to run migrations: {}", e))?;

        Ok(Self {
            db: Arc::new(db),
            _dir: Some(dir),
        })
    }

    /// Fresh database with every migration applied
    pub async fn with_migrations() -> anyhow::Result<Self> {
        let test_db = Self::new().await?;
        Migrator::up(&*test_db.db, None)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to run migrations: {}", e))?;
        Ok(test_db)
    }

    pub fn connection(&self) -> &DbConnection {
        &self.db
    }

    pub fn connection_arc(&self) -> Arc<DbConnection> {
        self.db.clone()
    }

    /// Execute raw SQL
    pub async fn execute_sql(&self, sql: &str) -> anyhow::Result<ExecResult> {
        let statement = Statement::from_string(self.db.get_database_backend(), sql.to_owned());
        Ok(self.db.execute(statement).await?)
    }

    /// Row count of `table`
    pub async fn count_rows(&self, table: &str) -> anyhow::Result<i64> {
        let statement = Statement::from_string(
            self.db.get_database_backend(),
            format!("SELECT COUNT(*) AS n FROM {}", table),
        );
        let row = self
            .db
            .query_one(statement)
            .await?
            .ok_or_else(|| anyhow::anyhow!("COUNT returned no row"))?;
        Ok(row.try_get::<i64>("", "n")?)
    }
}

/// Insert a plan with the given monthly limit
pub async fn create_plan(
    db: &DbConnection,
    name: &str,
    limit: PlanLimit,
) -> anyhow::Result<plans::Model> {
    let plan = plans::ActiveModel {
        name: Set(name.to_string()),
        events_per_month: Set(limit.to_column()),
        created_at: Set(lograven_core::chrono::Utc::now()),
        ..Default::default()
    };
    Ok(plan.insert(db).await?)
}

/// Insert a project on `plan_id` reachable through `dsn`
pub async fn create_project(
    db: &DbConnection,
    plan_id: i32,
    name: &str,
    dsn: &str,
) -> anyhow::Result<projects::Model> {
    let project = projects::ActiveModel {
        name: Set(name.to_string()),
        plan_id: Set(plan_id),
        dsn: Set(dsn.to_string()),
        ..Default::default()
    };
    Ok(project.insert(db).await?)
}

/// Insert a plan and a project on it in one go
pub async fn create_project_with_limit(
    db: &DbConnection,
    dsn: &str,
    limit: PlanLimit,
) -> anyhow::Result<projects::Model> {
    let plan = create_plan(db, &format!("plan-{}", dsn), limit).await?;
    create_project(db, plan.id, &format!("project-{}", dsn), dsn).await
}

/// Insert a webhook subscribed to `events`
pub async fn create_webhook(
    db: &DbConnection,
    project_id: i32,
    url: &str,
    secret: Option<&str>,
    events: &[&str],
    enabled: bool,
) -> anyhow::Result<webhooks::Model> {
    let webhook = webhooks::ActiveModel {
        project_id: Set(project_id),
        url: Set(url.to_string()),
        secret: Set(secret.map(str::to_string)),
        events: Set(serde_json::to_string(events)?),
        status_filter: Set(None),
        enabled: Set(enabled),
        ..Default::default()
    };
    Ok(webhook.insert(db).await?)
}
