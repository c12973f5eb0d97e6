//! Database migrations for LogRaven
//!
//! Unique indexes on `error_groups(project_id, fingerprint)` and
//! `quota_counters(project_id, period)` back the atomic upserts used during
//! ingestion and must not be dropped.

pub use sea_orm_migration::prelude::*;

mod migration;

pub use migration::Migrator;

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{ConnectOptions, ConnectionTrait, Database, Statement};

    #[tokio::test]
    async fn test_migrations_apply_and_roll_back_on_sqlite() {
        let mut options = ConnectOptions::new("sqlite::memory:");
        options.max_connections(1);
        let db = Database::connect(options).await.unwrap();

        Migrator::up(&db, None).await.unwrap();

        let rows = db
            .query_all(Statement::from_string(
                db.get_database_backend(),
                "SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name",
            ))
            .await
            .unwrap();
        let tables: Vec<String> = rows
            .iter()
            .map(|row| row.try_get::<String>("", "name").unwrap())
            .collect();
        for expected in [
            "error_events",
            "error_groups",
            "plans",
            "projects",
            "quota_counters",
            "webhook_deliveries",
            "webhooks",
        ] {
            assert!(tables.contains(&expected.to_string()), "missing {}", expected);
        }

        Migrator::down(&db, None).await.unwrap();
    }
}
