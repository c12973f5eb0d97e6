//! Database connection management

use lograven_config::DatabaseConfig;
use lograven_core::{ServiceError, ServiceResult};
use lograven_migrations::{Migrator, MigratorTrait};
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection};
use std::sync::Arc;
use tracing::info;

pub type DbConnection = DatabaseConnection;

/// Open a pool without touching the schema
pub async fn connect(config: &DatabaseConfig) -> ServiceResult<Arc<DbConnection>> {
    let mut opt = ConnectOptions::new(config.url.clone());
    opt.max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .connect_timeout(config.connect_timeout())
        .acquire_timeout(config.acquire_timeout());

    let db = Database::connect(opt)
        .await
        .map_err(|e| ServiceError::Database(e.to_string()))?;

    info!(
        "Connected to {:?} database (max {} connections)",
        db.get_database_backend(),
        config.max_connections
    );
    Ok(Arc::new(db))
}

pub async fn run_migrations(db: &DbConnection) -> ServiceResult<()> {
    Migrator::up(db, None)
        .await
        .map_err(|e| ServiceError::Database(e.to_string()))?;
    info!("Database migrations applied");
    Ok(())
}

/// Open a pool and bring the schema up to date
pub async fn establish_connection(config: &DatabaseConfig) -> ServiceResult<Arc<DbConnection>> {
    let db = connect(config).await?;
    run_migrations(&db).await?;
    Ok(db)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{DbBackend, Statement};

    fn sqlite_config() -> DatabaseConfig {
        DatabaseConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
            min_connections: 1,
            connect_timeout_secs: 5,
            acquire_timeout_secs: 5,
        }
    }

    #[tokio::test]
    async fn test_establish_connection_runs_migrations() {
        let db = establish_connection(&sqlite_config()).await.unwrap();

        let row = db
            .query_one(Statement::from_string(
                db.get_database_backend(),
                "SELECT COUNT(*) AS n FROM error_groups",
            ))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.try_get::<i64>("", "n").unwrap(), 0);
    }

    #[tokio::test]
    async fn test_connect_leaves_schema_alone() {
        let db = connect(&sqlite_config()).await.unwrap();
        assert_eq!(db.get_database_backend(), DbBackend::Sqlite);

        let missing = db
            .execute(Statement::from_string(
                DbBackend::Sqlite,
                "SELECT COUNT(*) FROM error_groups",
            ))
            .await;
        assert!(missing.is_err());
    }

    #[tokio::test]
    async fn test_invalid_url_is_a_database_error() {
        let mut config = sqlite_config();
        config.url = "notadb://nowhere".to_string();

        let err = establish_connection(&config).await.unwrap_err();
        assert!(matches!(err, ServiceError::Database(_)));
    }
}
