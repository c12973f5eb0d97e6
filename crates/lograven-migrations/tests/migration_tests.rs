use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, Statement};
use sea_orm_migration::MigratorTrait;

use lograven_migrations::Migrator;

async fn memory_db() -> DatabaseConnection {
    let mut options = ConnectOptions::new("sqlite::memory:");
    options.max_connections(1);
    Database::connect(options)
        .await
        .expect("Failed to open in-memory SQLite")
}

async fn exec(db: &DatabaseConnection, sql: &str) -> Result<(), sea_orm::DbErr> {
    db.execute(Statement::from_string(db.get_database_backend(), sql))
        .await
        .map(|_| ())
}

async fn seed_project(db: &DatabaseConnection) {
    exec(db, "INSERT INTO plans (id, name, events_per_month) VALUES (1, 'free', 1000)")
        .await
        .unwrap();
    exec(
        db,
        "INSERT INTO projects (id, name, plan_id, dsn) VALUES (1, 'web', 1, 'pk_web')",
    )
    .await
    .unwrap();
}

#[tokio::test]
async fn test_migration_status() {
    let db = memory_db().await;

    let pending = Migrator::get_pending_migrations(&db).await.unwrap();
    assert_eq!(pending.len(), Migrator::migrations().len());

    Migrator::up(&db, None).await.unwrap();

    assert!(Migrator::get_pending_migrations(&db).await.unwrap().is_empty());
    assert_eq!(
        Migrator::get_applied_migrations(&db).await.unwrap().len(),
        Migrator::migrations().len()
    );
}

#[tokio::test]
async fn test_migration_down_and_up_again() {
    let db = memory_db().await;

    Migrator::up(&db, None).await.unwrap();
    Migrator::down(&db, None).await.unwrap();
    assert_eq!(
        Migrator::get_pending_migrations(&db).await.unwrap().len(),
        Migrator::migrations().len()
    );

    Migrator::up(&db, None).await.unwrap();
    exec(&db, "SELECT COUNT(*) FROM webhook_deliveries").await.unwrap();
}

#[tokio::test]
async fn test_group_fingerprint_is_unique_per_project() {
    let db = memory_db().await;
    Migrator::up(&db, None).await.unwrap();
    seed_project(&db).await;

    let insert = "INSERT INTO error_groups \
        (project_id, fingerprint, error_type, message, first_seen, last_seen) \
        VALUES (1, 'abc', 'TypeError', 'boom', '2026-01-01 00:00:00+00:00', '2026-01-01 00:00:00+00:00')";
    exec(&db, insert).await.unwrap();

    let duplicate = exec(&db, insert).await;
    assert!(duplicate.is_err(), "second group with the same fingerprint must be rejected");
}

#[tokio::test]
async fn test_quota_counter_is_unique_per_period() {
    let db = memory_db().await;
    Migrator::up(&db, None).await.unwrap();
    seed_project(&db).await;

    exec(
        &db,
        "INSERT INTO quota_counters (project_id, period, event_count) VALUES (1, '2026-01', 1)",
    )
    .await
    .unwrap();
    exec(
        &db,
        "INSERT INTO quota_counters (project_id, period, event_count) VALUES (1, '2026-02', 1)",
    )
    .await
    .unwrap();

    let duplicate = exec(
        &db,
        "INSERT INTO quota_counters (project_id, period, event_count) VALUES (1, '2026-01', 5)",
    )
    .await;
    assert!(duplicate.is_err());
}

#[tokio::test]
async fn test_project_dsn_is_unique() {
    let db = memory_db().await;
    Migrator::up(&db, None).await.unwrap();
    seed_project(&db).await;

    let duplicate = exec(
        &db,
        "INSERT INTO projects (name, plan_id, dsn) VALUES ('api', 1, 'pk_web')",
    )
    .await;
    assert!(duplicate.is_err());
}
