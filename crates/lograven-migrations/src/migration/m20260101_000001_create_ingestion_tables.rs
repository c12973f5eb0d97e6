use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // ========================================
        // PLANS
        // ========================================
        manager
            .create_table(
                Table::create()
                    .table(Plans::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Plans::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Plans::Name).string().not_null())
                    // NULL = unlimited / custom
                    .col(ColumnDef::new(Plans::EventsPerMonth).big_integer().null())
                    .col(
                        ColumnDef::new(Plans::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // ========================================
        // PROJECTS
        // ========================================
        manager
            .create_table(
                Table::create()
                    .table(Projects::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Projects::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Projects::Name).string().not_null())
                    .col(ColumnDef::new(Projects::PlanId).integer().not_null())
                    .col(ColumnDef::new(Projects::Dsn).string().not_null())
                    .col(
                        ColumnDef::new(Projects::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_projects_plan")
                            .from(Projects::Table, Projects::PlanId)
                            .to(Plans::Table, Plans::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_projects_dsn_unique")
                    .table(Projects::Table)
                    .col(Projects::Dsn)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // ========================================
        // ERROR GROUPS
        // ========================================
        manager
            .create_table(
                Table::create()
                    .table(ErrorGroups::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ErrorGroups::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ErrorGroups::ProjectId).integer().not_null())
                    .col(ColumnDef::new(ErrorGroups::Fingerprint).string().not_null())
                    .col(ColumnDef::new(ErrorGroups::ErrorType).string().not_null())
                    .col(ColumnDef::new(ErrorGroups::Message).text().not_null())
                    .col(
                        ColumnDef::new(ErrorGroups::Status)
                            .string()
                            .not_null()
                            .default("open"),
                    )
                    .col(ColumnDef::new(ErrorGroups::Assignee).string().null())
                    .col(
                        ColumnDef::new(ErrorGroups::TotalCount)
                            .big_integer()
                            .not_null()
                            .default(1),
                    )
                    .col(
                        ColumnDef::new(ErrorGroups::FirstSeen)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ErrorGroups::LastSeen)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ErrorGroups::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(ErrorGroups::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_error_groups_project")
                            .from(ErrorGroups::Table, ErrorGroups::ProjectId)
                            .to(Projects::Table, Projects::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // The upsert in the group store targets this index
        manager
            .create_index(
                Index::create()
                    .name("idx_error_groups_project_fingerprint")
                    .table(ErrorGroups::Table)
                    .col(ErrorGroups::ProjectId)
                    .col(ErrorGroups::Fingerprint)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_error_groups_project_last_seen")
                    .table(ErrorGroups::Table)
                    .col(ErrorGroups::ProjectId)
                    .col(ErrorGroups::LastSeen)
                    .to_owned(),
            )
            .await?;

        // ========================================
        // ERROR EVENTS
        // ========================================
        manager
            .create_table(
                Table::create()
                    .table(ErrorEvents::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ErrorEvents::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ErrorEvents::ProjectId).integer().not_null())
                    .col(ColumnDef::new(ErrorEvents::ErrorGroupId).integer().not_null())
                    .col(ColumnDef::new(ErrorEvents::Fingerprint).string().not_null())
                    .col(
                        ColumnDef::new(ErrorEvents::Timestamp)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(ErrorEvents::ErrorType).string().not_null())
                    .col(ColumnDef::new(ErrorEvents::Message).text().not_null())
                    .col(ColumnDef::new(ErrorEvents::StackTrace).text().null())
                    .col(ColumnDef::new(ErrorEvents::MappedStackTrace).text().null())
                    .col(ColumnDef::new(ErrorEvents::Url).string().null())
                    .col(ColumnDef::new(ErrorEvents::Method).string().null())
                    .col(ColumnDef::new(ErrorEvents::Path).string().null())
                    .col(ColumnDef::new(ErrorEvents::StatusCode).integer().null())
                    .col(ColumnDef::new(ErrorEvents::UserAgent).string().null())
                    .col(ColumnDef::new(ErrorEvents::Browser).string().null())
                    .col(ColumnDef::new(ErrorEvents::BrowserVersion).string().null())
                    .col(ColumnDef::new(ErrorEvents::Os).string().null())
                    .col(ColumnDef::new(ErrorEvents::OsVersion).string().null())
                    .col(ColumnDef::new(ErrorEvents::DeviceType).string().null())
                    .col(ColumnDef::new(ErrorEvents::Environment).string().null())
                    .col(ColumnDef::new(ErrorEvents::Release).string().null())
                    .col(ColumnDef::new(ErrorEvents::UserContext).json().null())
                    .col(ColumnDef::new(ErrorEvents::Tags).json().null())
                    .col(
                        ColumnDef::new(ErrorEvents::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_error_events_group")
                            .from(ErrorEvents::Table, ErrorEvents::ErrorGroupId)
                            .to(ErrorGroups::Table, ErrorGroups::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_error_events_project")
                            .from(ErrorEvents::Table, ErrorEvents::ProjectId)
                            .to(Projects::Table, Projects::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_error_events_group_timestamp")
                    .table(ErrorEvents::Table)
                    .col(ErrorEvents::ErrorGroupId)
                    .col(ErrorEvents::Timestamp)
                    .to_owned(),
            )
            .await?;

        // ========================================
        // QUOTA COUNTERS
        // ========================================
        manager
            .create_table(
                Table::create()
                    .table(QuotaCounters::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(QuotaCounters::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(QuotaCounters::ProjectId).integer().not_null())
                    .col(ColumnDef::new(QuotaCounters::Period).string().not_null())
                    .col(
                        ColumnDef::new(QuotaCounters::EventCount)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(QuotaCounters::EventLimit).big_integer().null())
                    .col(
                        ColumnDef::new(QuotaCounters::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_quota_counters_project")
                            .from(QuotaCounters::Table, QuotaCounters::ProjectId)
                            .to(Projects::Table, Projects::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // The admission upsert targets this index
        manager
            .create_index(
                Index::create()
                    .name("idx_quota_counters_project_period")
                    .table(QuotaCounters::Table)
                    .col(QuotaCounters::ProjectId)
                    .col(QuotaCounters::Period)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(QuotaCounters::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(ErrorEvents::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(ErrorGroups::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Projects::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Plans::Table).to_owned())
            .await?;
        Ok(())
    }
}

#[derive(DeriveIden)]
enum Plans {
    Table,
    Id,
    Name,
    EventsPerMonth,
    CreatedAt,
}

#[derive(DeriveIden)]
pub(super) enum Projects {
    Table,
    Id,
    Name,
    PlanId,
    Dsn,
    CreatedAt,
}

#[derive(DeriveIden)]
enum ErrorGroups {
    Table,
    Id,
    ProjectId,
    Fingerprint,
    ErrorType,
    Message,
    Status,
    Assignee,
    TotalCount,
    FirstSeen,
    LastSeen,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum ErrorEvents {
    Table,
    Id,
    ProjectId,
    ErrorGroupId,
    Fingerprint,
    Timestamp,
    ErrorType,
    Message,
    StackTrace,
    MappedStackTrace,
    Url,
    Method,
    Path,
    StatusCode,
    UserAgent,
    Browser,
    BrowserVersion,
    Os,
    OsVersion,
    DeviceType,
    Environment,
    Release,
    UserContext,
    Tags,
    CreatedAt,
}

#[derive(DeriveIden)]
enum QuotaCounters {
    Table,
    Id,
    ProjectId,
    Period,
    EventCount,
    EventLimit,
    UpdatedAt,
}
