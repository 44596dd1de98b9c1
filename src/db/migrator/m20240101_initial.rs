use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ScheduledQueries::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ScheduledQueries::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ScheduledQueries::Question).string().not_null())
                    .col(ColumnDef::new(ScheduledQueries::TablesUsed).string().not_null())
                    .col(ColumnDef::new(ScheduledQueries::ScheduleType).string().not_null())
                    .col(ColumnDef::new(ScheduledQueries::ScheduleTime).string().null())
                    .col(ColumnDef::new(ScheduledQueries::ScheduleDay).integer().null())
                    .col(ColumnDef::new(ScheduledQueries::CronExpression).string().null())
                    .col(
                        ColumnDef::new(ScheduledQueries::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(ScheduledQueries::CreatedAt)
                            .date_time()
                            .not_null()
                            .extra("DEFAULT CURRENT_TIMESTAMP".to_owned()),
                    )
                    .col(ColumnDef::new(ScheduledQueries::LastRunAt).date_time().null())
                    .col(ColumnDef::new(ScheduledQueries::LastRunStatus).string().null())
                    .col(
                        ColumnDef::new(ScheduledQueries::RunCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_scheduled_queries_is_active")
                    .table(ScheduledQueries::Table)
                    .col(ScheduledQueries::IsActive)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(SavedQueries::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(SavedQueries::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(SavedQueries::Question).string().not_null())
                    .col(ColumnDef::new(SavedQueries::SqlQuery).string().not_null())
                    .col(ColumnDef::new(SavedQueries::TablesUsed).string().not_null())
                    .col(
                        ColumnDef::new(SavedQueries::CreatedAt)
                            .date_time()
                            .not_null()
                            .extra("DEFAULT CURRENT_TIMESTAMP".to_owned()),
                    )
                    .col(
                        ColumnDef::new(SavedQueries::IsSuccessful)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(ColumnDef::new(SavedQueries::ErrorMessage).string().null())
                    .col(ColumnDef::new(SavedQueries::QueryResults).string().null())
                    .col(ColumnDef::new(SavedQueries::ResultMessage).string().null())
                    .col(
                        ColumnDef::new(SavedQueries::IsScheduled)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .to_owned(),
            )
            .await?;

        // Run history is listed newest-first with limit/offset.
        manager
            .create_index(
                Index::create()
                    .name("idx_saved_queries_created_at")
                    .table(SavedQueries::Table)
                    .col(SavedQueries::CreatedAt)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(SavedQueries::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(ScheduledQueries::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum ScheduledQueries {
    Table,
    Id,
    Question,
    TablesUsed,
    ScheduleType,
    ScheduleTime,
    ScheduleDay,
    CronExpression,
    IsActive,
    CreatedAt,
    LastRunAt,
    LastRunStatus,
    RunCount,
}

#[derive(Iden)]
enum SavedQueries {
    Table,
    Id,
    Question,
    SqlQuery,
    TablesUsed,
    CreatedAt,
    IsSuccessful,
    ErrorMessage,
    QueryResults,
    ResultMessage,
    IsScheduled,
}
