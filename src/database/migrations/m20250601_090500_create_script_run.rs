use sea_orm_migration::{
    prelude::*,
    schema::{
        big_integer_null, integer, pk_auto, string, text_null, timestamp_with_time_zone,
        timestamp_with_time_zone_null,
    },
};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // No foreign key: history outlives the script it belongs to
        manager
            .create_table(
                Table::create()
                    .table(ScriptRun::Table)
                    .if_not_exists()
                    .col(pk_auto(ScriptRun::Id))
                    .col(integer(ScriptRun::ScriptId))
                    .col(string(ScriptRun::Status).default("running"))
                    .col(string(ScriptRun::TriggeredBy))
                    .col(text_null(ScriptRun::Output))
                    .col(text_null(ScriptRun::Error))
                    .col(timestamp_with_time_zone(ScriptRun::CreatedAt))
                    .col(timestamp_with_time_zone_null(ScriptRun::CompletedAt))
                    .col(big_integer_null(ScriptRun::DurationMs))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-script_run-script_id-created_at")
                    .table(ScriptRun::Table)
                    .col(ScriptRun::ScriptId)
                    .col(ScriptRun::CreatedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-script_run-status")
                    .table(ScriptRun::Table)
                    .col(ScriptRun::Status)
                    .to_owned(),
            )
            .await?;

        // At most one running run per script, whoever started it
        manager
            .get_connection()
            .execute_unprepared(
                r"
                CREATE UNIQUE INDEX IF NOT EXISTS idx_script_run_one_running
                    ON script_run (script_id)
                    WHERE status = 'running';
                ",
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared("DROP INDEX IF EXISTS idx_script_run_one_running;")
            .await?;

        manager
            .drop_table(Table::drop().table(ScriptRun::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum ScriptRun {
    Table,
    Id,
    ScriptId,
    Status,
    TriggeredBy,
    Output,
    Error,
    CreatedAt,
    CompletedAt,
    DurationMs,
}
