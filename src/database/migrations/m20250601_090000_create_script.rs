use sea_orm_migration::{
    prelude::*,
    schema::{
        boolean, pk_auto, string, string_null, text, text_null, timestamp_with_time_zone,
        timestamp_with_time_zone_null,
    },
};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Script::Table)
                    .if_not_exists()
                    .col(pk_auto(Script::Id))
                    .col(string(Script::Name))
                    .col(text_null(Script::Description))
                    .col(text(Script::Code))
                    .col(string_null(Script::CronExpression))
                    .col(boolean(Script::IsActive).default(true))
                    .col(timestamp_with_time_zone_null(Script::NextRunTime))
                    .col(timestamp_with_time_zone(Script::CreatedAt))
                    .col(timestamp_with_time_zone(Script::UpdatedAt))
                    .to_owned(),
            )
            .await?;

        // The scheduler scans active scripts on every tick
        manager
            .create_index(
                Index::create()
                    .name("idx-script-is_active")
                    .table(Script::Table)
                    .col(Script::IsActive)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Script::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Script {
    Table,
    Id,
    Name,
    Description,
    Code,
    CronExpression,
    IsActive,
    NextRunTime,
    CreatedAt,
    UpdatedAt,
}
