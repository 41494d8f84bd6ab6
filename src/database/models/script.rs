//! `SeaORM` Entity for user scripts

use sea_orm::entity::prelude::*;
use serde::Serialize;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "script")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub name: String,
    #[sea_orm(column_type = "Text", nullable)]
    pub description: Option<String>,
    #[sea_orm(column_type = "Text")]
    pub code: String,
    pub cron_expression: Option<String>,
    pub is_active: bool,
    pub next_run_time: Option<DateTimeUtc>,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

/// Runs reference scripts by id only, so history survives a deleted script.
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Whether the scheduler should consider this script at all.
    #[must_use]
    pub fn is_scheduled(&self) -> bool {
        self.is_active
            && self
                .cron_expression
                .as_deref()
                .is_some_and(|expression| !expression.trim().is_empty())
    }
}
