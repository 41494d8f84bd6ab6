//! `SeaORM` Entity for script execution history

use sea_orm::entity::prelude::*;
use serde::Serialize;

use crate::database::models::{run_status::RunStatus, run_trigger::RunTrigger};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "script_run")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub script_id: i32,
    pub status: RunStatus,
    pub triggered_by: RunTrigger,
    #[sea_orm(column_type = "Text", nullable)]
    pub output: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub error: Option<String>,
    pub created_at: DateTimeUtc,
    pub completed_at: Option<DateTimeUtc>,
    pub duration_ms: Option<i64>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub const fn is_running(&self) -> bool {
        matches!(self.status, RunStatus::Running)
    }
}
