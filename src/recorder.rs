//! Append-only history of script runs.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter,
    QueryOrder, QuerySelect, Set, SqlErr,
};
use tokio::time::{sleep, Duration};
use tracing::{debug, error, info, warn};

use crate::{
    clock::Clock,
    database::models::{
        run_status::RunStatus,
        run_trigger::RunTrigger,
        script_run::{self, Entity as ScriptRunEntity},
    },
    error::ServiceError,
    executor::ExecutionOutcome,
};

#[derive(Debug, Clone)]
pub struct RunRecorder {
    db: DatabaseConnection,
    clock: Arc<dyn Clock>,
}

impl RunRecorder {
    pub fn new(db: DatabaseConnection, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }

    /// Persists a `running` run, visible to readers as soon as this returns.
    ///
    /// Fails with [`ServiceError::Busy`] if the script already has a running run.
    pub async fn start(
        &self,
        script_id: i32,
        trigger: RunTrigger,
    ) -> Result<script_run::Model, ServiceError> {
        // The partial unique index on running runs makes this the only check
        let run = script_run::ActiveModel {
            script_id: Set(script_id),
            status: Set(RunStatus::Running),
            triggered_by: Set(trigger),
            created_at: Set(self.clock.now()),
            ..Default::default()
        }
        .insert(&self.db)
        .await
        .map_err(|e| busy_on_conflict(e, script_id))?;

        debug!(
            "Started run {} for script {} ({})",
            run.id, script_id, trigger
        );
        Ok(run)
    }

    /// Moves a running run to its terminal state. Allowed exactly once.
    pub async fn complete(
        &self,
        run_id: i32,
        outcome: &ExecutionOutcome,
    ) -> Result<script_run::Model, ServiceError> {
        if !outcome.status.is_terminal() {
            return Err(ServiceError::InvalidState(format!(
                "run {run_id} cannot be completed with status {}",
                outcome.status
            )));
        }

        let result = ScriptRunEntity::update_many()
            .set(script_run::ActiveModel {
                status: Set(outcome.status),
                output: Set(Some(outcome.output.clone())),
                error: Set(outcome.error.clone()),
                completed_at: Set(Some(self.clock.now())),
                duration_ms: Set(Some(outcome.elapsed_ms())),
                ..Default::default()
            })
            .filter(script_run::Column::Id.eq(run_id))
            .filter(script_run::Column::Status.eq(RunStatus::Running))
            .exec(&self.db)
            .await?;

        let run = self.get(run_id).await?;

        if result.rows_affected == 0 {
            error!(
                "💥 Run {} of script {} was completed again (already {})",
                run_id, run.script_id, run.status
            );
            return Err(ServiceError::InvalidState(format!(
                "run {run_id} is already {}",
                run.status
            )));
        }

        Ok(run)
    }

    pub async fn get(&self, run_id: i32) -> Result<script_run::Model, ServiceError> {
        ScriptRunEntity::find_by_id(run_id)
            .one(&self.db)
            .await?
            .ok_or(ServiceError::run_not_found(run_id))
    }

    /// Newest first; ties on `created_at` are broken by id.
    pub async fn list_for_script(
        &self,
        script_id: i32,
        limit: u64,
    ) -> Result<Vec<script_run::Model>, ServiceError> {
        Ok(ScriptRunEntity::find()
            .filter(script_run::Column::ScriptId.eq(script_id))
            .order_by_desc(script_run::Column::CreatedAt)
            .order_by_desc(script_run::Column::Id)
            .limit(limit)
            .all(&self.db)
            .await?)
    }

    /// Deletes the finished runs of a script. A run still executing is kept.
    pub async fn purge_for_script(&self, script_id: i32) -> Result<u64, ServiceError> {
        let result = ScriptRunEntity::delete_many()
            .filter(script_run::Column::ScriptId.eq(script_id))
            .filter(script_run::Column::Status.ne(RunStatus::Running))
            .exec(&self.db)
            .await?;

        info!(
            "🧹 Purged {} runs of script {}",
            result.rows_affected, script_id
        );
        Ok(result.rows_affected)
    }

    /// Fails runs left `running` that started at or before `cutoff`
    /// (every running run when `cutoff` is `None`).
    pub async fn fail_interrupted(
        &self,
        cutoff: Option<DateTime<Utc>>,
        reason: &str,
    ) -> Result<u64, ServiceError> {
        let mut query = ScriptRunEntity::update_many()
            .set(script_run::ActiveModel {
                status: Set(RunStatus::Failed),
                error: Set(Some(reason.to_string())),
                completed_at: Set(Some(self.clock.now())),
                ..Default::default()
            })
            .filter(script_run::Column::Status.eq(RunStatus::Running));

        if let Some(cutoff) = cutoff {
            query = query.filter(script_run::Column::CreatedAt.lte(cutoff));
        }

        let result = query.exec(&self.db).await?;

        if result.rows_affected > 0 {
            warn!(
                "🏥 Marked {} interrupted runs as failed: {}",
                result.rows_affected, reason
            );
        }
        Ok(result.rows_affected)
    }

    /// Deletes finished runs created before `cutoff`, `batch_size` rows at a time.
    pub async fn delete_completed_before(
        &self,
        cutoff: DateTime<Utc>,
        batch_size: u64,
    ) -> Result<u64, ServiceError> {
        let mut deleted = 0;

        loop {
            let ids: Vec<i32> = ScriptRunEntity::find()
                .select_only()
                .column(script_run::Column::Id)
                .filter(script_run::Column::Status.ne(RunStatus::Running))
                .filter(script_run::Column::CreatedAt.lt(cutoff))
                .order_by_asc(script_run::Column::CreatedAt)
                .limit(batch_size.max(1))
                .into_tuple()
                .all(&self.db)
                .await?;

            if ids.is_empty() {
                break;
            }

            let batch_count = ids.len() as u64;
            let result = ScriptRunEntity::delete_many()
                .filter(script_run::Column::Id.is_in(ids))
                .exec(&self.db)
                .await?;
            deleted += result.rows_affected;

            debug!("🧹 Deleted batch of {} old runs", result.rows_affected);

            if batch_count < batch_size {
                break;
            }

            // Small delay between batches to avoid overwhelming the database
            sleep(Duration::from_millis(100)).await;
        }

        Ok(deleted)
    }
}

/// The partial unique index on running runs reports a concurrent start as a
/// constraint violation.
fn busy_on_conflict(e: DbErr, script_id: i32) -> ServiceError {
    match e.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(_)) => ServiceError::Busy(script_id),
        _ => ServiceError::Database(e),
    }
}
