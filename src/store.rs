//! Durable repository of script definitions.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait,
    QueryFilter, QueryOrder, Set,
};
use tracing::{debug, info, warn};

use crate::{
    clock::Clock,
    database::models::script::{self, Entity as ScriptEntity},
    error::ServiceError,
    schedule::CronExpression,
};

/// Fields of a script about to be created.
#[derive(Debug, Clone, Default)]
pub struct NewScript {
    pub name: String,
    pub description: Option<String>,
    pub code: String,
    pub cron_expression: Option<String>,
    /// Defaults to `true`.
    pub is_active: Option<bool>,
}

/// A partial update. `None` keeps the stored value; an empty `description`
/// or `cron_expression` clears it.
#[derive(Debug, Clone, Default)]
pub struct ScriptChanges {
    pub name: Option<String>,
    pub description: Option<String>,
    pub code: Option<String>,
    pub cron_expression: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct ScriptStore {
    db: DatabaseConnection,
    clock: Arc<dyn Clock>,
}

impl ScriptStore {
    pub fn new(db: DatabaseConnection, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }

    pub async fn create(&self, new_script: NewScript) -> Result<script::Model, ServiceError> {
        let name = required("name", &new_script.name)?;
        let code = required_code(&new_script.code)?;
        let cron_expression = optional_text(new_script.cron_expression);
        let is_active = new_script.is_active.unwrap_or(true);

        let now = self.clock.now();
        let next_run_time = next_run_time(cron_expression.as_deref(), is_active, now)?;

        let model = script::ActiveModel {
            name: Set(name),
            description: Set(optional_text(new_script.description)),
            code: Set(code),
            cron_expression: Set(cron_expression),
            is_active: Set(is_active),
            next_run_time: Set(next_run_time),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&self.db)
        .await?;

        info!("📝 Created script {} ({})", model.id, model.name);
        Ok(model)
    }

    pub async fn get(&self, id: i32) -> Result<script::Model, ServiceError> {
        ScriptEntity::find_by_id(id)
            .one(&self.db)
            .await?
            .ok_or(ServiceError::script_not_found(id))
    }

    /// Newest first.
    pub async fn list(&self) -> Result<Vec<script::Model>, ServiceError> {
        Ok(ScriptEntity::find()
            .order_by_desc(script::Column::CreatedAt)
            .order_by_desc(script::Column::Id)
            .all(&self.db)
            .await?)
    }

    /// Active scripts that carry a cron expression.
    pub async fn list_active_with_schedule(&self) -> Result<Vec<script::Model>, ServiceError> {
        let scripts = ScriptEntity::find()
            .filter(script::Column::IsActive.eq(true))
            .filter(script::Column::CronExpression.is_not_null())
            .filter(script::Column::CronExpression.ne(""))
            .order_by_asc(script::Column::Id)
            .all(&self.db)
            .await?;

        Ok(scripts
            .into_iter()
            .filter(script::Model::is_scheduled)
            .collect())
    }

    pub async fn update(
        &self,
        id: i32,
        changes: ScriptChanges,
    ) -> Result<script::Model, ServiceError> {
        let current = self.get(id).await?;

        let name = match changes.name {
            Some(name) => required("name", &name)?,
            None => current.name.clone(),
        };
        let code = match changes.code {
            Some(code) => required_code(&code)?,
            None => current.code.clone(),
        };
        let description = match changes.description {
            Some(description) => optional_text(Some(description)),
            None => current.description.clone(),
        };
        let cron_expression = match changes.cron_expression {
            Some(expression) => optional_text(Some(expression)),
            None => current.cron_expression.clone(),
        };
        let is_active = changes.is_active.unwrap_or(current.is_active);

        let now = self.clock.now();
        let next_run_time = next_run_time(cron_expression.as_deref(), is_active, now)?;

        let mut model: script::ActiveModel = current.into();
        model.name = Set(name);
        model.code = Set(code);
        model.description = Set(description);
        model.cron_expression = Set(cron_expression);
        model.is_active = Set(is_active);
        model.next_run_time = Set(next_run_time);
        model.updated_at = Set(now);
        let updated = model.update(&self.db).await.map_err(|e| match e {
            DbErr::RecordNotUpdated => ServiceError::script_not_found(id),
            e => e.into(),
        })?;

        debug!(
            "Updated script {} (next run: {:?})",
            updated.id, updated.next_run_time
        );
        Ok(updated)
    }

    /// Removes the script. Its runs stay queryable by script id.
    pub async fn delete(&self, id: i32) -> Result<(), ServiceError> {
        let result = ScriptEntity::delete_by_id(id).exec(&self.db).await?;

        if result.rows_affected == 0 {
            return Err(ServiceError::script_not_found(id));
        }

        info!("🗑️ Deleted script {}", id);
        Ok(())
    }

    /// Recomputes `next_run_time` from `now`, touching nothing else.
    ///
    /// The write only lands if the cron expression and activation state are
    /// still the ones the next run time was computed from; a concurrent edit
    /// makes it re-read and try again. Returns `None` when the script has been
    /// deleted in the meantime.
    pub async fn advance_schedule(
        &self,
        id: i32,
        now: DateTime<Utc>,
    ) -> Result<Option<script::Model>, ServiceError> {
        for _ in 0..ADVANCE_ATTEMPTS {
            let Some(mut current) = ScriptEntity::find_by_id(id).one(&self.db).await? else {
                return Ok(None);
            };

            let next = scheduled_after(&current, now);

            let unchanged_cron = match &current.cron_expression {
                Some(expression) => script::Column::CronExpression.eq(expression.clone()),
                None => script::Column::CronExpression.is_null(),
            };
            let result = ScriptEntity::update_many()
                .col_expr(script::Column::NextRunTime, Expr::value(next))
                .filter(script::Column::Id.eq(id))
                .filter(script::Column::IsActive.eq(current.is_active))
                .filter(unchanged_cron)
                .exec(&self.db)
                .await?;

            if result.rows_affected > 0 {
                current.next_run_time = next;
                return Ok(Some(current));
            }

            debug!("Script {} changed while advancing its schedule, retrying", id);
        }

        Err(ServiceError::InvalidState(format!(
            "script {id} kept changing while its schedule was advanced"
        )))
    }
}

/// Attempts [`ScriptStore::advance_schedule`] makes before giving up.
const ADVANCE_ATTEMPTS: usize = 3;

fn scheduled_after(script: &script::Model, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    if !script.is_scheduled() {
        return None;
    }

    let expression = script.cron_expression.as_deref().unwrap_or_default();
    match CronExpression::parse(expression) {
        Ok(parsed) => parsed.next_after(&now),
        Err(e) => {
            warn!(
                "⚠️ Script {} has an unusable cron expression '{}': {}",
                script.id, expression, e
            );
            None
        }
    }
}

fn required(field: &str, value: &str) -> Result<String, ServiceError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ServiceError::validation(format!("{field} must not be empty")));
    }
    Ok(trimmed.to_string())
}

/// Code keeps its whitespace; it only has to contain something.
fn required_code(code: &str) -> Result<String, ServiceError> {
    if code.trim().is_empty() {
        return Err(ServiceError::validation("code must not be empty"));
    }
    Ok(code.to_string())
}

fn optional_text(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn next_run_time(
    cron_expression: Option<&str>,
    is_active: bool,
    now: DateTime<Utc>,
) -> Result<Option<DateTime<Utc>>, ServiceError> {
    let Some(expression) = cron_expression else {
        return Ok(None);
    };

    let parsed = CronExpression::parse(expression)
        .map_err(|e| ServiceError::validation(format!("invalid cron expression: {e}")))?;

    Ok(if is_active {
        parsed.next_after(&now)
    } else {
        None
    })
}
