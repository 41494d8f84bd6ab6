use axum::{extract::State, http::StatusCode};
use sea_orm_migration::MigratorTrait;

use crate::{
    app::{App, ReadinessError},
    database::{migrations::Migrator, DatabaseSetupStatus},
};

pub async fn ok() -> StatusCode {
    StatusCode::OK
}

/// Ready once the database answers and every migration has been applied.
pub async fn ready(State(app): State<App>) -> Result<StatusCode, ReadinessError> {
    app.db.ping().await?;

    if !Migrator::get_pending_migrations(&app.db).await?.is_empty() {
        return Err(ReadinessError::DatabaseSetupError(
            DatabaseSetupStatus::MigrationsInProgress,
        ));
    }

    Ok(StatusCode::OK)
}
