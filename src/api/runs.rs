use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::{app::App, database::models::script_run, error::ServiceError};

#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PurgeResponse {
    pub deleted: u64,
}

/// Executes the script now and answers with the finished run.
pub async fn run_now(
    State(app): State<App>,
    Path(script_id): Path<i32>,
) -> Result<Json<script_run::Model>, ServiceError> {
    Ok(Json(app.pipeline.run_now(script_id).await?))
}

pub async fn history(
    State(app): State<App>,
    Path(script_id): Path<i32>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<script_run::Model>>, ServiceError> {
    let history = &app.config.history;
    let limit = query
        .limit
        .unwrap_or(history.default_limit)
        .clamp(1, history.max_limit.max(1));

    Ok(Json(app.runs.list_for_script(script_id, limit).await?))
}

pub async fn purge(
    State(app): State<App>,
    Path(script_id): Path<i32>,
) -> Result<Json<PurgeResponse>, ServiceError> {
    let deleted = app.runs.purge_for_script(script_id).await?;

    Ok(Json(PurgeResponse { deleted }))
}
