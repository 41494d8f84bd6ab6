use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use validator::Validate;

use crate::{
    api::validated_json::ValidatedJson,
    app::App,
    database::models::script,
    error::ServiceError,
    store::{NewScript, ScriptChanges},
};

#[derive(Debug, Deserialize, Validate)]
pub struct CreateScriptRequest {
    #[validate(length(max = 255, message = "name must be at most 255 characters"))]
    pub name: String,
    pub description: Option<String>,
    #[validate(length(min = 1, message = "code must not be empty"))]
    pub code: String,
    pub cron_expression: Option<String>,
    pub is_active: Option<bool>,
}

/// Every field is optional; omitted fields keep their stored value.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateScriptRequest {
    #[validate(length(max = 255, message = "name must be at most 255 characters"))]
    pub name: Option<String>,
    pub description: Option<String>,
    #[validate(length(min = 1, message = "code must not be empty"))]
    pub code: Option<String>,
    pub cron_expression: Option<String>,
    pub is_active: Option<bool>,
}

impl From<CreateScriptRequest> for NewScript {
    fn from(request: CreateScriptRequest) -> Self {
        Self {
            name: request.name,
            description: request.description,
            code: request.code,
            cron_expression: request.cron_expression,
            is_active: request.is_active,
        }
    }
}

impl From<UpdateScriptRequest> for ScriptChanges {
    fn from(request: UpdateScriptRequest) -> Self {
        Self {
            name: request.name,
            description: request.description,
            code: request.code,
            cron_expression: request.cron_expression,
            is_active: request.is_active,
        }
    }
}

pub async fn list(State(app): State<App>) -> Result<Json<Vec<script::Model>>, ServiceError> {
    Ok(Json(app.scripts.list().await?))
}

pub async fn get(
    State(app): State<App>,
    Path(id): Path<i32>,
) -> Result<Json<script::Model>, ServiceError> {
    Ok(Json(app.scripts.get(id).await?))
}

pub async fn create(
    State(app): State<App>,
    ValidatedJson(request): ValidatedJson<CreateScriptRequest>,
) -> Result<(StatusCode, Json<script::Model>), ServiceError> {
    let script = app.scripts.create(request.into()).await?;

    Ok((StatusCode::CREATED, Json(script)))
}

pub async fn update(
    State(app): State<App>,
    Path(id): Path<i32>,
    ValidatedJson(request): ValidatedJson<UpdateScriptRequest>,
) -> Result<Json<script::Model>, ServiceError> {
    Ok(Json(app.scripts.update(id, request.into()).await?))
}

pub async fn delete(
    State(app): State<App>,
    Path(id): Path<i32>,
) -> Result<StatusCode, ServiceError> {
    app.scripts.delete(id).await?;

    Ok(StatusCode::NO_CONTENT)
}
