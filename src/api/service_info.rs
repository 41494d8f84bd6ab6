use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use crate::{app::App, database::backend_name};

/// Non-secret facts about how this instance is set up.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServiceInfo {
    pub environment: String,
    pub database_backend: String,
    pub executor: String,
    pub timeout_seconds: u64,
    pub tick_interval_seconds: u64,
}

pub async fn show(State(app): State<App>) -> Json<ServiceInfo> {
    Json(ServiceInfo {
        environment: app.environment.to_string(),
        database_backend: backend_name(&app.config.database.url).to_string(),
        executor: app.pipeline.executor().runner_name().to_string(),
        timeout_seconds: app.config.executor.timeout_seconds,
        tick_interval_seconds: app.config.scheduler.tick_interval_seconds,
    })
}
