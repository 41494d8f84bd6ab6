use std::sync::Arc;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use sea_orm::DatabaseConnection;
use thiserror::Error;

use crate::{
    clock::Clock, config::Config, database::DatabaseSetupStatus, environment::Environment,
    executor::ScriptExecutor, pipeline::ExecutionPipeline, recorder::RunRecorder,
    store::ScriptStore,
};

#[derive(Clone, Debug)]
pub struct App {
    pub config: Config,
    pub environment: Environment,
    pub db: DatabaseConnection,
    pub clock: Arc<dyn Clock>,
    pub scripts: ScriptStore,
    pub runs: RunRecorder,
    pub pipeline: ExecutionPipeline,
}

impl App {
    /// Wires the store, recorder and execution pipeline around one connection
    /// pool and one clock.
    pub fn new(
        config: Config,
        environment: Environment,
        db: DatabaseConnection,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let scripts = ScriptStore::new(db.clone(), Arc::clone(&clock));
        let runs = RunRecorder::new(db.clone(), Arc::clone(&clock));
        let executor = ScriptExecutor::from_config(&config.executor);
        let pipeline = ExecutionPipeline::new(
            scripts.clone(),
            runs.clone(),
            executor,
            Arc::clone(&clock),
        );

        Self {
            config,
            environment,
            db,
            clock,
            scripts,
            runs,
            pipeline,
        }
    }
}

#[derive(Debug, Error)]
pub enum ReadinessError {
    #[error("Database connection error")]
    DatabaseError(#[from] sea_orm::DbErr),
    #[error("Database setup error: {0}")]
    DatabaseSetupError(DatabaseSetupStatus),
}

impl IntoResponse for ReadinessError {
    fn into_response(self) -> Response {
        (StatusCode::SERVICE_UNAVAILABLE, self.to_string()).into_response()
    }
}
