use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use sea_orm::DbErr;
use thiserror::Error;
use tracing::error;

/// Errors surfaced by the script store, the run recorder and the execution pipeline.
///
/// A failing user script is not represented here: it ends as a `failed` run.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0}")]
    Validation(String),
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i32 },
    #[error("script {0} is already running")]
    Busy(i32),
    #[error("invalid state: {0}")]
    InvalidState(String),
    #[error("database error: {0}")]
    Database(#[from] DbErr),
}

impl ServiceError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub const fn script_not_found(id: i32) -> Self {
        Self::NotFound {
            entity: "script",
            id,
        }
    }

    pub const fn run_not_found(id: i32) -> Self {
        Self::NotFound { entity: "run", id }
    }

    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Busy(_) => StatusCode::CONFLICT,
            Self::InvalidState(_) | Self::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = match &self {
            Self::Database(e) => {
                error!("❌ Database error while handling request: {}", e);
                "Internal database error".to_string()
            }
            Self::InvalidState(detail) => {
                error!("💥 Invalid state reached while handling request: {}", detail);
                self.to_string()
            }
            _ => self.to_string(),
        };

        (status, Json(serde_json::json!({ "message": message }))).into_response()
    }
}
