//! HTTP handlers, mounted under `/api` by [`crate::router`].

use axum::{
    routing::{get, post},
    Router,
};

use crate::app::App;

pub mod cron;
pub mod health_checks;
pub mod json_error;
pub mod runs;
pub mod scripts;
pub mod service_info;
pub mod templates;
pub mod validated_json;

pub fn routes() -> Router<App> {
    Router::new()
        .route("/scripts", get(scripts::list).post(scripts::create))
        .route(
            "/scripts/{id}",
            get(scripts::get)
                .put(scripts::update)
                .delete(scripts::delete),
        )
        .route("/scripts/{id}/run", post(runs::run_now))
        .route(
            "/scripts/{id}/runs",
            get(runs::history).delete(runs::purge),
        )
        .route("/templates", get(templates::list))
        .route("/cron/parse", post(cron::parse))
        .route("/config", get(service_info::show))
}
