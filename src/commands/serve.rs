use std::{net::SocketAddr, sync::Arc};

use axum::{routing::get, Router};
use tokio::{net::TcpListener, signal};
use tracing::{error, info};

use crate::{
    api::health_checks::ok, app::App, clock::SystemClock, config::Config,
    database::setup_database, environment::Environment, router::router,
    scheduling::script_supervisor,
};

pub async fn handle_serve_command(environment: Environment, config: Config) {
    let port = config.server.port;

    // Answer liveness probes while migrations run
    let liveness_server_task = tokio::spawn(start_liveness_server(port));

    let (db, migration_receiver) = setup_database(&config.database).await;

    match migration_receiver.await {
        Ok(Ok(())) => {
            info!("✅ Database is ready!");
        }
        Ok(Err(e)) => {
            error!("❌ Database setup failed: {}", e);
            liveness_server_task.abort();
            return;
        }
        Err(_) => {
            error!("❌ Database setup channel closed unexpectedly");
            liveness_server_task.abort();
            return;
        }
    }

    let app = App::new(config, environment, db, Arc::new(SystemClock));

    info!(
        "⚙️ Executing scripts with the '{}' runner, timeout {:?}",
        app.pipeline.executor().runner_name(),
        app.pipeline.executor().timeout()
    );

    let supervisor = script_supervisor(&app).await;

    liveness_server_task.abort();
    let _ = liveness_server_task.await;

    start_server(router(app), port).await;

    supervisor.shutdown().await;
}

async fn start_liveness_server(port: u16) {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await.unwrap();

    let migration_router = Router::new().route("/liveness", get(ok));
    axum::serve(listener, migration_router).await.unwrap();
}

async fn start_server(router: Router, port: u16) {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await.unwrap();

    info!("🌐 Server starting on http://{}", addr);
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .unwrap();
}

async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        error!("❌ Could not listen for the shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }

    info!("🛑 Shutdown requested, finishing in-flight requests");
}
