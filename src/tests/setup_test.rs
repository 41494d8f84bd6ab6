use std::{
    path::Path,
    sync::{Arc, Once},
};

use chrono::{TimeZone, Utc};
use sea_orm::{ConnectOptions, DatabaseConnection};
use sea_orm_migration::MigratorTrait;
use tracing::debug;

use crate::{
    app::App,
    boot::read_config,
    clock::ManualClock,
    config::DatabaseConfig,
    database::{migrations::Migrator, setup_database_connection},
    environment::Environment,
    router::router,
};

static TRACING_INITIALIZED: Once = Once::new();

/// Initialize tracing for tests
fn init_tracing() {
    TRACING_INITIALIZED.call_once(|| {
        use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

        tracing_subscriber::registry()
            .with(EnvFilter::from_default_env())
            .with(tracing_subscriber::fmt::layer().with_test_writer())
            .init();
    });
}

/// A fresh, fully migrated in-memory database.
///
/// The pool holds exactly one connection: every connection to
/// `sqlite::memory:` opens its own empty database.
///
/// # Panics
///
/// Panics if the database cannot be opened or migrated.
pub async fn test_database() -> DatabaseConnection {
    init_tracing();

    let mut options = ConnectOptions::new("sqlite::memory:");
    options.sqlx_logging(false);
    options.max_connections(1);
    options.min_connections(1);

    let db = sea_orm::Database::connect(options)
        .await
        .expect("Failed to open the in-memory database");

    Migrator::up(&db, None)
        .await
        .expect("Failed to migrate the test database");

    db
}

/// A migrated `SQLite` file database inside `dir`, connected the way the
/// service connects, with a pool of `pool_size` connections.
///
/// # Panics
///
/// Panics if the database cannot be opened or migrated.
pub async fn file_database(dir: &Path, pool_size: u32) -> DatabaseConnection {
    init_tracing();

    let config = DatabaseConfig {
        url: format!("sqlite://{}?mode=rwc", dir.join("scripts.db").display()),
        pool_size,
    };
    let db = setup_database_connection(&config).await;

    Migrator::up(&db, None)
        .await
        .expect("Failed to migrate the test database");

    db
}

/// Creates a test server for integration testing.
///
/// Every test gets its own database, so tests never see each other's scripts
/// and can run in parallel. The application clock is a [`ManualClock`] fixed
/// at 2025-06-10 09:00:00 UTC, a Tuesday.
///
/// # Panics
///
/// Panics if the test configuration cannot be read or the database set up.
pub async fn setup_test() -> TestUtils {
    init_tracing();

    debug!("Setting up test");

    let environment = Environment::Test;
    let config = read_config(&environment);
    let db = test_database().await;
    let clock = ManualClock::new(
        Utc.with_ymd_and_hms(2025, 6, 10, 9, 0, 0)
            .single()
            .expect("valid start instant"),
    );

    let app = App::new(config, environment, db.clone(), Arc::new(clock.clone()));

    debug!("Creating test server");
    let server =
        axum_test::TestServer::new(router(app.clone())).expect("Failed to create test server");

    TestUtils {
        server,
        app,
        clock,
        db,
    }
}

/// An `axum_test::TestServer` plus direct access to what sits behind it.
pub struct TestUtils {
    pub server: axum_test::TestServer,
    pub app: App,
    /// Moves the application's notion of "now".
    pub clock: ManualClock,
    pub db: DatabaseConnection,
}
