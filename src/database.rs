use std::{
    fmt::{self, Display, Formatter},
    fs,
    path::Path,
    time::Duration,
};

use sea_orm::{
    sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode},
    ConnectOptions, DatabaseConnection, DbErr,
};
use sea_orm_migration::MigratorTrait;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::{config::DatabaseConfig, database::migrations::Migrator};

pub mod migrations;
pub mod models;

/// How long a `SQLite` write waits for another connection's write lock.
const SQLITE_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, PartialEq, Eq, Clone)]
pub enum DatabaseSetupStatus {
    MigrationsInProgress,
    MigrationsFailed(String),
    Completed,
}

impl Display for DatabaseSetupStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::MigrationsInProgress => write!(f, "Migrations in progress"),
            Self::MigrationsFailed(e) => write!(f, "Migrations failed: {e}"),
            Self::Completed => write!(f, "Database setup completed"),
        }
    }
}

/// Connects and starts running migrations in the background.
///
/// The receiver resolves once every pending migration has been applied.
pub async fn setup_database(
    db_config: &DatabaseConfig,
) -> (DatabaseConnection, oneshot::Receiver<Result<(), DbErr>>) {
    let connection = setup_database_connection(db_config).await;
    let migrations_connection = connection.clone();

    let (sender, receiver) = oneshot::channel();

    tokio::spawn(async move {
        let migration_result = Migrator::up(&migrations_connection, None).await;
        let _ = sender.send(migration_result);
    });

    (connection, receiver)
}

pub async fn setup_database_connection(db_config: &DatabaseConfig) -> DatabaseConnection {
    ensure_sqlite_parent_dir(&db_config.url);

    let mut options = ConnectOptions::new(db_config.url.clone());

    options.sqlx_logging(false); // Disable SQL query logging to reduce noise
    options.max_connections(db_config.pool_size);

    if sqlite_file_path(&db_config.url).is_some() {
        options.map_sqlx_sqlite_opts(file_sqlite_options);
    }

    debug!("Connecting to database at: {}", &db_config.url);

    sea_orm::Database::connect(options)
        .await
        .expect("Failed to connect to the database")
}

/// File databases are written from several pooled connections at once.
/// Writers queue behind each other instead of failing with "database is locked".
fn file_sqlite_options(options: SqliteConnectOptions) -> SqliteConnectOptions {
    options
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(SQLITE_BUSY_TIMEOUT)
}

/// Name of the backend a connection URL points at, for display.
#[must_use]
pub fn backend_name(url: &str) -> &'static str {
    if url.starts_with("sqlite:") {
        "sqlite"
    } else if url.starts_with("postgres://") || url.starts_with("postgresql://") {
        "postgres"
    } else {
        "unknown"
    }
}

/// `SQLite` creates the database file but not its directory.
fn ensure_sqlite_parent_dir(url: &str) {
    let Some(path) = sqlite_file_path(url) else {
        return;
    };

    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            debug!("Creating database directory: {}", parent.display());
            if let Err(e) = fs::create_dir_all(parent) {
                warn!(
                    "⚠️ Could not create database directory {}: {}",
                    parent.display(),
                    e
                );
            }
        }
    }
}

fn sqlite_file_path(url: &str) -> Option<&str> {
    let rest = url.strip_prefix("sqlite:")?;
    let rest = rest.strip_prefix("//").unwrap_or(rest);
    let path = rest.split('?').next().unwrap_or(rest);

    if path.is_empty() || path == ":memory:" {
        None
    } else {
        Some(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sqlite_file_path() {
        assert_eq!(
            sqlite_file_path("sqlite://data/scripts.db?mode=rwc"),
            Some("data/scripts.db")
        );
        assert_eq!(sqlite_file_path("sqlite:/tmp/app.db"), Some("/tmp/app.db"));
        assert_eq!(sqlite_file_path("sqlite::memory:"), None);
        assert_eq!(sqlite_file_path("postgres://localhost/app"), None);
    }

    #[test]
    fn test_backend_name() {
        assert_eq!(backend_name("sqlite::memory:"), "sqlite");
        assert_eq!(backend_name("postgres://localhost/app"), "postgres");
        assert_eq!(backend_name("mysql://localhost/app"), "unknown");
    }
}
