//! SeaORM-based metadata database
//!
//! Supports SQLite and PostgreSQL, picked from the URL scheme. Call
//! [`Database::migrate`] after connecting to bring the schema up to date.

use crate::errors::{AppError, AppResult, ErrorKind, ResultExt};
use sea_orm::{ConnectOptions, Database as SeaOrmDatabase, DatabaseBackend, DatabaseConnection};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

pub mod migrations;
pub mod repositories;

pub use repositories::AlbumSeaOrmRepository;

/// Database connection manager
#[derive(Clone)]
pub struct Database {
    pub connection: Arc<DatabaseConnection>,
    pub backend: DatabaseBackend,
}

impl Database {
    pub async fn connect(url: &str, max_connections: u32) -> AppResult<Self> {
        let backend = Self::detect_backend(url)?;
        info!("Connecting to {:?} database", backend);

        let url = match backend {
            DatabaseBackend::Sqlite => Self::ensure_sqlite_parent_dir(url)?,
            _ => url.to_string(),
        };

        let mut options = ConnectOptions::new(url);
        options
            .max_connections(max_connections)
            .min_connections(1)
            .connect_timeout(Duration::from_secs(5))
            .acquire_timeout(Duration::from_secs(3))
            .idle_timeout(Duration::from_secs(600))
            .sqlx_logging_level(tracing::log::LevelFilter::Debug);

        // In-memory SQLite gives every pooled connection its own database
        if url_is_sqlite_memory(options.get_url()) {
            options.max_connections(1).min_connections(1);
        }

        let connection = SeaOrmDatabase::connect(options)
            .await
            .wrap("connect database")?;
        debug!("Database connection established");

        Ok(Self {
            connection: Arc::new(connection),
            backend,
        })
    }

    /// Run all pending migrations
    pub async fn migrate(&self) -> AppResult<()> {
        use migrations::Migrator;
        use sea_orm_migration::MigratorTrait;

        info!("Running database migrations");
        Migrator::up(&*self.connection, None)
            .await
            .wrap("run migrations")?;
        info!("Database migrations completed successfully");
        Ok(())
    }

    pub fn connection(&self) -> Arc<DatabaseConnection> {
        self.connection.clone()
    }

    fn detect_backend(url: &str) -> AppResult<DatabaseBackend> {
        if url.starts_with("sqlite:") {
            Ok(DatabaseBackend::Sqlite)
        } else if url.starts_with("postgres:") || url.starts_with("postgresql:") {
            Ok(DatabaseBackend::Postgres)
        } else {
            Err(AppError::new(
                ErrorKind::Unknown,
                format!("unsupported database URL: {url}"),
            ))
        }
    }

    /// Create the directory holding a SQLite file so `mode=rwc` can create it
    fn ensure_sqlite_parent_dir(url: &str) -> AppResult<String> {
        if url_is_sqlite_memory(url) {
            return Ok(url.to_string());
        }
        let path = url
            .strip_prefix("sqlite://")
            .or_else(|| url.strip_prefix("sqlite:"))
            .unwrap_or(url);
        let path = path.split('?').next().unwrap_or(path);

        if let Some(parent) = std::path::Path::new(path).parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).wrap("create sqlite directory")?;
                info!("Created directory for SQLite database: {}", parent.display());
            }
        }

        if url.contains("mode=") {
            Ok(url.to_string())
        } else if url.contains('?') {
            Ok(format!("{url}&mode=rwc"))
        } else {
            Ok(format!("{url}?mode=rwc"))
        }
    }
}

fn url_is_sqlite_memory(url: &str) -> bool {
    url.starts_with("sqlite:") && (url.contains(":memory:") || url.contains("mode=memory"))
}
