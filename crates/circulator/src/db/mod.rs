//! Student directory backed by SeaORM.
//!
//! PostgreSQL in production; SQLite URLs are accepted for development and
//! tests. The schema is owned elsewhere, so migrations only run on request.

use std::time::Duration;

use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use sea_orm_migration::MigratorTrait;

pub mod entities;
pub mod error;
pub mod migrations;
pub mod student_repo;

pub use error::DatabaseError;
pub use student_repo::{Recipient, SeaOrmStudentDirectory, StudentDirectory};

use crate::sanitize::redact_url;

/// Opens a connection pool and optionally applies pending migrations.
pub async fn connect(url: &str, run_migrations: bool) -> Result<DatabaseConnection, DatabaseError> {
    let mut options = ConnectOptions::new(url.to_string());
    options
        .connect_timeout(Duration::from_secs(10))
        .sqlx_logging(false);

    // Every connection to an in-memory SQLite database is a separate database.
    if url.starts_with("sqlite::memory:") {
        options.max_connections(1).min_connections(1);
    }

    let db = Database::connect(options)
        .await
        .map_err(|source| DatabaseError::Connect {
            url: redact_url(url),
            source,
        })?;

    if run_migrations {
        migrations::Migrator::up(&db, None)
            .await
            .map_err(|e| DatabaseError::Migration(e.to_string()))?;
        log::info!("Database migrations applied");
    }

    log::info!("Connected to database at {}", redact_url(url));
    Ok(db)
}
