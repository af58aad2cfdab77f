//! Database error types.

use thiserror::Error;

/// Errors from the student directory.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Connecting to the database failed.
    #[error("Failed to connect to database at {url}: {source}")]
    Connect {
        /// Connection URL with credentials removed.
        url: String,
        #[source]
        source: sea_orm::DbErr,
    },

    /// A query failed.
    #[error("Query failed: {0}")]
    Query(#[from] sea_orm::DbErr),

    /// A migration failed to apply.
    #[error("Migration failed: {0}")]
    Migration(String),
}
