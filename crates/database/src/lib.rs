//! SQLite persistence for TaskHub chat messages and user presence.

use sqlx::SqlitePool;
use taskhub_config::DatabaseConfig;

pub mod connection;
pub mod migrations;
pub mod repos;
pub mod types;

pub use connection::{prepare_database, DatabaseConnection};
pub use migrations::run_migrations;
pub use repos::{MessageRepository, UserRepository};
pub use types::{DatabaseError, DatabaseResult};

/// Connects and brings the schema up to date.
pub async fn initialize_database(config: &DatabaseConfig) -> DatabaseResult<SqlitePool> {
    let pool = prepare_database(config)
        .await
        .map_err(|e| DatabaseError::ConnectionError(format!("{e:#}")))?;

    run_migrations(&pool)
        .await
        .map_err(|e| DatabaseError::MigrationError(format!("{e:#}")))?;

    Ok(pool)
}
