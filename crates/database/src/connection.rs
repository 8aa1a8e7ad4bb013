//! Database connection management

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use taskhub_config::DatabaseConfig;
use tokio::fs;
use tracing::info;

/// Open a pool with foreign keys, WAL and a busy timeout on every connection.
pub async fn prepare_database(config: &DatabaseConfig) -> Result<SqlitePool> {
    let in_memory = is_in_memory(&config.url);
    if !in_memory {
        ensure_sqlite_dir(&config.url).await?;
    }

    let mut options = SqliteConnectOptions::from_str(&config.url)
        .with_context(|| format!("invalid sqlite url {}", config.url))?
        .create_if_missing(true)
        .foreign_keys(true)
        .busy_timeout(Duration::from_secs(5));
    if !in_memory {
        options = options.journal_mode(SqliteJournalMode::Wal);
    }

    // Every connection to `:memory:` opens its own database.
    let max_connections = if in_memory { 1 } else { config.max_connections.max(1) };

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await
        .with_context(|| format!("failed to connect to database {}", config.url))?;

    info!(url = %config.url, max_connections, "database connection established");
    Ok(pool)
}

fn sqlite_path(url: &str) -> Option<&str> {
    let path = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))?;
    Some(path.split('?').next().unwrap_or(path))
}

fn is_in_memory(url: &str) -> bool {
    sqlite_path(url).map_or(false, |path| path.is_empty() || path == ":memory:")
        || url.contains("mode=memory")
}

/// Ensure the directory holding the SQLite file exists.
async fn ensure_sqlite_dir(url: &str) -> Result<()> {
    let Some(sqlite_path) = sqlite_path(url) else {
        return Ok(());
    };

    if let Some(parent) = Path::new(sqlite_path).parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).await.with_context(|| {
                format!("failed to create sqlite directory {}", parent.display())
            })?;
        }
    }
    Ok(())
}

/// Database connection wrapper for easier management
#[derive(Clone)]
pub struct DatabaseConnection {
    pub pool: SqlitePool,
}

impl DatabaseConnection {
    pub async fn from_config(config: &DatabaseConfig) -> Result<Self> {
        let pool = prepare_database(config).await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(self) {
        self.pool.close().await;
    }

    pub async fn test_connection(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("failed to test database connection")?;
        Ok(())
    }
}
