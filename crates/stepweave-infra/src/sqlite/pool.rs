//! Split reader/writer SQLite pools in WAL mode.
//!
//! The engine writes a checkpoint after every step, and SQLite admits one
//! writer at a time, so all writes go through a single connection and queue
//! in the pool instead of contending for the database lock. Reads never block
//! on that writer under WAL: `status`, `list` and `stats` queries and `sql`
//! script steps share a read-only pool, which also keeps workflow SQL from
//! modifying the store it runs against.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use stepweave_types::config::DatabaseConfig;

#[derive(Clone)]
pub struct DatabasePool {
    /// Read-only connections, sized by `database.read_connections`.
    pub reader: SqlitePool,
    /// Exactly one connection; every INSERT/UPDATE goes through it.
    pub writer: SqlitePool,
}

impl DatabasePool {
    /// Open with default settings (8 readers, 5s busy timeout).
    pub async fn new(database_url: &str) -> Result<Self, sqlx::Error> {
        Self::with_config(database_url, &DatabaseConfig::default()).await
    }

    /// Open both pools and apply pending migrations before any reader connects.
    pub async fn with_config(
        database_url: &str,
        config: &DatabaseConfig,
    ) -> Result<Self, sqlx::Error> {
        let base_opts = SqliteConnectOptions::from_str(database_url)?
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(config.busy_timeout_secs))
            .create_if_missing(true);

        let writer = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(base_opts.clone())
            .await?;

        sqlx::migrate!("../../migrations").run(&writer).await?;

        let reader = SqlitePoolOptions::new()
            .max_connections(config.read_connections.max(1))
            .connect_with(base_opts.read_only(true))
            .await?;

        tracing::debug!(
            read_connections = config.read_connections.max(1),
            "database pools opened"
        );

        Ok(Self { reader, writer })
    }
}

/// Database URL for `stepweave.db` inside `data_dir`.
pub fn database_url(data_dir: &Path) -> String {
    format!("sqlite://{}/stepweave.db?mode=rwc", data_dir.display())
}
