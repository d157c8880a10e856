/// Database module for SQLite persistence
///
/// This module stores chat sessions and memory items. It uses sqlx with
/// parameterized queries and WAL mode so a running REPL and a one-shot
/// `forge memory add` can share the file.
use anyhow::{Context, Result};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use sqlx::ConnectOptions;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

pub mod memory;
pub mod sessions;

pub use memory::SqliteMemoryStore;
pub use sessions::{SessionRecord, SessionRepository};

/// Schema scripts applied in order on every open
const MIGRATIONS: &[(&str, &str)] = &[(
    "001_initial.sql",
    include_str!("../../migrations/001_initial.sql"),
)];

/// How long a writer waits for another process holding the lock
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const MAX_CONNECTIONS: u32 = 5;

/// Shared handle to `forge.db`
pub struct Database {
    pool: SqlitePool,
}

fn connect_options(db_path: &Path) -> Result<SqliteConnectOptions> {
    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))
        .with_context(|| format!("Invalid database path {}", db_path.display()))?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .busy_timeout(BUSY_TIMEOUT)
        .disable_statement_logging();
    Ok(options)
}

impl Database {
    /// Open (creating if needed) the database at `db_path` and apply the schema
    ///
    /// SQLite replays a leftover WAL file on open, so an unclean shutdown
    /// needs no extra recovery step.
    pub async fn new(db_path: &Path) -> Result<Self> {
        info!("Opening database at {}", db_path.display());

        if let Some(parent) = db_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .context("Failed to create database directory")?;
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect_with(connect_options(db_path)?)
            .await
            .context("Failed to connect to database")?;

        let db = Self { pool };
        db.migrate().await?;

        Ok(db)
    }

    /// Every script uses `IF NOT EXISTS`, so this runs on every open
    async fn migrate(&self) -> Result<()> {
        for (name, script) in MIGRATIONS {
            sqlx::raw_sql(script)
                .execute(&self.pool)
                .await
                .with_context(|| format!("Failed to execute migration {}", name))?;
            debug!(migration = name, "Applied migration");
        }
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Checkpoint the WAL into the main file
    pub async fn flush_wal(&self) -> Result<()> {
        sqlx::query("PRAGMA wal_checkpoint(TRUNCATE)")
            .execute(&self.pool)
            .await
            .context("Failed to flush WAL")?;

        debug!("WAL checkpointed");
        Ok(())
    }

    /// Checkpoint the WAL and close every pooled connection
    pub async fn close(self) -> Result<()> {
        self.flush_wal().await?;
        self.pool.close().await;

        debug!("Database closed");
        Ok(())
    }

    pub fn sessions(&self) -> SessionRepository {
        SessionRepository::new(self.pool.clone())
    }

    pub fn memories(&self) -> SqliteMemoryStore {
        SqliteMemoryStore::new(self.pool.clone())
    }
}
