/// Session persistence operations
///
/// Sessions are stored whole: metadata columns plus the canonical history as
/// a JSON array. Saving is an upsert, so the most recent write wins.
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sdk::types::ConversationTurn;
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};

/// Stored form of a chat session
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionRecord {
    pub id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub exchanges: u32,
    pub history: Vec<ConversationTurn>,
}

/// Session repository for database operations
#[derive(Clone)]
pub struct SessionRepository {
    pool: SqlitePool,
}

impl SessionRepository {
    /// Create a new session repository
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert or replace a session
    pub async fn save(&self, record: &SessionRecord) -> Result<()> {
        let history =
            serde_json::to_string(&record.history).context("Failed to serialize history")?;

        sqlx::query(
            "INSERT INTO sessions (id, title, created_at, updated_at, exchanges, history) \
             VALUES (?, ?, ?, ?, ?, ?) \
             ON CONFLICT(id) DO UPDATE SET \
             title = excluded.title, updated_at = excluded.updated_at, \
             exchanges = excluded.exchanges, history = excluded.history",
        )
        .bind(&record.id)
        .bind(&record.title)
        .bind(record.created_at.to_rfc3339())
        .bind(record.updated_at.to_rfc3339())
        .bind(i64::from(record.exchanges))
        .bind(history)
        .execute(&self.pool)
        .await
        .context("Failed to save session")?;

        Ok(())
    }

    /// Get a session by ID
    pub async fn get(&self, id: &str) -> Result<Option<SessionRecord>> {
        let row = sqlx::query(
            "SELECT id, title, created_at, updated_at, exchanges, history FROM sessions WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch session")?;

        row.map(|r| Self::from_row(&r)).transpose()
    }

    /// List all sessions, most recently updated first
    pub async fn list(&self) -> Result<Vec<SessionRecord>> {
        let rows = sqlx::query(
            "SELECT id, title, created_at, updated_at, exchanges, history FROM sessions ORDER BY updated_at DESC",
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to list sessions")?;

        rows.iter().map(Self::from_row).collect()
    }

    /// Delete a session. Returns whether a row was removed.
    pub async fn delete(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM sessions WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to delete session")?;

        Ok(result.rows_affected() > 0)
    }

    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<SessionRecord> {
        let history: String = row.get("history");
        let exchanges: i64 = row.get("exchanges");

        Ok(SessionRecord {
            id: row.get("id"),
            title: row.get("title"),
            created_at: parse_timestamp(row.get("created_at"))?,
            updated_at: parse_timestamp(row.get("updated_at"))?,
            exchanges: u32::try_from(exchanges).unwrap_or(0),
            history: serde_json::from_str(&history).context("Corrupt session history")?,
        })
    }
}

fn parse_timestamp(value: String) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(&value)
        .with_context(|| format!("Invalid timestamp '{}'", value))?
        .with_timezone(&Utc))
}
