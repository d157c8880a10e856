//! SQLite-backed memory store
//!
//! Each item is serialized whole into `body`; `memory_type`, `summary` and
//! `source_ref` are mirrored into columns for the duplicate and source lookups.

use crate::memory::{MemoryItem, MemoryPatch, MemoryStore, NewMemory};
use async_trait::async_trait;
use chrono::Utc;
use sdk::errors::EngineError;
use sqlx::{Row, SqlitePool};
use tracing::{debug, info};

/// Memory store persisted in the `memories` table
#[derive(Clone)]
pub struct SqliteMemoryStore {
    pool: SqlitePool,
}

impl SqliteMemoryStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn find_duplicate(&self, item: &MemoryItem) -> Result<Option<MemoryItem>, EngineError> {
        let row = sqlx::query(
            "SELECT body FROM memories WHERE memory_type = ? AND summary = ? ORDER BY rowid LIMIT 1",
        )
        .bind(item.memory_type.as_str())
        .bind(&item.summary)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        row.map(|r| decode(&r)).transpose()
    }

    async fn write(&self, item: &MemoryItem) -> Result<(), EngineError> {
        let body = serde_json::to_string(item)
            .map_err(|e| EngineError::Database(format!("Failed to serialize memory: {}", e)))?;

        sqlx::query(
            "INSERT INTO memories (id, memory_type, summary, source_ref, created_at, updated_at, body) \
             VALUES (?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(id) DO UPDATE SET \
             summary = excluded.summary, source_ref = excluded.source_ref, \
             updated_at = excluded.updated_at, body = excluded.body",
        )
        .bind(&item.id)
        .bind(item.memory_type.as_str())
        .bind(&item.summary)
        .bind(item.source.reference.as_deref())
        .bind(item.created_at.to_rfc3339())
        .bind(item.updated_at.to_rfc3339())
        .bind(body)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(())
    }
}

#[async_trait]
impl MemoryStore for SqliteMemoryStore {
    async fn create(&self, input: NewMemory) -> Result<MemoryItem, EngineError> {
        let now = Utc::now();
        let item = input.into_item(uuid::Uuid::new_v4().to_string(), now)?;

        if let Some(mut existing) = self.find_duplicate(&item).await? {
            debug!(id = %existing.id, "Duplicate memory summary, refreshing existing item");
            existing.updated_at = now;
            self.write(&existing).await?;
            return Ok(existing);
        }

        self.write(&item).await?;
        info!(id = %item.id, memory_type = %item.memory_type, "Stored memory");

        Ok(item)
    }

    async fn update(&self, id: &str, patch: MemoryPatch) -> Result<MemoryItem, EngineError> {
        let mut item = self
            .get(id)
            .await?
            .ok_or_else(|| EngineError::MemoryNotFound(id.to_string()))?;

        item.apply(patch, Utc::now())?;
        self.write(&item).await?;

        debug!(id = %item.id, "Updated memory");
        Ok(item)
    }

    async fn get(&self, id: &str) -> Result<Option<MemoryItem>, EngineError> {
        let row = sqlx::query("SELECT body FROM memories WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;

        row.map(|r| decode(&r)).transpose()
    }

    async fn list(&self) -> Result<Vec<MemoryItem>, EngineError> {
        let rows = sqlx::query("SELECT body FROM memories ORDER BY rowid")
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;

        rows.iter().map(decode).collect()
    }

    async fn find_by_source_ref(
        &self,
        reference: &str,
    ) -> Result<Option<MemoryItem>, EngineError> {
        let row =
            sqlx::query("SELECT body FROM memories WHERE source_ref = ? ORDER BY rowid LIMIT 1")
                .bind(reference)
                .fetch_optional(&self.pool)
                .await
                .map_err(db_error)?;

        row.map(|r| decode(&r)).transpose()
    }
}

fn decode(row: &sqlx::sqlite::SqliteRow) -> Result<MemoryItem, EngineError> {
    let body: String = row.get("body");
    serde_json::from_str(&body)
        .map_err(|e| EngineError::Database(format!("Corrupt memory row: {}", e)))
}

fn db_error(e: sqlx::Error) -> EngineError {
    EngineError::Database(e.to_string())
}
