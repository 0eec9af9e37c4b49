//! PostgreSQL session memory.
//!
//! One row per transcript entry, scoped by session id, read back in
//! insertion order.
//!
//! # Setup
//!
//! Run [`migrate`] once against the target database; it applies
//! `migrations/001_init.sql`, which also provisions the pgvector
//! schema used by [`crate::vector`].

use async_trait::async_trait;
use sqlx::Row;
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{debug, info};

use colloquy_core::error::MemoryError;
use colloquy_core::memory::MemoryStore;

/// Apply the database schema. Safe to run repeatedly.
pub async fn migrate(pool: &PgPool) -> Result<(), MemoryError> {
    let migration_sql = include_str!("../migrations/001_init.sql");

    sqlx::raw_sql(migration_sql)
        .execute(pool)
        .await
        .map_err(|e| MemoryError::MigrationFailed(format!("Migration failed: {e}")))?;

    info!("Database schema migration complete");
    Ok(())
}

/// Session-scoped transcript memory backed by the `memory_entries` table.
pub struct PgMemoryStore {
    pool: PgPool,
    session_id: String,
}

impl PgMemoryStore {
    /// Open a fresh connection pool for the given session.
    pub async fn connect(
        database_url: &str,
        session_id: impl Into<String>,
    ) -> Result<Self, MemoryError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .map_err(|e| MemoryError::Storage(format!("PostgreSQL connection failed: {e}")))?;

        info!("Connected to PostgreSQL for session memory");
        Ok(Self::from_pool(pool, session_id))
    }

    /// Reuse an existing pool. Preferred when the process already holds
    /// one; each session gets its own lightweight store over it.
    pub fn from_pool(pool: PgPool, session_id: impl Into<String>) -> Self {
        Self {
            pool,
            session_id: session_id.into(),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }
}

#[async_trait]
impl MemoryStore for PgMemoryStore {
    fn name(&self) -> &str {
        "postgres"
    }

    async fn add(&self, entry: &str) -> Result<(), MemoryError> {
        sqlx::query("INSERT INTO memory_entries (session_id, content) VALUES ($1, $2)")
            .bind(&self.session_id)
            .bind(entry)
            .execute(&self.pool)
            .await
            .map_err(|e| MemoryError::Storage(format!("Failed to store memory entry: {e}")))?;

        debug!(session_id = %self.session_id, "Stored memory entry");
        Ok(())
    }

    async fn get_all(&self) -> Result<Vec<String>, MemoryError> {
        let rows = sqlx::query(
            "SELECT content FROM memory_entries WHERE session_id = $1 ORDER BY created_at, id",
        )
        .bind(&self.session_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| MemoryError::Storage(format!("Failed to load memory entries: {e}")))?;

        rows.iter()
            .map(|row| {
                row.try_get("content")
                    .map_err(|e| MemoryError::Storage(format!("Failed to read row: {e}")))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migration_provisions_both_tables() {
        let sql = include_str!("../migrations/001_init.sql");
        assert!(sql.contains("CREATE EXTENSION IF NOT EXISTS vector"));
        assert!(sql.contains("memory_entries"));
        assert!(sql.contains("idx_session_id"));
        assert!(sql.contains("document_chunks"));
    }
}
